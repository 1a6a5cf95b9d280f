// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 控制环 (Control Loop)
//! 职责: 读帧 → (每 frame_skip 帧) 检测 → 跟踪 → 区域 → 分发命令 → 发布标注帧
//!
//! MANUAL 模式下不做检测, 只发布画面; 电机命令只来自 `ControlHandle`。

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use image::RgbImage;
use tracing::{debug, info, warn};

use super::annotation::{annotate, Overlay};
use super::{ControlHandle, Mode, SharedState};
use crate::control::{CommandDispatcher, DispatchOutcome, Steering, ZoneLayout};
use crate::detection::preprocess::Preprocessor;
use crate::detection::{Detector, TargetTracker, TrackedPosition, TrackerConfig};
use crate::input::Camera;

/// 控制环参数
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub frame_width: u32,
    pub frame_height: u32,
    /// 每 N 帧推理一次
    pub frame_skip: u32,
    pub camera_retry: Duration,
    /// 连续读帧失败多少次后标记摄像头降级
    pub camera_degraded_after: u32,
    /// 每轮结束后的等待
    pub cycle_delay: Duration,
    pub zones: ZoneLayout,
    pub tracker: TrackerConfig,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            frame_width: crate::detection::FRAME_WIDTH,
            frame_height: crate::detection::FRAME_HEIGHT,
            frame_skip: 4,
            camera_retry: Duration::from_millis(100),
            camera_degraded_after: 10,
            cycle_delay: Duration::from_millis(10),
            zones: ZoneLayout::default(),
            tracker: TrackerConfig::default(),
        }
    }
}

/// 单轮结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleReport {
    /// 没有可用帧
    NoFrame,
    Manual,
    /// 自主模式下跳过推理的帧
    Skipped,
    Processed {
        position: TrackedPosition,
        steering: Steering,
        /// 本轮期间模式被切走时为 None
        outcome: Option<DispatchOutcome>,
    },
}

pub struct ControlLoop {
    shared: Arc<SharedState>,
    camera: Box<dyn Camera>,
    detector: Option<Detector>,
    tracker: TargetTracker,
    preprocessor: Preprocessor,
    config: LoopConfig,
    overlay: Overlay,
    frame_counter: u64,
    seen_epoch: u64,
    camera_failures: u32,

    // 统计
    cycles: u64,
    last_report: Instant,
}

impl ControlLoop {
    pub fn new(
        camera: Box<dyn Camera>,
        detector: Option<Detector>,
        dispatcher: CommandDispatcher,
        config: LoopConfig,
    ) -> Self {
        let shared = Arc::new(SharedState::new(dispatcher, detector.is_some()));
        if detector.is_none() {
            warn!("⚠️ 未加载检测模型, 仅支持手动模式");
        }
        Self {
            shared,
            camera,
            detector,
            tracker: TargetTracker::new(config.tracker),
            preprocessor: Preprocessor::new(),
            overlay: Overlay::default(),
            frame_counter: 0,
            seen_epoch: 0,
            camera_failures: 0,
            cycles: 0,
            last_report: Instant::now(),
            config: LoopConfig {
                frame_skip: config.frame_skip.max(1),
                ..config
            },
        }
    }

    pub fn handle(&self) -> ControlHandle {
        ControlHandle::new(self.shared.clone())
    }

    pub fn tracker(&self) -> &TargetTracker {
        &self.tracker
    }

    /// 运行直到 `ControlHandle::shutdown`, 退出前发送 STOP
    pub fn run(mut self) {
        info!(
            "🚀 控制环启动: {}x{} | 每{}帧推理 | 摄像头 {}",
            self.config.frame_width,
            self.config.frame_height,
            self.config.frame_skip,
            self.camera.describe()
        );

        while self.shared.is_running() {
            self.step();
            if !self.config.cycle_delay.is_zero() {
                thread::sleep(self.config.cycle_delay);
            }
        }

        self.shared.control().dispatcher.shutdown();
        info!("👋 控制环已退出");
    }

    /// 执行一轮
    pub fn step(&mut self) -> CycleReport {
        let frame = match self.camera.read() {
            Ok(Some(frame)) => frame,
            Ok(None) => return self.camera_miss(None),
            Err(e) => return self.camera_miss(Some(e)),
        };
        if self.camera_failures > 0 {
            if self.camera_failures >= self.config.camera_degraded_after {
                info!("✅ 摄像头恢复");
            }
            self.camera_failures = 0;
            self.shared.update_status(|s| s.camera_degraded = false);
        }

        let mut frame = match self.preprocessor.resize(
            &frame,
            self.config.frame_width,
            self.config.frame_height,
        ) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("⚠️ 帧缩放失败: {:#}", e);
                return CycleReport::NoFrame;
            }
        };

        let (mode, epoch) = {
            let control = self.shared.control();
            (control.mode, self.shared.mode_epoch())
        };
        if epoch != self.seen_epoch {
            self.seen_epoch = epoch;
            self.tracker.reset();
            self.frame_counter = 0;
            self.overlay = Overlay::default();
        }

        let report = match mode {
            Mode::Manual => CycleReport::Manual,
            Mode::Autonomous => self.autonomous_cycle(&frame, epoch),
        };

        annotate(&mut frame, &self.config.zones, &self.overlay, mode);
        self.shared.publish_frame(frame);
        self.tick();
        report
    }

    fn autonomous_cycle(&mut self, frame: &RgbImage, epoch: u64) -> CycleReport {
        self.frame_counter += 1;
        if self.frame_counter % self.config.frame_skip as u64 != 0 {
            return CycleReport::Skipped;
        }
        let Some(detector) = self.detector.as_mut() else {
            return CycleReport::Skipped;
        };

        let candidate = match detector.best_candidate(frame) {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!("⚠️ 检测失败: {:#}", e);
                None
            }
        };
        let position = self.tracker.update(candidate.as_ref());
        let zone = position
            .x()
            .map(|x| self.config.zones.classify(x, self.config.frame_width));
        let steering = zone.map(Steering::Zone).unwrap_or(Steering::Stop);

        // 持锁分发: 模式切换不能插在判定与发送之间。
        // 脉冲转向持锁最长 burst × burst_delay, 配置校验限制在 MAX_BURST_MS 内
        let dispatched = {
            let mut control = self.shared.control();
            if control.mode == Mode::Autonomous && self.shared.mode_epoch() == epoch {
                let outcome = control.dispatcher.dispatch(steering);
                Some((outcome, control.dispatcher.state().last_sent_command.clone()))
            } else {
                None
            }
        };

        if let Some(det) = candidate.as_ref() {
            debug!("目标候选 {}", det);
        }
        debug!(
            "位置 {:?} → {} | 平均置信度 {:.3} | 丢失 {} 帧",
            position,
            steering.label(),
            self.tracker.avg_confidence(),
            self.tracker.frames_without_detection()
        );

        self.overlay = Overlay {
            steering: Some(steering),
            target: match position {
                TrackedPosition::Fresh { x, y, .. } => Some((x, y)),
                TrackedPosition::Bridged { x } => Some((x, self.config.frame_height as f32 / 2.0)),
                TrackedPosition::Lost => None,
            },
            bridged: matches!(position, TrackedPosition::Bridged { .. }),
            bbox: match position {
                TrackedPosition::Fresh { .. } => candidate.and_then(|d| d.bbox),
                _ => None,
            },
        };

        let avg_confidence = self.tracker.avg_confidence();
        let target_locked = self.tracker.is_locked();
        let frames_without_detection = self.tracker.frames_without_detection();
        let outcome = dispatched.as_ref().map(|(outcome, _)| *outcome);
        self.shared.update_status(|s| {
            s.zone = zone;
            s.steering = steering.label().to_string();
            s.avg_confidence = avg_confidence;
            s.target_locked = target_locked;
            s.frames_without_detection = frames_without_detection;
            if let Some((_, last)) = dispatched {
                s.last_command = last;
            }
        });

        CycleReport::Processed {
            position,
            steering,
            outcome,
        }
    }

    fn camera_miss(&mut self, err: Option<anyhow::Error>) -> CycleReport {
        self.camera_failures = self.camera_failures.saturating_add(1);
        match err {
            Some(e) if self.camera_failures == 1 => warn!("⚠️ 读帧失败: {:#}", e),
            Some(e) => debug!("读帧失败 ({}): {:#}", self.camera_failures, e),
            None => debug!("暂无可用帧 ({})", self.camera_failures),
        }
        if self.camera_failures == self.config.camera_degraded_after {
            warn!("⚠️ 摄像头连续 {} 次无帧, 标记为降级", self.camera_failures);
            self.shared.update_status(|s| s.camera_degraded = true);
        }
        if !self.config.camera_retry.is_zero() {
            thread::sleep(self.config.camera_retry);
        }
        CycleReport::NoFrame
    }

    /// 每60轮打印一次帧率
    fn tick(&mut self) {
        self.cycles += 1;
        if self.cycles % 60 != 0 {
            return;
        }
        let elapsed = self.last_report.elapsed().as_secs_f64();
        self.last_report = Instant::now();
        let fps = if elapsed > 0.0 { 60.0 / elapsed } else { 0.0 };
        let inference_ms = self
            .detector
            .as_ref()
            .map(|d| d.mean_inference_ms())
            .unwrap_or(0.0);
        self.shared.update_status(|s| s.fps = fps);

        let status = self.handle().status();
        info!(
            "📊 {:.1} fps | {} | {} | 置信度 {:.3} | 推理 {:.1}ms",
            fps, status.mode, status.steering, status.avg_confidence, inference_ms
        );
    }
}
