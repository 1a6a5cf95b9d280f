// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 检测器 (Detector)
//! 职责: 帧 → 推理工作线程 → 最佳候选 Detection
//!
//! 推理在独立线程中执行, 控制环最多等待 `inference_timeout`。
//! 超时或工作线程仍在处理上一帧时, 本帧按"未检测到"处理。

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use image::RgbImage;
use tracing::{debug, info, warn};

use super::preprocess::Preprocessor;
use super::types::Detection;
use crate::models::{DetectionOutput, InferenceBackend, InputSpec, OutputLayout};

/// 检测参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    pub confidence_threshold: f32,
    pub inference_timeout: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.12,
            inference_timeout: Duration::from_millis(500),
        }
    }
}

/// 推理任务 (控制环 → 工作线程)
struct InferenceJob {
    seq: u64,
    frame: RgbImage,
}

/// 推理结果 (工作线程 → 控制环)
struct InferenceReply {
    seq: u64,
    result: Result<Option<Detection>>,
    inference_ms: f64,
}

pub struct Detector {
    job_tx: Option<Sender<InferenceJob>>,
    reply_rx: Receiver<InferenceReply>,
    worker: Option<JoinHandle<()>>,
    input: InputSpec,
    layout: OutputLayout,
    config: DetectorConfig,
    seq: u64,
    in_flight: Option<u64>,

    // 统计
    count: u64,
    total_ms: f64,
}

impl Detector {
    /// 加载时确定输出格式, 不支持的格式直接返回 `ModelError`
    pub fn new(backend: Box<dyn InferenceBackend>, config: DetectorConfig) -> Result<Self> {
        let layout = OutputLayout::resolve(backend.output_specs())?;
        let input = backend.input_spec().clone();
        info!(
            "🔍 检测器: {} | 输入 {}x{}x{} {}",
            layout.name(),
            input.width,
            input.height,
            input.channels,
            input.element_type
        );

        let (job_tx, job_rx) = crossbeam_channel::bounded::<InferenceJob>(1);
        let (reply_tx, reply_rx) = crossbeam_channel::bounded::<InferenceReply>(1);
        let worker = thread::Builder::new()
            .name("inference".into())
            .spawn(move || inference_worker(backend, layout, job_rx, reply_tx))?;

        Ok(Self {
            job_tx: Some(job_tx),
            reply_rx,
            worker: Some(worker),
            input,
            layout,
            config,
            seq: 0,
            in_flight: None,
            count: 0,
            total_ms: 0.0,
        })
    }

    pub fn input_spec(&self) -> &InputSpec {
        &self.input
    }

    pub fn layout(&self) -> OutputLayout {
        self.layout
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// 本帧最高分候选 (不过滤阈值)
    ///
    /// 只有工作线程退出时返回错误; 推理失败、超时、忙碌都返回 `Ok(None)`。
    pub fn best_candidate(&mut self, frame: &RgbImage) -> Result<Option<Detection>> {
        self.drain_stale()?;
        if let Some(seq) = self.in_flight {
            debug!("推理线程忙 (seq={}), 跳过本帧", seq);
            return Ok(None);
        }

        self.seq += 1;
        let seq = self.seq;
        let tx = self
            .job_tx
            .as_ref()
            .ok_or_else(|| anyhow!("检测器已关闭"))?;
        match tx.try_send(InferenceJob {
            seq,
            frame: frame.clone(),
        }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => return Ok(None),
            Err(TrySendError::Disconnected(_)) => return Err(anyhow!("推理线程已退出")),
        }
        self.in_flight = Some(seq);

        let deadline = Instant::now() + self.config.inference_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.reply_rx.recv_timeout(remaining) {
                Ok(reply) if reply.seq == seq => {
                    self.in_flight = None;
                    self.record(reply.inference_ms);
                    return match reply.result {
                        Ok(candidate) => Ok(candidate),
                        Err(e) => {
                            warn!("⚠️ 推理失败: {:#}", e);
                            Ok(None)
                        }
                    };
                }
                Ok(stale) => debug!("丢弃过期推理结果 seq={}", stale.seq),
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        "⚠️ 推理超时 ({} ms), 本帧按未检测处理",
                        self.config.inference_timeout.as_millis()
                    );
                    return Ok(None);
                }
                Err(RecvTimeoutError::Disconnected) => return Err(anyhow!("推理线程已退出")),
            }
        }
    }

    /// 过阈值 (严格大于) 的检测结果
    pub fn detect(&mut self, frame: &RgbImage) -> Result<Option<Detection>> {
        let threshold = self.config.confidence_threshold;
        Ok(self
            .best_candidate(frame)?
            .filter(|d| d.confidence > threshold))
    }

    /// 平均推理耗时 (ms)
    pub fn mean_inference_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_ms / self.count as f64
        }
    }

    /// 收取超时任务的迟到结果
    fn drain_stale(&mut self) -> Result<()> {
        loop {
            match self.reply_rx.try_recv() {
                Ok(reply) => {
                    if self.in_flight == Some(reply.seq) {
                        self.in_flight = None;
                    }
                    debug!("丢弃过期推理结果 seq={}", reply.seq);
                }
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => return Err(anyhow!("推理线程已退出")),
            }
        }
    }

    fn record(&mut self, inference_ms: f64) {
        self.count += 1;
        self.total_ms += inference_ms;
        if self.count % 60 == 0 {
            debug!("🎯 推理: {:.1}ms/帧 (平均)", self.mean_inference_ms());
        }
    }
}

impl Drop for Detector {
    fn drop(&mut self) {
        // 关闭任务通道, 工作线程随之退出
        self.job_tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn inference_worker(
    mut backend: Box<dyn InferenceBackend>,
    layout: OutputLayout,
    jobs: Receiver<InferenceJob>,
    replies: Sender<InferenceReply>,
) {
    let mut preprocessor = Preprocessor::new();
    let spec = backend.input_spec().clone();

    for job in jobs.iter() {
        let start = Instant::now();
        let result = (|| -> Result<Option<Detection>> {
            let input = preprocessor.prepare(&job.frame, &spec)?;
            let outputs = backend.invoke(input)?;
            let decoded = DetectionOutput::from_outputs(layout, &outputs)?;
            Ok(decoded.best_candidate(job.frame.width(), job.frame.height()))
        })();
        let reply = InferenceReply {
            seq: job.seq,
            result,
            inference_ms: start.elapsed().as_secs_f64() * 1000.0,
        };
        if replies.send(reply).is_err() {
            break;
        }
    }
    debug!("推理线程退出");
}
