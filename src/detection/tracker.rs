// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 单目标跟踪 (Single-target tracker)
//!
//! 平滑置信度与横向位置, 决定目标是否锁定:
//! - 置信度滑动平均超过阈值才算检测到
//! - 短暂丢失 (< debounce_frames) 时沿用最后位置
//! - 连续丢失超过 search_frames 后解除锁定, 清空位置历史

use crate::detection::types::Detection;
use crate::utils::fifo::BoundedFifo;

/// 跟踪参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerConfig {
    pub confidence_threshold: f32,
    pub debounce_frames: u32,
    pub search_frames: u32,
    pub history_size: usize,
    pub position_history_size: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.12,
            debounce_frames: 5,
            search_frames: 15,
            history_size: 3,
            position_history_size: 3,
        }
    }
}

/// 每帧跟踪结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackedPosition {
    /// 本帧检测到, x 为平滑后的位置
    Fresh { x: f32, y: f32, confidence: f32 },
    /// 短暂丢失, 沿用最后位置
    Bridged { x: f32 },
    Lost,
}

impl TrackedPosition {
    pub fn x(&self) -> Option<f32> {
        match *self {
            TrackedPosition::Fresh { x, .. } | TrackedPosition::Bridged { x } => Some(x),
            TrackedPosition::Lost => None,
        }
    }
}

pub struct TargetTracker {
    config: TrackerConfig,
    confidences: BoundedFifo<f32>,
    positions: BoundedFifo<f32>,
    frames_without_detection: u32,
    target_locked: bool,
    last_known_x: Option<f32>,
}

impl TargetTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            confidences: BoundedFifo::with_capacity(config.history_size),
            positions: BoundedFifo::with_capacity(config.position_history_size),
            config,
            frames_without_detection: 0,
            target_locked: false,
            last_known_x: None,
        }
    }

    /// 输入本帧最佳候选 (未过阈值), 无候选时传 `None`
    pub fn update(&mut self, candidate: Option<&Detection>) -> TrackedPosition {
        self.confidences
            .push(candidate.map(|c| c.confidence).unwrap_or(0.0));
        let avg = self.avg_confidence();

        if let Some(det) = candidate.filter(|_| avg > self.config.confidence_threshold) {
            self.positions.push(det.center_x);
            let x = self.positions.mean().unwrap_or(det.center_x);
            self.frames_without_detection = 0;
            self.target_locked = true;
            self.last_known_x = Some(x);
            return TrackedPosition::Fresh {
                x,
                y: det.center_y,
                confidence: avg,
            };
        }

        self.frames_without_detection = self.frames_without_detection.saturating_add(1);

        if self.target_locked && self.frames_without_detection < self.config.debounce_frames {
            if let Some(x) = self.last_known_x {
                return TrackedPosition::Bridged { x };
            }
        }

        if self.frames_without_detection > self.config.search_frames {
            self.target_locked = false;
            self.last_known_x = None;
            self.positions.clear();
        }

        TrackedPosition::Lost
    }

    pub fn avg_confidence(&self) -> f32 {
        self.confidences.mean().unwrap_or(0.0)
    }

    pub fn is_locked(&self) -> bool {
        self.target_locked
    }

    pub fn frames_without_detection(&self) -> u32 {
        self.frames_without_detection
    }

    pub fn last_known_x(&self) -> Option<f32> {
        self.last_known_x
    }

    pub fn position_history_len(&self) -> usize {
        self.positions.len()
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// 清空全部状态 (切换模式时调用)
    pub fn reset(&mut self) {
        self.confidences.clear();
        self.positions.clear();
        self.frames_without_detection = 0;
        self.target_locked = false;
        self.last_known_x = None;
    }
}
