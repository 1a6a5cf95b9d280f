// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 类型化错误 (Typed errors)
//!
//! 内部管线使用 `anyhow::Result`, 只有对外边界(控制面、模型加载、命令解析、配置)
//! 需要调用方能区分的错误类型。

use thiserror::Error;

/// 控制面错误: 外部命令被拒绝时返回给调用方
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("unknown mode {0:?} (expected MANUAL or AUTO)")]
    UnknownMode(String),

    #[error("unknown speed kind {0:?} (expected forward or turn)")]
    UnknownSpeedKind(String),

    #[error(transparent)]
    InvalidCommand(#[from] CommandParseError),

    #[error("manual commands are only accepted in MANUAL mode")]
    NotManual,

    #[error("no detector loaded, AUTONOMOUS mode unavailable")]
    DetectorUnavailable,
}

/// 模型加载/形状错误 (启动时致命, 仅禁用自主模式)
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("unsupported output layout: {0}")]
    UnsupportedLayout(String),

    #[error("unsupported tensor element type: {0}")]
    UnsupportedElementType(String),

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
}

/// 电机命令解析错误
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("empty command")]
    Empty,

    #[error("unknown command {0:?}")]
    Unknown(String),

    #[error("invalid speed {value:?} in command {command:?}")]
    InvalidSpeed { command: String, value: String },
}

/// 配置校验错误
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("zone boundaries must be strictly increasing inside (0, 1): {0:?}")]
    ZoneBoundaries(Vec<f32>),

    #[error("{field} range is empty: min {min} > max {max}")]
    SpeedRange { field: &'static str, min: u8, max: u8 },

    #[error("confidence threshold {0} outside [0, 1]")]
    Threshold(f32),

    #[error("turn burst holds the control lock for {ms} ms (max {max} ms)")]
    BurstTooLong { ms: u64, max: u64 },
}
