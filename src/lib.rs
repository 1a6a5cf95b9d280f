// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 命令行与参数文件
pub mod control; // 运动控制: 区域/命令/分发/链路
pub mod detection; // 检测与跟踪
pub mod error; // 类型化错误
pub mod input; // 视频输入系统
pub mod models; // 推理后端与输出解码
pub mod pipeline; // 控制环与控制面
pub mod utils;

pub use crate::config::{Args, FollowerConfig};
pub use crate::error::{CommandParseError, ConfigError, ControlError, ModelError};
pub use crate::models::{InferenceBackend, OrtBackend, OrtConfig};
pub use crate::pipeline::{ControlHandle, ControlLoop, Mode, StatusSnapshot};

/// 本地时间字符串, 用于快照文件名
pub fn gen_time_string(delimiter: &str) -> String {
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S{}%3f",
        delimiter, delimiter, delimiter, delimiter, delimiter, delimiter
    );
    chrono::Local::now().format(&fmt).to_string()
}
