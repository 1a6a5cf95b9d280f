// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测系统 (Detection System)
///
/// - preprocess: 帧 → 模型输入张量
/// - detector:   推理工作线程, 输出最佳候选
/// - tracker:    置信度/位置平滑, 锁定判定
pub mod detector;
pub mod preprocess;
pub mod tracker;
pub mod types;

pub use detector::{Detector, DetectorConfig};
pub use tracker::{TargetTracker, TrackedPosition, TrackerConfig};
pub use types::{BBox, Detection, FRAME_HEIGHT, FRAME_WIDTH};
