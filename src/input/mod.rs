// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 视频输入系统 (Video Input System)
///
/// - Camera:      统一读帧接口
/// - MjpegCamera: HTTP MJPEG 流 (后台线程, 只保留最新帧)
/// - StillCommandCamera / ImageFileCamera: 拍照命令 / 图片回放
pub mod camera;
pub mod mjpeg;

pub use camera::{
    Camera, CameraSource, CameraTimeouts, ImageFileCamera, StillCommandCamera,
    DEFAULT_STILL_COMMAND,
};
pub use mjpeg::MjpegCamera;
