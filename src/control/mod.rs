// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 运动控制 (Motion Control)
///
/// 转向决策 → 电机命令 → 链路:
/// - zone:       像素位置 → 转向区域
/// - command:    电机命令词表
/// - dispatcher: 限速/去重/脉冲转向
/// - transport:  UDP / 串口 链路
/// - status:     机器人距离回传
pub mod command;
pub mod dispatcher;
pub mod status;
pub mod transport;
pub mod zone;

pub use command::Command;
pub use dispatcher::{
    CommandDispatcher, CommandState, DispatchOutcome, DispatcherConfig, SpeedKind, SpeedLimits,
    Steering, StopPolicy,
};
pub use status::{RobotStatus, StatusListener};
pub use transport::{RecordingTransport, SerialTransport, Transport, TransportSpec, UdpTransport};
pub use zone::{Zone, ZoneLayout};
