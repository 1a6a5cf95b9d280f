// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 控制流水线 (Control Pipeline)
///
/// 控制环线程 + 推理工作线程, 通过共享状态对外:
/// - ControlLoop:   每帧 读帧 → 检测 → 跟踪 → 区域 → 发命令
/// - ControlHandle: 外部控制面 (模式/速度/手动命令/遥测)
/// - annotation:    帧叠加层
/// - console:       stdin 控制台命令
pub mod annotation;
pub mod console;
pub mod control_loop;

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Once};

use image::RgbImage;
use serde::Serialize;
use tracing::{info, warn};

use crate::control::{Command, CommandDispatcher, RobotStatus, SpeedKind, Zone};
use crate::error::ControlError;

pub use console::ConsoleCommand;
pub use control_loop::{ControlLoop, CycleReport, LoopConfig};

// ========== 模式 ==========

/// 运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    Manual,
    Autonomous,
}

impl FromStr for Mode {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MANUAL" => Ok(Mode::Manual),
            "AUTO" | "AUTONOMOUS" => Ok(Mode::Autonomous),
            _ => Err(ControlError::UnknownMode(s.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Manual => f.write_str("MANUAL"),
            Mode::Autonomous => f.write_str("AUTONOMOUS"),
        }
    }
}

// ========== 共享状态 ==========

/// 遥测快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub mode: Mode,
    pub zone: Option<Zone>,
    pub steering: String,
    pub avg_confidence: f32,
    pub target_locked: bool,
    pub frames_without_detection: u32,
    pub camera_degraded: bool,
    pub detector_available: bool,
    pub distance_cm: Option<u32>,
    pub obstacle_clear: bool,
    pub forward_speed: u8,
    pub turn_speed: u8,
    pub fps: f64,
    pub last_command: Option<String>,
}

impl StatusSnapshot {
    fn initial(detector_available: bool, speeds: (u8, u8)) -> Self {
        Self {
            mode: Mode::Manual,
            zone: None,
            steering: "IDLE".to_string(),
            avg_confidence: 0.0,
            target_locked: false,
            frames_without_detection: 0,
            camera_degraded: false,
            detector_available,
            distance_cm: None,
            obstacle_clear: true,
            forward_speed: speeds.0,
            turn_speed: speeds.1,
            fps: 0.0,
            last_command: None,
        }
    }
}

/// 模式与分发器放在同一把锁下: 切换模式和 STOP 之间不会插入其他命令
pub(crate) struct Control {
    pub(crate) mode: Mode,
    pub(crate) dispatcher: CommandDispatcher,
}

pub(crate) struct SharedState {
    control: Mutex<Control>,
    latest_frame: Mutex<Option<Arc<RgbImage>>>,
    status: Mutex<StatusSnapshot>,
    robot: Arc<Mutex<RobotStatus>>,
    running: Arc<AtomicBool>,
    /// 每次切换模式 +1, 控制环据此重置跟踪状态
    mode_epoch: AtomicU64,
    detector_available: bool,
}

impl SharedState {
    pub(crate) fn new(dispatcher: CommandDispatcher, detector_available: bool) -> Self {
        let speeds = dispatcher.speeds();
        Self {
            control: Mutex::new(Control {
                mode: Mode::Manual,
                dispatcher,
            }),
            latest_frame: Mutex::new(None),
            status: Mutex::new(StatusSnapshot::initial(detector_available, speeds)),
            robot: Arc::new(Mutex::new(RobotStatus::default())),
            running: Arc::new(AtomicBool::new(true)),
            mode_epoch: AtomicU64::new(0),
            detector_available,
        }
    }

    /// 锁中毒时继续使用内部数据
    pub(crate) fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn update_status(&self, f: impl FnOnce(&mut StatusSnapshot)) {
        let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut status);
    }

    pub(crate) fn publish_frame(&self, frame: RgbImage) {
        let mut slot = self.latest_frame.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(Arc::new(frame));
    }

    pub(crate) fn mode_epoch(&self) -> u64 {
        self.mode_epoch.load(Ordering::Acquire)
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

// ========== 控制面 ==========

/// 外部控制面 (控制台/仪表盘), 可在任意线程克隆使用
#[derive(Clone)]
pub struct ControlHandle {
    shared: Arc<SharedState>,
}

impl ControlHandle {
    pub(crate) fn new(shared: Arc<SharedState>) -> Self {
        Self { shared }
    }

    /// 切换模式: 先同步发送 STOP, 再改变模式
    pub fn set_mode(&self, mode: Mode) -> Result<(), ControlError> {
        if mode == Mode::Autonomous && !self.shared.detector_available {
            warn!("⚠️ 未加载检测模型, 无法进入自主模式");
            return Err(ControlError::DetectorUnavailable);
        }

        let mut control = self.shared.control();
        control.dispatcher.send_immediate(Command::Stop);
        let previous = control.mode;
        control.mode = mode;
        self.shared.mode_epoch.fetch_add(1, Ordering::AcqRel);
        let last_command = control.dispatcher.state().last_sent_command.clone();
        drop(control);

        self.shared.update_status(|s| {
            s.mode = mode;
            s.zone = None;
            s.steering = "STOP".to_string();
            s.last_command = last_command;
        });
        info!("🔁 模式切换: {} → {}", previous, mode);
        Ok(())
    }

    pub fn mode(&self) -> Mode {
        self.shared.control().mode
    }

    /// 设置速度, 返回钳制后的值
    pub fn set_speed(&self, kind: SpeedKind, value: i64) -> u8 {
        let mut control = self.shared.control();
        let clamped = control.dispatcher.set_speed(kind, value);
        let (forward, turn) = control.dispatcher.speeds();
        drop(control);

        self.shared.update_status(|s| {
            s.forward_speed = forward;
            s.turn_speed = turn;
        });
        info!("⚙️ {} 速度 = {}", kind, clamped);
        clamped
    }

    /// 手动命令, 仅 MANUAL 模式接受; 返回实际发送的命令
    pub fn send_manual_command(&self, raw: &str) -> Result<Command, ControlError> {
        let command: Command = raw.parse()?;

        let mut control = self.shared.control();
        if control.mode != Mode::Manual {
            return Err(ControlError::NotManual);
        }
        let command = control.dispatcher.with_current_speed(command);
        control.dispatcher.send_immediate(command);
        let last_command = control.dispatcher.state().last_sent_command.clone();
        drop(control);

        self.shared.update_status(|s| s.last_command = last_command);
        Ok(command)
    }

    /// 最新的标注帧 (共享只读)
    pub fn latest_frame(&self) -> Option<Arc<RgbImage>> {
        self.shared
            .latest_frame
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn status(&self) -> StatusSnapshot {
        let robot = *self.shared.robot.lock().unwrap_or_else(|e| e.into_inner());
        let mut status = self
            .shared
            .status
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        status.distance_cm = robot.distance_cm;
        status.obstacle_clear = robot.obstacle_clear();
        status
    }

    /// 机器人距离回传的写入端 (交给 StatusListener)
    pub fn robot_status(&self) -> Arc<Mutex<RobotStatus>> {
        self.shared.robot.clone()
    }

    /// 运行标志 (交给后台线程)
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.shared.running.clone()
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// 请求退出, 控制环结束时发送最后一个 STOP
    pub fn shutdown(&self) {
        if self.shared.running.swap(false, Ordering::Relaxed) {
            info!("🛑 收到退出请求");
        }
    }

    /// 中断回调 (Ctrl+C / SIGTERM): 只清除运行标志, 由控制环发送最后的 STOP
    pub fn interrupt_callback(&self) -> impl Fn() + Send + 'static {
        let handle = self.clone();
        move || {
            warn!("⚠️ 收到中断信号, 停车退出");
            handle.shutdown();
        }
    }

    /// 安装进程级中断处理, 只会安装一次
    pub fn install_interrupt_handler(&self) {
        static HANDLER: Once = Once::new();
        let callback = self.interrupt_callback();
        HANDLER.call_once(move || {
            if let Err(e) = ctrlc::set_handler(callback) {
                warn!("⚠️ 无法安装 Ctrl+C 处理: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{DispatcherConfig, RecordingTransport};

    fn handle_with(
        detector_available: bool,
        config: DispatcherConfig,
    ) -> (ControlHandle, RecordingTransport) {
        let recorder = RecordingTransport::new();
        let dispatcher = CommandDispatcher::new(Box::new(recorder.clone()), config);
        let shared = Arc::new(SharedState::new(dispatcher, detector_available));
        (ControlHandle::new(shared), recorder)
    }

    fn handle(detector_available: bool) -> (ControlHandle, RecordingTransport) {
        handle_with(
            detector_available,
            DispatcherConfig {
                burst_delay: std::time::Duration::ZERO,
                ..DispatcherConfig::default()
            },
        )
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!("auto".parse::<Mode>(), Ok(Mode::Autonomous));
        assert_eq!("AUTONOMOUS".parse::<Mode>(), Ok(Mode::Autonomous));
        assert_eq!(" Manual ".parse::<Mode>(), Ok(Mode::Manual));
        assert_eq!(
            "drive".parse::<Mode>(),
            Err(ControlError::UnknownMode("drive".into()))
        );
    }

    #[test]
    fn test_mode_switch_sends_stop_first() {
        let (handle, recorder) = handle(true);
        handle.set_mode(Mode::Autonomous).unwrap();
        assert_eq!(
            handle.send_manual_command("LEFT"),
            Err(ControlError::NotManual)
        );
        handle.set_mode(Mode::Manual).unwrap();
        assert_eq!(
            handle.send_manual_command("forward").unwrap(),
            Command::Forward(Some(200))
        );
        assert_eq!(recorder.lines(), vec!["STOP", "STOP", "FORWARD:200"]);
        assert_eq!(handle.status().last_command.as_deref(), Some("FORWARD:200"));
    }

    #[test]
    fn test_autonomous_requires_detector() {
        let (handle, recorder) = handle(false);
        assert_eq!(
            handle.set_mode(Mode::Autonomous),
            Err(ControlError::DetectorUnavailable)
        );
        assert_eq!(handle.mode(), Mode::Manual);
        assert!(recorder.lines().is_empty());
    }

    #[test]
    fn test_set_speed_clamps_and_reports() {
        let (handle, recorder) = handle(true);
        assert_eq!(handle.set_speed(SpeedKind::Forward, 999), 255);
        assert_eq!(handle.set_speed(SpeedKind::Turn, -5), 80);
        let status = handle.status();
        assert_eq!((status.forward_speed, status.turn_speed), (255, 80));
        assert_eq!(
            handle.send_manual_command("RIGHT").unwrap(),
            Command::Right(Some(80))
        );
        assert_eq!(recorder.lines(), vec!["RIGHT:80"]);
    }

    #[test]
    fn test_invalid_manual_command() {
        let (handle, _) = handle(true);
        assert!(matches!(
            handle.send_manual_command("JUMP"),
            Err(ControlError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_manual_speed_clamped_regardless_of_speed_commands() {
        for speed_commands in [true, false] {
            let (handle, recorder) = handle_with(
                true,
                DispatcherConfig {
                    speed_commands,
                    ..DispatcherConfig::default()
                },
            );
            assert_eq!(
                handle.send_manual_command("LEFT:250").unwrap(),
                Command::Left(Some(200))
            );
            assert_eq!(
                handle.send_manual_command("right:300").unwrap(),
                Command::Right(Some(200))
            );
            assert_eq!(recorder.lines(), vec!["LEFT:200", "RIGHT:200"]);
        }
    }

    #[test]
    fn test_interrupt_callback_requests_shutdown() {
        let (handle, _) = handle(true);
        let on_interrupt = handle.interrupt_callback();
        std::thread::spawn(on_interrupt).join().unwrap();
        assert!(!handle.is_running());
    }

    #[test]
    fn test_shutdown_clears_running() {
        let (handle, _) = handle(true);
        assert!(handle.is_running());
        handle.shutdown();
        assert!(!handle.is_running());
    }
}
