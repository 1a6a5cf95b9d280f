// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 命令分发器 (Command Dispatcher)
//!
//! 职责: 转向区域 → 电机命令 → 限速/去重 → 链路
//!
//! 规则:
//! - 相同命令在 `min_interval` 内重复发送会被抑制
//! - `rate_limit_changes` 打开时, 距上次发送不足 `min_interval` 的新命令也被丢弃
//! - 急转/缓转以"脉冲"方式发送: 转向命令发N次(固定间隔), 然后无条件 STOP
//! - 带速度的命令在发送前把速度钳制到配置上下限
//! - 搜索状态下的 STOP 是否参与去重由 `StopPolicy` 决定
//! - 发送失败只记录日志, 控制回路继续运行

use std::fmt;
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::command::Command;
use super::transport::Transport;
use super::zone::Zone;
use crate::error::ControlError;

/// 搜索状态 STOP 的发送策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopPolicy {
    /// 每次都发送 (安全命令不参与去重)
    #[default]
    Always,
    /// 与普通命令一样参与去重
    Suppress,
}

/// 速度类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedKind {
    Forward,
    Turn,
}

impl FromStr for SpeedKind {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forward" => Ok(SpeedKind::Forward),
            "turn" => Ok(SpeedKind::Turn),
            _ => Err(ControlError::UnknownSpeedKind(s.to_string())),
        }
    }
}

impl fmt::Display for SpeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpeedKind::Forward => f.write_str("forward"),
            SpeedKind::Turn => f.write_str("turn"),
        }
    }
}

/// 速度上下限 (0-255)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeedLimits {
    pub min: u8,
    pub max: u8,
}

impl SpeedLimits {
    pub fn clamp(&self, value: i64) -> u8 {
        value.clamp(self.min as i64, self.max as i64) as u8
    }
}

/// 分发器参数
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub min_interval: Duration,
    /// 不同命令也受最小间隔限制
    pub rate_limit_changes: bool,
    pub hard_turn_burst: u32,
    pub slight_turn_burst: u32,
    /// 脉冲间隔; 一次脉冲最长占用 `burst × burst_delay`
    pub burst_delay: Duration,
    pub speed_commands: bool,
    pub stop_policy: StopPolicy,
    pub forward_limits: SpeedLimits,
    pub turn_limits: SpeedLimits,
    pub forward_speed: u8,
    pub turn_speed: u8,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(50),
            rate_limit_changes: true,
            hard_turn_burst: 1,
            slight_turn_burst: 1,
            burst_delay: Duration::from_millis(60),
            speed_commands: true,
            stop_policy: StopPolicy::Always,
            forward_limits: SpeedLimits { min: 100, max: 255 },
            turn_limits: SpeedLimits { min: 80, max: 200 },
            forward_speed: 200,
            turn_speed: 120,
        }
    }
}

/// 转向决策: 某个区域, 或停车(无目标/搜索)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Steering {
    Zone(Zone),
    Stop,
}

impl Steering {
    pub fn label(&self) -> &'static str {
        match self {
            Steering::Zone(zone) => zone.label(),
            Steering::Stop => "SEARCHING",
        }
    }
}

/// 最近一次发送 (仅由分发器更新)
#[derive(Debug, Clone, Default)]
pub struct CommandState {
    pub last_sent_command: Option<String>,
    pub last_sent_time: Option<Instant>,
}

/// 单次分发结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// 实际发出的数据报数量
    Sent(usize),
    Suppressed,
}

pub struct CommandDispatcher {
    transport: Box<dyn Transport>,
    config: DispatcherConfig,
    state: CommandState,
    forward_speed: u8,
    turn_speed: u8,
    closed: bool,
}

impl CommandDispatcher {
    pub fn new(transport: Box<dyn Transport>, config: DispatcherConfig) -> Self {
        let forward_speed = config.forward_limits.clamp(config.forward_speed as i64);
        let turn_speed = config.turn_limits.clamp(config.turn_speed as i64);
        Self {
            transport,
            config,
            state: CommandState::default(),
            forward_speed,
            turn_speed,
            closed: false,
        }
    }

    pub fn state(&self) -> &CommandState {
        &self.state
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// (前进速度, 转向速度)
    pub fn speeds(&self) -> (u8, u8) {
        (self.forward_speed, self.turn_speed)
    }

    /// 设置速度, 返回钳制后的实际值
    pub fn set_speed(&mut self, kind: SpeedKind, value: i64) -> u8 {
        let clamped = match kind {
            SpeedKind::Forward => {
                self.forward_speed = self.config.forward_limits.clamp(value);
                self.forward_speed
            }
            SpeedKind::Turn => {
                self.turn_speed = self.config.turn_limits.clamp(value);
                self.turn_speed
            }
        };
        if clamped as i64 != value {
            debug!("速度 {} 钳制: {} → {}", kind, value, clamped);
        }
        clamped
    }

    /// 区域对应的电机命令 (带当前速度)
    pub fn command_for(&self, zone: Zone) -> Command {
        let turn = self.config.speed_commands.then_some(self.turn_speed);
        match zone {
            Zone::Center => {
                Command::Forward(self.config.speed_commands.then_some(self.forward_speed))
            }
            z if z.is_left() => Command::Left(turn),
            _ => Command::Right(turn),
        }
    }

    /// 手动命令: 显式速度一律钳制, 缺省速度仅在 `speed_commands` 打开时补齐
    pub fn with_current_speed(&self, command: Command) -> Command {
        let fill = self.config.speed_commands;
        match command {
            Command::Forward(None) if fill => Command::Forward(Some(self.forward_speed)),
            Command::Left(None) if fill => Command::Left(Some(self.turn_speed)),
            Command::Right(None) if fill => Command::Right(Some(self.turn_speed)),
            Command::Forward(Some(v)) => {
                Command::Forward(Some(self.config.forward_limits.clamp(v as i64)))
            }
            Command::Left(Some(v)) => Command::Left(Some(self.config.turn_limits.clamp(v as i64))),
            Command::Right(Some(v)) => Command::Right(Some(self.config.turn_limits.clamp(v as i64))),
            other => other,
        }
    }

    /// 按转向决策发送
    pub fn dispatch(&mut self, steering: Steering) -> DispatchOutcome {
        match steering {
            Steering::Stop => match self.config.stop_policy {
                StopPolicy::Always => Self::outcome(self.send_immediate(Command::Stop)),
                StopPolicy::Suppress => self.send_if_changed(Command::Stop),
            },
            Steering::Zone(Zone::Center) => self.send_if_changed(self.command_for(Zone::Center)),
            Steering::Zone(zone) => {
                let times = match zone {
                    Zone::HardLeft | Zone::HardRight => self.config.hard_turn_burst,
                    _ => self.config.slight_turn_burst,
                };
                let command = self.command_for(zone);
                DispatchOutcome::Sent(self.burst(command, times))
            }
        }
    }

    /// 限速 + 去重: 最小间隔内相同命令被抑制, `rate_limit_changes` 时新命令同样被抑制
    pub fn send_if_changed(&mut self, command: Command) -> DispatchOutcome {
        let line = command.to_string();
        if let (Some(last), Some(at)) = (&self.state.last_sent_command, self.state.last_sent_time) {
            let within = at.elapsed() < self.config.min_interval;
            if within && (*last == line || self.config.rate_limit_changes) {
                return DispatchOutcome::Suppressed;
            }
        }
        Self::outcome(self.send_line(&line))
    }

    /// 立即发送, 不参与去重 (模式切换/手动命令/停车)
    pub fn send_immediate(&mut self, command: Command) -> bool {
        self.send_line(&command.to_string())
    }

    /// 脉冲转向: 发送 `times` 次后无条件 STOP, 返回成功发送的数据报数量
    pub fn burst(&mut self, command: Command, times: u32) -> usize {
        let line = command.to_string();
        let mut sent = 0;
        for _ in 0..times {
            if self.send_line(&line) {
                sent += 1;
            }
            if !self.config.burst_delay.is_zero() {
                thread::sleep(self.config.burst_delay);
            }
        }
        if self.send_immediate(Command::Stop) {
            sent += 1;
        }
        sent
    }

    /// 关闭前尽力发送最后一个 STOP
    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.send_line(&Command::Stop.to_string()) {
            debug!("🛑 关闭前已发送 STOP");
        }
    }

    fn outcome(sent: bool) -> DispatchOutcome {
        DispatchOutcome::Sent(usize::from(sent))
    }

    fn send_line(&mut self, line: &str) -> bool {
        match self.transport.send(line) {
            Ok(()) => {
                self.state.last_sent_command = Some(line.to_string());
                self.state.last_sent_time = Some(Instant::now());
                debug!("[{}] -> {}", self.transport.describe(), line);
                true
            }
            Err(e) => {
                warn!("⚠️ 命令 {} 发送失败: {:#}", line, e);
                false
            }
        }
    }
}

impl Drop for CommandDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::transport::RecordingTransport;

    fn dispatcher(config: DispatcherConfig) -> (CommandDispatcher, RecordingTransport) {
        let recorder = RecordingTransport::new();
        let d = CommandDispatcher::new(Box::new(recorder.clone()), config);
        (d, recorder)
    }

    fn fast_config() -> DispatcherConfig {
        DispatcherConfig {
            burst_delay: Duration::ZERO,
            min_interval: Duration::from_secs(10),
            rate_limit_changes: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_changed_command_within_interval_is_rate_limited() {
        let config = DispatcherConfig {
            rate_limit_changes: true,
            stop_policy: StopPolicy::Suppress,
            ..fast_config()
        };
        let (mut d, rec) = dispatcher(config);
        assert_eq!(d.dispatch(Steering::Zone(Zone::Center)), DispatchOutcome::Sent(1));
        assert_eq!(d.dispatch(Steering::Stop), DispatchOutcome::Suppressed);
        assert_eq!(d.dispatch(Steering::Zone(Zone::Center)), DispatchOutcome::Suppressed);
        assert_eq!(d.dispatch(Steering::Stop), DispatchOutcome::Suppressed);
        assert_eq!(rec.lines(), vec!["FORWARD:200"]);
    }

    #[test]
    fn test_changed_command_after_interval_is_sent() {
        let config = DispatcherConfig {
            rate_limit_changes: true,
            stop_policy: StopPolicy::Suppress,
            min_interval: Duration::from_millis(30),
            ..fast_config()
        };
        let (mut d, rec) = dispatcher(config);
        d.dispatch(Steering::Zone(Zone::Center));
        thread::sleep(Duration::from_millis(60));
        assert_eq!(d.dispatch(Steering::Stop), DispatchOutcome::Sent(1));
        assert_eq!(rec.lines(), vec!["FORWARD:200", "STOP"]);
    }

    #[test]
    fn test_always_stop_bypasses_rate_limit() {
        let config = DispatcherConfig {
            rate_limit_changes: true,
            ..fast_config()
        };
        let (mut d, rec) = dispatcher(config);
        d.dispatch(Steering::Zone(Zone::Center));
        assert_eq!(d.dispatch(Steering::Stop), DispatchOutcome::Sent(1));
        assert_eq!(rec.lines(), vec!["FORWARD:200", "STOP"]);
    }

    #[test]
    fn test_explicit_manual_speed_always_clamped() {
        for speed_commands in [true, false] {
            let config = DispatcherConfig {
                speed_commands,
                ..fast_config()
            };
            let (d, _) = dispatcher(config);
            assert_eq!(
                d.with_current_speed(Command::Left(Some(250))),
                Command::Left(Some(200))
            );
            assert_eq!(
                d.with_current_speed(Command::Forward(Some(20))),
                Command::Forward(Some(100))
            );
        }
        let (d, _) = dispatcher(DispatcherConfig {
            speed_commands: false,
            ..fast_config()
        });
        assert_eq!(d.with_current_speed(Command::Right(None)), Command::Right(None));
    }

    #[test]
    fn test_duplicate_within_interval_sent_once() {
        let (mut d, rec) = dispatcher(fast_config());
        assert_eq!(d.dispatch(Steering::Zone(Zone::Center)), DispatchOutcome::Sent(1));
        assert_eq!(d.dispatch(Steering::Zone(Zone::Center)), DispatchOutcome::Suppressed);
        assert_eq!(rec.lines(), vec!["FORWARD:200"]);
    }

    #[test]
    fn test_repeat_after_interval_is_resent() {
        let config = DispatcherConfig {
            min_interval: Duration::ZERO,
            burst_delay: Duration::ZERO,
            ..Default::default()
        };
        let (mut d, rec) = dispatcher(config);
        d.dispatch(Steering::Zone(Zone::Center));
        d.dispatch(Steering::Zone(Zone::Center));
        assert_eq!(rec.lines().len(), 2);
    }

    #[test]
    fn test_hard_turn_burst_ends_with_stop() {
        let config = DispatcherConfig {
            hard_turn_burst: 3,
            ..fast_config()
        };
        let (mut d, rec) = dispatcher(config);
        assert_eq!(d.dispatch(Steering::Zone(Zone::HardLeft)), DispatchOutcome::Sent(4));
        assert_eq!(rec.lines(), vec!["LEFT:120", "LEFT:120", "LEFT:120", "STOP"]);
        assert_eq!(d.state().last_sent_command.as_deref(), Some("STOP"));
    }

    #[test]
    fn test_slight_turn_uses_slight_burst() {
        let config = DispatcherConfig {
            hard_turn_burst: 3,
            slight_turn_burst: 1,
            ..fast_config()
        };
        let (mut d, rec) = dispatcher(config);
        d.dispatch(Steering::Zone(Zone::SlightRight));
        assert_eq!(rec.lines(), vec!["RIGHT:120", "STOP"]);
    }

    #[test]
    fn test_stop_policy_always_resends() {
        let (mut d, rec) = dispatcher(fast_config());
        d.dispatch(Steering::Stop);
        d.dispatch(Steering::Stop);
        d.dispatch(Steering::Stop);
        assert_eq!(rec.lines(), vec!["STOP", "STOP", "STOP"]);
    }

    #[test]
    fn test_stop_policy_suppress_dedups() {
        let config = DispatcherConfig {
            stop_policy: StopPolicy::Suppress,
            ..fast_config()
        };
        let (mut d, rec) = dispatcher(config);
        d.dispatch(Steering::Stop);
        assert_eq!(d.dispatch(Steering::Stop), DispatchOutcome::Suppressed);
        assert_eq!(rec.lines(), vec!["STOP"]);
    }

    #[test]
    fn test_speed_clamped_to_limits() {
        let (mut d, rec) = dispatcher(fast_config());
        assert_eq!(d.set_speed(SpeedKind::Forward, 999), 255);
        assert_eq!(d.set_speed(SpeedKind::Forward, 10), 100);
        assert_eq!(d.set_speed(SpeedKind::Turn, -5), 80);
        assert_eq!(d.set_speed(SpeedKind::Turn, 150), 150);
        assert_eq!(d.speeds(), (100, 150));
        d.dispatch(Steering::Zone(Zone::Center));
        assert_eq!(rec.lines(), vec!["FORWARD:100"]);
    }

    #[test]
    fn test_plain_commands_without_speed() {
        let config = DispatcherConfig {
            speed_commands: false,
            ..fast_config()
        };
        let (mut d, rec) = dispatcher(config);
        d.dispatch(Steering::Zone(Zone::HardRight));
        d.dispatch(Steering::Zone(Zone::Center));
        assert_eq!(rec.lines(), vec!["RIGHT", "STOP", "FORWARD"]);
    }

    #[test]
    fn test_send_failure_is_swallowed() {
        let (mut d, rec) = dispatcher(fast_config());
        rec.set_failing(true);
        assert_eq!(d.dispatch(Steering::Zone(Zone::Center)), DispatchOutcome::Sent(0));
        assert!(d.state().last_sent_command.is_none());
        rec.set_failing(false);
        assert_eq!(d.dispatch(Steering::Zone(Zone::Center)), DispatchOutcome::Sent(1));
    }

    #[test]
    fn test_drop_sends_final_stop_once() {
        let (mut d, rec) = dispatcher(fast_config());
        d.shutdown();
        drop(d);
        assert_eq!(rec.lines(), vec!["STOP"]);
    }

    #[test]
    fn test_speed_kind_parse() {
        assert_eq!("Forward".parse::<SpeedKind>(), Ok(SpeedKind::Forward));
        assert_eq!("turn".parse::<SpeedKind>(), Ok(SpeedKind::Turn));
        assert!(matches!(
            "sideways".parse::<SpeedKind>(),
            Err(ControlError::UnknownSpeedKind(_))
        ));
    }
}
