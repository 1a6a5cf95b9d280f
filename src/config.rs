// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 配置: 命令行参数 + JSON 参数文件
//!
//! 命令行只决定"接什么" (模型/摄像头/链路/端口),
//! 可调参数 (阈值/速度/节奏) 放在 JSON 文件里, 缺失时写出默认值。

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::control::{DispatcherConfig, SpeedLimits, StopPolicy, ZoneLayout};
use crate::detection::{DetectorConfig, TrackerConfig};
use crate::error::ConfigError;
use crate::input::CameraTimeouts;
use crate::pipeline::LoopConfig;

/// 目标跟随小车参数
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "目标跟随小车 - 视觉跟踪控制环", long_about = None)]
pub struct Args {
    /// ONNX 检测模型 (FOMO 热力图或 SSD 检测框); 不指定则只能手动驾驶
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// 输入源: mjpeg:<url> | still[:<command>] | file:<path>
    #[arg(short, long, default_value = "still")]
    pub camera: String,

    /// 电机链路: udp:<host:port> | serial:<path>[@baud] | dry-run
    #[arg(short, long, default_value = "udp:10.82.36.186:8888")]
    pub transport: String,

    /// 机器人状态回传端口, 0 表示不监听
    #[arg(long, default_value_t = 8889)]
    pub status_port: u16,

    /// 参数文件 (默认: 用户配置目录/target-follower/follower.json)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// 日志过滤, 例如 "info" 或 "target_follower=debug"
    #[arg(long)]
    pub log: Option<String>,

    /// 启动后直接进入自主模式
    #[arg(long, default_value_t = false)]
    pub auto: bool,

    /// 推理线程数
    #[arg(long, default_value_t = 2)]
    pub threads: usize,
}

/// 一次转向脉冲 (持有控制锁) 的最长时间
pub const MAX_BURST_MS: u64 = 1000;

/// 可调参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowerConfig {
    // === 检测 ===
    pub confidence_threshold: f32, // 置信度阈值 (严格大于)
    pub inference_timeout_ms: u64, // 单帧推理最长等待

    // === 跟踪 ===
    pub debounce_frames: u32,         // 短暂丢失沿用最后位置的帧数
    pub search_frames: u32,           // 超过后解除锁定
    pub history_size: usize,          // 置信度滑动窗口
    pub position_history_size: usize, // 位置滑动窗口

    // === 控制环 ===
    pub frame_width: u32,
    pub frame_height: u32,
    pub frame_skip: u32, // 每N帧推理一次
    pub cycle_delay_ms: u64,
    pub camera_retry_ms: u64,
    pub camera_degraded_after: u32,

    // === 摄像头 ===
    pub capture_timeout_ms: u64, // 拍照命令超时
    pub stream_timeout_ms: u64,  // MJPEG 连接/读取超时
    pub stale_frame_ms: u64,     // MJPEG 帧过期时间

    // === 区域 ===
    pub zones: ZoneLayout,

    // === 命令 ===
    pub cmd_min_interval_ms: u64,
    pub rate_limit_changes: bool, // 最小间隔内的新命令也丢弃
    pub forward_speed: u8,
    pub turn_speed: u8,
    pub forward_limits: SpeedLimits,
    pub turn_limits: SpeedLimits,
    pub hard_turn_burst: u32,
    pub slight_turn_burst: u32,
    pub burst_delay_ms: u64,
    pub speed_commands: bool, // FORWARD:<n> / LEFT:<n> / RIGHT:<n>
    pub stop_policy: StopPolicy,

    // === 链路 ===
    pub send_timeout_ms: u64,
    pub serial_baud: u32,
}

impl Default for FollowerConfig {
    fn default() -> Self {
        Self {
            // 检测
            confidence_threshold: 0.12,
            inference_timeout_ms: 500,

            // 跟踪
            debounce_frames: 5,
            search_frames: 15,
            history_size: 3,
            position_history_size: 3,

            // 控制环
            frame_width: 320,
            frame_height: 240,
            frame_skip: 4,
            cycle_delay_ms: 10,
            camera_retry_ms: 100,
            camera_degraded_after: 10,

            // 摄像头
            capture_timeout_ms: 2000,
            stream_timeout_ms: 5000,
            stale_frame_ms: 2000,

            // 区域
            zones: ZoneLayout::three_zone(),

            // 命令
            cmd_min_interval_ms: 50,
            rate_limit_changes: true,
            forward_speed: 200,
            turn_speed: 120,
            forward_limits: SpeedLimits { min: 100, max: 255 },
            turn_limits: SpeedLimits { min: 80, max: 200 },
            hard_turn_burst: 1,
            slight_turn_burst: 1,
            burst_delay_ms: 60,
            speed_commands: true,
            stop_policy: StopPolicy::Always,

            // 链路
            send_timeout_ms: 100,
            serial_baud: 115_200,
        }
    }
}

impl FollowerConfig {
    /// 默认参数文件位置
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("target-follower")
            .join("follower.json")
    }

    /// 从JSON文件加载配置
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => {
                    info!("✅ 配置已从 {} 加载", path.display());
                    config
                }
                Err(e) => {
                    warn!("⚠️ 配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("📝 配置文件不存在, 创建默认配置...");
                let config = Self::default();
                config.save(path);
                config
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: &Path) {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if let Err(e) = fs::create_dir_all(dir) {
                warn!("❌ 创建配置目录失败: {}", e);
                return;
            }
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    warn!("❌ 保存配置失败: {}", e);
                } else {
                    info!("💾 配置已保存到 {}", path.display());
                }
            }
            Err(e) => warn!("❌ 序列化配置失败: {}", e),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let nonzero: [(&'static str, u64); 7] = [
            ("history_size", self.history_size as u64),
            ("position_history_size", self.position_history_size as u64),
            ("frame_skip", self.frame_skip as u64),
            ("frame_width", self.frame_width as u64),
            ("frame_height", self.frame_height as u64),
            ("inference_timeout_ms", self.inference_timeout_ms),
            ("send_timeout_ms", self.send_timeout_ms),
        ];
        if let Some(&(field, _)) = nonzero.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Zero { field });
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::Threshold(self.confidence_threshold));
        }
        for (field, limits) in [
            ("forward_limits", self.forward_limits),
            ("turn_limits", self.turn_limits),
        ] {
            if limits.min > limits.max {
                return Err(ConfigError::SpeedRange {
                    field,
                    min: limits.min,
                    max: limits.max,
                });
            }
        }
        let burst_ms =
            self.hard_turn_burst.max(self.slight_turn_burst) as u64 * self.burst_delay_ms;
        if burst_ms > MAX_BURST_MS {
            return Err(ConfigError::BurstTooLong {
                ms: burst_ms,
                max: MAX_BURST_MS,
            });
        }
        self.zones.validate()
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!("🎛️ 当前参数:");
        info!(
            "  置信度阈值: {:.2} | 推理超时: {}ms",
            self.confidence_threshold, self.inference_timeout_ms
        );
        info!(
            "  去抖: {}帧 | 搜索: {}帧 | 历史: {}/{}",
            self.debounce_frames,
            self.search_frames,
            self.history_size,
            self.position_history_size
        );
        info!(
            "  画面: {}x{} | 每{}帧推理",
            self.frame_width, self.frame_height, self.frame_skip
        );
        info!("  区域边界: {:?}", self.zones.boundaries());
        info!(
            "  速度: 前进 {} [{}-{}] | 转向 {} [{}-{}]",
            self.forward_speed,
            self.forward_limits.min,
            self.forward_limits.max,
            self.turn_speed,
            self.turn_limits.min,
            self.turn_limits.max
        );
        info!(
            "  命令间隔: {}ms (限速新命令: {}) | 急转脉冲: {} | 缓转脉冲: {} | STOP策略: {:?}",
            self.cmd_min_interval_ms,
            self.rate_limit_changes,
            self.hard_turn_burst,
            self.slight_turn_burst,
            self.stop_policy
        );
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            confidence_threshold: self.confidence_threshold,
            debounce_frames: self.debounce_frames,
            search_frames: self.search_frames,
            history_size: self.history_size,
            position_history_size: self.position_history_size,
        }
    }

    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            confidence_threshold: self.confidence_threshold,
            inference_timeout: Duration::from_millis(self.inference_timeout_ms),
        }
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            min_interval: Duration::from_millis(self.cmd_min_interval_ms),
            rate_limit_changes: self.rate_limit_changes,
            hard_turn_burst: self.hard_turn_burst,
            slight_turn_burst: self.slight_turn_burst,
            burst_delay: Duration::from_millis(self.burst_delay_ms),
            speed_commands: self.speed_commands,
            stop_policy: self.stop_policy,
            forward_limits: self.forward_limits,
            turn_limits: self.turn_limits,
            forward_speed: self.forward_speed,
            turn_speed: self.turn_speed,
        }
    }

    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            frame_width: self.frame_width,
            frame_height: self.frame_height,
            frame_skip: self.frame_skip,
            camera_retry: Duration::from_millis(self.camera_retry_ms),
            camera_degraded_after: self.camera_degraded_after,
            cycle_delay: Duration::from_millis(self.cycle_delay_ms),
            zones: self.zones.clone(),
            tracker: self.tracker_config(),
        }
    }

    pub fn camera_timeouts(&self) -> CameraTimeouts {
        CameraTimeouts {
            capture: Duration::from_millis(self.capture_timeout_ms),
            stream: Duration::from_millis(self.stream_timeout_ms),
            stale_after: Duration::from_millis(self.stale_frame_ms),
        }
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}
