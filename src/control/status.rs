// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 机器人状态回传 (Robot status channel)
//!
//! 机器人通过独立UDP端口上报超声波距离 `DIST:<cm>`。
//! 只供遥测显示, 不参与转向决策。

use std::io;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

/// 超声波安全距离 (cm)
pub const SAFE_DISTANCE_CM: u32 = 100;

/// 最近一次状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RobotStatus {
    pub distance_cm: Option<u32>,
}

impl RobotStatus {
    /// 0 表示无回波, 视为安全
    pub fn obstacle_clear(&self) -> bool {
        match self.distance_cm {
            Some(d) => d > SAFE_DISTANCE_CM || d == 0,
            None => true,
        }
    }
}

/// 解析一行状态报文, 只认 `DIST:<int>`
pub fn parse_status_line(line: &str) -> Option<u32> {
    line.trim()
        .strip_prefix("DIST:")
        .and_then(|v| v.trim().parse::<u32>().ok())
}

/// 读取出错后的等待
const ERROR_BACKOFF: Duration = Duration::from_millis(200);

/// 读超时在不同平台上表现为 WouldBlock 或 TimedOut
fn is_read_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

/// 后台监听线程
pub struct StatusListener {
    handle: Option<JoinHandle<()>>,
}

impl StatusListener {
    pub fn spawn(
        port: u16,
        sink: Arc<Mutex<RobotStatus>>,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port))
            .with_context(|| format!("绑定状态端口 {} 失败", port))?;
        socket.set_read_timeout(Some(Duration::from_millis(100)))?;
        info!("📶 状态监听端口: {}", port);

        let handle = thread::Builder::new()
            .name("robot-status".into())
            .spawn(move || {
                let mut buf = [0u8; 64];
                while running.load(Ordering::Relaxed) {
                    let n = match socket.recv_from(&mut buf) {
                        Ok((n, _)) => n,
                        Err(e) if is_read_timeout(&e) => continue,
                        Err(e) => {
                            warn!("⚠️ 状态端口读取失败: {}", e);
                            thread::sleep(ERROR_BACKOFF);
                            continue;
                        }
                    };
                    let text = String::from_utf8_lossy(&buf[..n]);
                    match parse_status_line(&text) {
                        Some(distance) => {
                            if let Ok(mut status) = sink.lock() {
                                status.distance_cm = Some(distance);
                            }
                        }
                        None => debug!("忽略状态报文: {:?}", text),
                    }
                }
            })?;

        Ok(Self {
            handle: Some(handle),
        })
    }

    /// 等待线程退出 (调用前需清除 running 标志)
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
