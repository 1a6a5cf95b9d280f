// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 电机链路 (Actuator transport)
//!
//! 发后即忘: 不读取任何应答, 丢包可以接受。
//! - UdpTransport:    一个命令一个数据报 (ESP8266)
//! - SerialTransport: 一个命令一行 (Arduino 串口)
//! - RecordingTransport: 内存记录 (测试/空跑)

use std::io::Write;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use tracing::info;

/// 命令发送能力
pub trait Transport: Send {
    /// 发送一条命令 (不含换行), 必须在有限时间内返回
    fn send(&mut self, line: &str) -> Result<()>;

    /// 描述, 用于日志
    fn describe(&self) -> String;
}

/// 命令行指定的链路
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSpec {
    /// `udp:<host:port>`
    Udp(String),
    /// `serial:<path>[@baud]`
    Serial { path: String, baud: Option<u32> },
    /// `dry-run`: 只记录不发送
    DryRun,
}

impl FromStr for TransportSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s == "dry-run" {
            return Ok(TransportSpec::DryRun);
        }
        if let Some(addr) = s.strip_prefix("udp:") {
            return Ok(TransportSpec::Udp(addr.to_string()));
        }
        if let Some(rest) = s.strip_prefix("serial:") {
            return match rest.rsplit_once('@') {
                Some((path, baud)) => Ok(TransportSpec::Serial {
                    path: path.to_string(),
                    baud: Some(
                        baud.parse()
                            .with_context(|| format!("无效的波特率 {:?}", baud))?,
                    ),
                }),
                None => Ok(TransportSpec::Serial {
                    path: rest.to_string(),
                    baud: None,
                }),
            };
        }
        bail!("无法识别的链路 {:?} (udp:<host:port> | serial:<path>[@baud] | dry-run)", s)
    }
}

impl TransportSpec {
    pub fn open(&self, timeout: Duration, default_baud: u32) -> Result<Box<dyn Transport>> {
        Ok(match self {
            TransportSpec::Udp(addr) => Box::new(UdpTransport::connect(addr, timeout)?),
            TransportSpec::Serial { path, baud } => Box::new(SerialTransport::open(
                path,
                baud.unwrap_or(default_baud),
                timeout,
            )?),
            TransportSpec::DryRun => {
                info!("🧪 空跑模式: 命令只记录不发送");
                Box::new(RecordingTransport::new())
            }
        })
    }
}

/// UDP 数据报链路
pub struct UdpTransport {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpTransport {
    pub fn connect(target: &str, write_timeout: Duration) -> Result<Self> {
        let target = target
            .to_socket_addrs()
            .with_context(|| format!("无法解析机器人地址 {}", target))?
            .next()
            .ok_or_else(|| anyhow!("机器人地址 {} 没有可用的解析结果", target))?;
        let bind = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind).context("绑定UDP发送端口失败")?;
        socket.set_write_timeout(Some(write_timeout))?;
        info!("📡 UDP链路 → {}", target);
        Ok(Self { socket, target })
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, line: &str) -> Result<()> {
        let sent = self.socket.send_to(line.as_bytes(), self.target)?;
        if sent != line.len() {
            bail!("UDP数据报被截断: {}/{} 字节", sent, line.len());
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("udp://{}", self.target)
    }
}

/// 串口链路, 每条命令以 `\n` 结尾
pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
    path: String,
}

impl SerialTransport {
    pub fn open(path: &str, baud_rate: u32, timeout: Duration) -> Result<Self> {
        let port = serialport::new(path, baud_rate)
            .timeout(timeout)
            .open()
            .with_context(|| format!("打开串口 {} 失败", path))?;
        info!("🔌 串口链路 → {} @ {} baud", path, baud_rate);
        Ok(Self {
            port,
            path: path.to_string(),
        })
    }
}

impl Transport for SerialTransport {
    fn send(&mut self, line: &str) -> Result<()> {
        self.port.write_all(line.as_bytes())?;
        self.port.write_all(b"\n")?;
        self.port.flush()?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("serial://{}", self.path)
    }
}

/// 已发送记录
#[derive(Debug, Clone)]
pub struct SentCommand {
    pub line: String,
    pub at: Instant,
}

/// 内存链路: 记录所有命令, 可注入发送失败
#[derive(Clone, Default)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<SentCommand>>>,
    fail: Arc<Mutex<bool>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已发送命令 (按顺序)
    pub fn lines(&self) -> Vec<String> {
        self.sent
            .lock()
            .map(|sent| sent.iter().map(|c| c.line.clone()).collect())
            .unwrap_or_default()
    }

    pub fn records(&self) -> Vec<SentCommand> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.clear();
        }
    }

    /// 之后的发送全部失败 (模拟链路断开)
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut fail) = self.fail.lock() {
            *fail = failing;
        }
    }
}

impl Transport for RecordingTransport {
    fn send(&mut self, line: &str) -> Result<()> {
        if self.fail.lock().map(|f| *f).unwrap_or(false) {
            bail!("链路不可用");
        }
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| anyhow!("记录锁已中毒"))?;
        sent.push(SentCommand {
            line: line.to_string(),
            at: Instant::now(),
        });
        Ok(())
    }

    fn describe(&self) -> String {
        "dry-run".to_string()
    }
}
