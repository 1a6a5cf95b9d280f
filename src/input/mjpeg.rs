// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! MJPEG 流读取 (HTTP multipart)
//!
//! 后台线程持续拉流, 按 JPEG SOI/EOI 标记切帧, 只保留最新一帧。
//! 流断开后等待1秒重连。

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use image::{ImageFormat, RgbImage};
use tracing::{debug, info, warn};

use super::camera::Camera;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// 缓冲区上限, 超出说明流里没有完整JPEG
const MAX_BUFFER: usize = 4 * 1024 * 1024;

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

type LatestFrame = Arc<Mutex<Option<(RgbImage, Instant)>>>;

pub struct MjpegCamera {
    url: String,
    latest: LatestFrame,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    stale_after: Duration,
}

impl MjpegCamera {
    pub fn start(url: &str, timeout: Duration, stale_after: Duration) -> Result<Self> {
        let latest: LatestFrame = Arc::new(Mutex::new(None));
        let running = Arc::new(AtomicBool::new(true));

        let handle = {
            let url = url.to_string();
            let latest = latest.clone();
            let running = running.clone();
            thread::Builder::new()
                .name("mjpeg-reader".into())
                .spawn(move || stream_loop(&url, timeout, &latest, &running))?
        };

        Ok(Self {
            url: url.to_string(),
            latest,
            running,
            handle: Some(handle),
            stale_after,
        })
    }
}

impl Camera for MjpegCamera {
    fn read(&mut self) -> Result<Option<RgbImage>> {
        let latest = self.latest.lock().map_err(|_| anyhow!("帧缓存锁已中毒"))?;
        Ok(latest
            .as_ref()
            .filter(|(_, at)| at.elapsed() <= self.stale_after)
            .map(|(frame, _)| frame.clone()))
    }

    fn describe(&self) -> String {
        format!("mjpeg: {}", self.url)
    }
}

impl Drop for MjpegCamera {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn stream_loop(url: &str, timeout: Duration, latest: &LatestFrame, running: &AtomicBool) {
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(timeout)
        .timeout_read(timeout)
        .build();

    while running.load(Ordering::Relaxed) {
        match read_stream(&agent, url, latest, running) {
            Ok(()) => info!("MJPEG 流结束: {}", url),
            Err(e) => warn!("⚠️ MJPEG 流错误: {:#}", e),
        }

        // 分段等待, 保证 Drop 时尽快退出
        let resume = Instant::now() + RECONNECT_DELAY;
        while running.load(Ordering::Relaxed) && Instant::now() < resume {
            thread::sleep(Duration::from_millis(50));
        }
    }
    debug!("MJPEG 读取线程退出");
}

fn read_stream(
    agent: &ureq::Agent,
    url: &str,
    latest: &LatestFrame,
    running: &AtomicBool,
) -> Result<()> {
    let response = agent.get(url).call()?;
    info!("🔗 MJPEG 已连接: {}", url);
    let mut reader = response.into_reader();

    let mut buffer = Vec::with_capacity(64 * 1024);
    let mut chunk = [0u8; 4096];
    while running.load(Ordering::Relaxed) {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            return Ok(());
        }
        buffer.extend_from_slice(&chunk[..n]);

        while let Some(jpeg) = extract_jpeg(&mut buffer) {
            match image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg) {
                Ok(img) => {
                    let mut slot = latest.lock().map_err(|_| anyhow!("帧缓存锁已中毒"))?;
                    *slot = Some((img.to_rgb8(), Instant::now()));
                }
                Err(e) => debug!("JPEG 解码失败: {}", e),
            }
        }

        if buffer.len() > MAX_BUFFER {
            warn!("⚠️ MJPEG 缓冲区溢出, 丢弃 {} 字节", buffer.len());
            buffer.clear();
        }
    }
    Ok(())
}

/// 从缓冲区取出第一张完整 JPEG (SOI..=EOI), 并丢弃它之前的数据
pub fn extract_jpeg(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let start = match find(buffer, &SOI, 0) {
        Some(start) => start,
        None => {
            // 保留最后一个字节, 它可能是被截断的 SOI 前半
            let keep_from = buffer.len().saturating_sub(1);
            buffer.drain(..keep_from);
            return None;
        }
    };
    let end = find(buffer, &EOI, start + SOI.len())?;
    let jpeg = buffer[start..end + EOI.len()].to_vec();
    buffer.drain(..end + EOI.len());
    Some(jpeg)
}

fn find(haystack: &[u8], needle: &[u8; 2], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}
