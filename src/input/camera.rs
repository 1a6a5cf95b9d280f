// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 摄像头输入 (Camera capability)
//!
//! 控制环只关心 `Camera::read`, 具体后端:
//! - MjpegCamera:        HTTP MJPEG 流 (ESP32-CAM 等)
//! - StillCommandCamera: 调用拍照命令 (rpicam-jpeg), 读取 stdout JPEG
//! - ImageFileCamera:    重复回放一张图片 (测试/演示)

use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use image::{ImageFormat, RgbImage};
use tracing::info;

use super::mjpeg::MjpegCamera;

/// 帧来源
pub trait Camera: Send {
    /// 读取一帧; `Ok(None)` 表示暂时没有可用帧
    fn read(&mut self) -> Result<Option<RgbImage>>;

    fn describe(&self) -> String;
}

/// 默认拍照命令
pub const DEFAULT_STILL_COMMAND: &str =
    "rpicam-jpeg -o - --width 640 --height 480 --nopreview -n -t 1";

/// 命令行指定的输入源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraSource {
    /// `mjpeg:<url>` 或直接 `http://...`
    Mjpeg(String),
    /// `still` 或 `still:<command line>`
    Still(Vec<String>),
    /// `file:<path>`
    File(PathBuf),
}

impl FromStr for CameraSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(url) = s.strip_prefix("mjpeg:") {
            return Ok(CameraSource::Mjpeg(url.to_string()));
        }
        if s.starts_with("http://") || s.starts_with("https://") {
            return Ok(CameraSource::Mjpeg(s.to_string()));
        }
        if let Some(path) = s.strip_prefix("file:") {
            return Ok(CameraSource::File(PathBuf::from(path)));
        }
        if s == "still" {
            return Ok(CameraSource::Still(split_command(DEFAULT_STILL_COMMAND)));
        }
        if let Some(cmd) = s.strip_prefix("still:") {
            let parts = split_command(cmd);
            if parts.is_empty() {
                bail!("拍照命令为空");
            }
            return Ok(CameraSource::Still(parts));
        }
        bail!("无法识别的输入源 {:?} (mjpeg:<url> | still | file:<path>)", s)
    }
}

fn split_command(cmd: &str) -> Vec<String> {
    cmd.split_whitespace().map(str::to_string).collect()
}

/// 各后端的超时设置
#[derive(Debug, Clone, Copy)]
pub struct CameraTimeouts {
    /// 拍照命令最长运行时间
    pub capture: Duration,
    /// MJPEG 连接/读取超时
    pub stream: Duration,
    /// MJPEG 最新帧超过该时间视为过期
    pub stale_after: Duration,
}

impl Default for CameraTimeouts {
    fn default() -> Self {
        Self {
            capture: Duration::from_secs(2),
            stream: Duration::from_secs(5),
            stale_after: Duration::from_secs(2),
        }
    }
}

impl CameraSource {
    pub fn open(&self, timeouts: CameraTimeouts) -> Result<Box<dyn Camera>> {
        let camera: Box<dyn Camera> = match self {
            CameraSource::Mjpeg(url) => Box::new(MjpegCamera::start(
                url,
                timeouts.stream,
                timeouts.stale_after,
            )?),
            CameraSource::Still(argv) => {
                Box::new(StillCommandCamera::new(argv.clone(), timeouts.capture)?)
            }
            CameraSource::File(path) => Box::new(ImageFileCamera::open(path.clone())?),
        };
        info!("📷 输入源: {}", camera.describe());
        Ok(camera)
    }
}

/// 调用外部拍照命令, 每次 read 拍一张
pub struct StillCommandCamera {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl StillCommandCamera {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Result<Self> {
        let mut argv = argv.into_iter();
        let program = argv.next().ok_or_else(|| anyhow!("拍照命令为空"))?;
        Ok(Self {
            program,
            args: argv.collect(),
            timeout,
        })
    }

    fn capture(&self) -> Result<Vec<u8>> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("无法启动 {}", self.program))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("拍照命令没有 stdout"))?;

        let (tx, rx) = crossbeam_channel::bounded(1);
        thread::spawn(move || {
            let mut buf = Vec::new();
            let result = stdout.read_to_end(&mut buf).map(|_| buf);
            let _ = tx.send(result);
        });

        match rx.recv_timeout(self.timeout) {
            Ok(Ok(buf)) => {
                let status = child.wait()?;
                if !status.success() {
                    bail!("{} 退出码 {}", self.program, status);
                }
                Ok(buf)
            }
            Ok(Err(e)) => {
                let _ = child.kill();
                let _ = child.wait();
                Err(e.into())
            }
            Err(_) => {
                let _ = child.kill();
                let _ = child.wait();
                bail!("拍照超时 ({} ms)", self.timeout.as_millis())
            }
        }
    }
}

impl Camera for StillCommandCamera {
    fn read(&mut self) -> Result<Option<RgbImage>> {
        let jpeg = self.capture()?;
        if jpeg.is_empty() {
            return Ok(None);
        }
        let img = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg)
            .context("拍照结果不是有效的JPEG")?;
        Ok(Some(img.to_rgb8()))
    }

    fn describe(&self) -> String {
        format!("still: {} {}", self.program, self.args.join(" "))
    }
}

/// 重复返回同一张图片
pub struct ImageFileCamera {
    path: PathBuf,
    frame: RgbImage,
}

impl ImageFileCamera {
    pub fn open(path: PathBuf) -> Result<Self> {
        let frame = image::open(&path)
            .with_context(|| format!("无法打开图片 {}", path.display()))?
            .to_rgb8();
        Ok(Self { path, frame })
    }

    pub fn from_image(frame: RgbImage) -> Self {
        Self {
            path: PathBuf::from("<memory>"),
            frame,
        }
    }
}

impl Camera for ImageFileCamera {
    fn read(&mut self) -> Result<Option<RgbImage>> {
        Ok(Some(self.frame.clone()))
    }

    fn describe(&self) -> String {
        format!("file: {}", self.path.display())
    }
}
