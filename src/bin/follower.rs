// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 目标跟随小车 (Target Follower)
///
/// 系统架构:
/// 1. 控制环线程: 读帧 → 检测 → 跟踪 → 区域 → 电机命令
/// 2. 推理线程:   ONNX Runtime 前向传播 (由 Detector 管理)
/// 3. 状态线程:   接收机器人超声波距离
/// 4. 控制台线程: stdin 命令
/// 5. 主线程:     等待控制环退出 (quit / Ctrl+C / SIGTERM)
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::Result;
use clap::Parser;
use mimalloc::MiMalloc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use target_follower::control::{CommandDispatcher, StatusListener, TransportSpec};
use target_follower::detection::Detector;
use target_follower::input::CameraSource;
use target_follower::pipeline::{console, ConsoleCommand};
use target_follower::{
    Args, ControlHandle, ControlLoop, FollowerConfig, Mode, OrtBackend, OrtConfig,
};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn init_tracing(filter: Option<&str>) {
    let filter = match filter {
        Some(f) => EnvFilter::new(f),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn load_detector(path: &Path, threads: usize, config: &FollowerConfig) -> Result<Detector> {
    let backend = OrtBackend::build(OrtConfig {
        model_path: path.to_path_buf(),
        intra_threads: threads,
    })?;
    Detector::new(Box::new(backend), config.detector_config())
}

/// 读取 stdin 直到 quit 或 stdin 关闭
fn run_console(handle: &ControlHandle, snapshot_dir: &Path) {
    info!("⌨️ {}", console::HELP);
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("⚠️ 读取控制台失败: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<ConsoleCommand>() {
            Ok(command) => match command.execute(handle, snapshot_dir) {
                Ok(reply) => println!("{}", reply),
                Err(e) => println!("error: {:#}", e),
            },
            Err(e) => println!("error: {:#}", e),
        }
        if !handle.is_running() {
            return;
        }
    }
    info!("控制台已关闭, 继续无界面运行");
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log.as_deref());

    info!("🚀 目标跟随系统启动");

    // ========== 参数 ==========
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(FollowerConfig::default_path);
    let config = FollowerConfig::load(&config_path);
    config.validate()?;
    config.print_summary();

    // ========== 电机链路 ==========
    let transport = args
        .transport
        .parse::<TransportSpec>()?
        .open(config.send_timeout(), config.serial_baud)?;
    let dispatcher = CommandDispatcher::new(transport, config.dispatcher_config());

    // ========== 检测模型 ==========
    let detector = match &args.model {
        Some(path) => match load_detector(path, args.threads, &config) {
            Ok(detector) => Some(detector),
            Err(e) => {
                error!("❌ 检测模型加载失败: {:#}", e);
                None
            }
        },
        None => None,
    };

    // ========== 摄像头 ==========
    let camera = args
        .camera
        .parse::<CameraSource>()?
        .open(config.camera_timeouts())?;

    let control_loop = ControlLoop::new(camera, detector, dispatcher, config.loop_config());
    let handle = control_loop.handle();
    handle.install_interrupt_handler();

    // ========== 状态回传 ==========
    let status_listener = if args.status_port != 0 {
        match StatusListener::spawn(
            args.status_port,
            handle.robot_status(),
            handle.running_flag(),
        ) {
            Ok(listener) => Some(listener),
            Err(e) => {
                warn!("⚠️ 状态监听启动失败: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    if args.auto {
        if let Err(e) = handle.set_mode(Mode::Autonomous) {
            warn!("⚠️ 无法进入自主模式: {}", e);
        }
    }

    // ========== 控制环线程 ==========
    let loop_thread = thread::Builder::new()
        .name("control-loop".into())
        .spawn(move || control_loop.run())?;

    info!("✅ 系统就绪, 当前模式 {}", handle.mode());

    // ========== 控制台线程 ==========
    // stdin 读取无法中断, 不等待该线程; 进程退出时随之结束
    {
        let handle = handle.clone();
        thread::Builder::new()
            .name("console".into())
            .spawn(move || run_console(&handle, &PathBuf::from("snapshots")))?;
    }

    // ========== 主线程: 等待控制环发送最后的 STOP ==========
    if loop_thread.join().is_err() {
        error!("❌ 控制环线程异常退出");
    }
    handle.shutdown();
    if let Some(listener) = status_listener {
        listener.join();
    }
    Ok(())
}
