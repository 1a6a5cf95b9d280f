// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 控制环集成测试: 假摄像头 + 假推理后端 + 记录链路

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Result};
use image::RgbImage;
use ndarray::{ArrayD, IxDyn};

use target_follower::control::{
    CommandDispatcher, DispatchOutcome, DispatcherConfig, RecordingTransport, Steering, Zone,
};
use target_follower::detection::{Detector, DetectorConfig, TrackedPosition, TrackerConfig};
use target_follower::input::{Camera, ImageFileCamera};
use target_follower::models::{
    ElementType, InferenceBackend, InputSpec, InputTensor, OutputSpec, OutputTensor, TensorLayout,
};
use target_follower::pipeline::{CycleReport, LoopConfig};
use target_follower::{ControlLoop, Mode};

/// 4x4 热力图, 热点格子可在测试中随时改变
struct ScriptedHeatmap {
    input: InputSpec,
    outputs: Vec<OutputSpec>,
    hot: Arc<Mutex<Option<(usize, usize)>>>,
}

impl ScriptedHeatmap {
    fn new(hot: Arc<Mutex<Option<(usize, usize)>>>) -> Self {
        Self {
            input: InputSpec {
                name: "input".into(),
                width: 16,
                height: 16,
                channels: 1,
                element_type: ElementType::I8,
                layout: TensorLayout::Nhwc,
            },
            outputs: vec![OutputSpec {
                name: "heatmap".into(),
                shape: vec![1, 4, 4, 2],
                element_type: ElementType::F32,
            }],
            hot,
        }
    }
}

impl InferenceBackend for ScriptedHeatmap {
    fn input_spec(&self) -> &InputSpec {
        &self.input
    }

    fn output_specs(&self) -> &[OutputSpec] {
        &self.outputs
    }

    fn invoke(&mut self, _input: InputTensor) -> Result<Vec<OutputTensor>> {
        let mut grid = ArrayD::<f32>::zeros(IxDyn(&[1, 4, 4, 2]));
        if let Some((row, col)) = *self.hot.lock().unwrap() {
            grid[[0, row, col, 1]] = 0.9;
        }
        Ok(vec![OutputTensor::F32(grid)])
    }
}

/// int8 量化热力图: 格子 (1, 3) 的目标类别为 `hot`, 其余为 -128
struct QuantizedHeatmap {
    input: InputSpec,
    outputs: Vec<OutputSpec>,
    hot: i8,
}

impl QuantizedHeatmap {
    fn new(hot: i8) -> Self {
        Self {
            input: InputSpec {
                name: "input".into(),
                width: 16,
                height: 16,
                channels: 1,
                element_type: ElementType::I8,
                layout: TensorLayout::Nhwc,
            },
            outputs: vec![OutputSpec {
                name: "heatmap".into(),
                shape: vec![1, 4, 4, 2],
                element_type: ElementType::I8,
            }],
            hot,
        }
    }
}

impl InferenceBackend for QuantizedHeatmap {
    fn input_spec(&self) -> &InputSpec {
        &self.input
    }

    fn output_specs(&self) -> &[OutputSpec] {
        &self.outputs
    }

    fn invoke(&mut self, _input: InputTensor) -> Result<Vec<OutputTensor>> {
        let mut grid = ArrayD::<i8>::from_elem(IxDyn(&[1, 4, 4, 2]), -128);
        grid[[0, 1, 3, 1]] = self.hot;
        Ok(vec![OutputTensor::I8(grid)])
    }
}

/// 可切换为故障状态的摄像头
struct FlakyCamera {
    healthy: Arc<AtomicBool>,
}

impl Camera for FlakyCamera {
    fn read(&mut self) -> Result<Option<RgbImage>> {
        if self.healthy.load(Ordering::Relaxed) {
            Ok(Some(RgbImage::new(640, 480)))
        } else {
            bail!("camera unplugged")
        }
    }

    fn describe(&self) -> String {
        "flaky".to_string()
    }
}

struct Rig {
    control_loop: ControlLoop,
    recorder: RecordingTransport,
    hot: Arc<Mutex<Option<(usize, usize)>>>,
}

fn loop_config(frame_skip: u32) -> LoopConfig {
    LoopConfig {
        frame_skip,
        camera_retry: Duration::ZERO,
        camera_degraded_after: 3,
        cycle_delay: Duration::ZERO,
        tracker: TrackerConfig {
            history_size: 1,
            position_history_size: 1,
            ..TrackerConfig::default()
        },
        ..LoopConfig::default()
    }
}

fn rig_with_camera(camera: Box<dyn Camera>, frame_skip: u32) -> Rig {
    let hot = Arc::new(Mutex::new(None));
    let detector = Detector::new(
        Box::new(ScriptedHeatmap::new(hot.clone())),
        DetectorConfig::default(),
    )
    .unwrap();
    let recorder = RecordingTransport::new();
    let dispatcher = CommandDispatcher::new(
        Box::new(recorder.clone()),
        DispatcherConfig {
            min_interval: Duration::from_secs(10),
            rate_limit_changes: false,
            burst_delay: Duration::ZERO,
            ..DispatcherConfig::default()
        },
    );
    let control_loop = ControlLoop::new(camera, Some(detector), dispatcher, loop_config(frame_skip));
    Rig {
        control_loop,
        recorder,
        hot,
    }
}

fn rig(frame_skip: u32) -> Rig {
    rig_with_camera(
        Box::new(ImageFileCamera::from_image(RgbImage::new(640, 480))),
        frame_skip,
    )
}

#[test]
fn test_manual_mode_never_drives() {
    let mut rig = rig(1);
    *rig.hot.lock().unwrap() = Some((1, 3));
    let handle = rig.control_loop.handle();

    for _ in 0..3 {
        assert_eq!(rig.control_loop.step(), CycleReport::Manual);
    }
    assert!(rig.recorder.lines().is_empty());

    let frame = handle.latest_frame().unwrap();
    assert_eq!(frame.dimensions(), (320, 240));
}

#[test]
fn test_hard_right_turn_bursts_then_stops() {
    let mut rig = rig(1);
    *rig.hot.lock().unwrap() = Some((1, 3));
    let handle = rig.control_loop.handle();
    handle.set_mode(Mode::Autonomous).unwrap();

    match rig.control_loop.step() {
        CycleReport::Processed {
            position,
            steering,
            outcome,
        } => {
            assert_eq!(position.x(), Some(280.0));
            assert_eq!(steering, Steering::Zone(Zone::HardRight));
            assert_eq!(outcome, Some(DispatchOutcome::Sent(2)));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(rig.recorder.lines(), vec!["STOP", "RIGHT:120", "STOP"]);

    let status = handle.status();
    assert_eq!(status.mode, Mode::Autonomous);
    assert_eq!(status.zone, Some(Zone::HardRight));
    assert!(status.target_locked);
    assert_eq!(status.last_command.as_deref(), Some("STOP"));
}

#[test]
fn test_centered_target_is_deduplicated() {
    let mut rig = rig(1);
    *rig.hot.lock().unwrap() = Some((2, 1));
    rig.control_loop.handle().set_mode(Mode::Autonomous).unwrap();

    for expected in [DispatchOutcome::Sent(1), DispatchOutcome::Suppressed] {
        match rig.control_loop.step() {
            CycleReport::Processed {
                steering, outcome, ..
            } => {
                assert_eq!(steering, Steering::Zone(Zone::Center));
                assert_eq!(outcome, Some(expected));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
    assert_eq!(rig.recorder.lines(), vec!["STOP", "FORWARD:200"]);
}

#[test]
fn test_lost_target_bridges_then_stops() {
    let mut rig = rig(1);
    *rig.hot.lock().unwrap() = Some((2, 0));
    rig.control_loop.handle().set_mode(Mode::Autonomous).unwrap();
    rig.control_loop.step();
    assert_eq!(rig.recorder.lines(), vec!["STOP", "LEFT:120", "STOP"]);
    rig.recorder.clear();

    *rig.hot.lock().unwrap() = None;
    let debounce = rig.control_loop.tracker().config().debounce_frames;
    for _ in 1..debounce {
        match rig.control_loop.step() {
            CycleReport::Processed { position, .. } => {
                assert_eq!(position, TrackedPosition::Bridged { x: 40.0 })
            }
            other => panic!("unexpected {:?}", other),
        }
    }
    rig.recorder.clear();

    match rig.control_loop.step() {
        CycleReport::Processed {
            position, steering, ..
        } => {
            assert_eq!(position, TrackedPosition::Lost);
            assert_eq!(steering, Steering::Stop);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(rig.recorder.lines(), vec!["STOP"]);
}

#[test]
fn test_frame_skip_limits_inference() {
    let mut rig = rig(3);
    *rig.hot.lock().unwrap() = Some((2, 1));
    rig.control_loop.handle().set_mode(Mode::Autonomous).unwrap();

    assert_eq!(rig.control_loop.step(), CycleReport::Skipped);
    assert_eq!(rig.control_loop.step(), CycleReport::Skipped);
    assert!(matches!(
        rig.control_loop.step(),
        CycleReport::Processed { .. }
    ));
    assert_eq!(rig.control_loop.step(), CycleReport::Skipped);
    assert_eq!(rig.recorder.lines(), vec!["STOP", "FORWARD:200"]);
}

#[test]
fn test_mode_switch_stops_and_resets_tracking() {
    let mut rig = rig(1);
    *rig.hot.lock().unwrap() = Some((2, 1));
    let handle = rig.control_loop.handle();
    handle.set_mode(Mode::Autonomous).unwrap();
    rig.control_loop.step();
    assert!(rig.control_loop.tracker().is_locked());

    handle.set_mode(Mode::Manual).unwrap();
    handle.set_mode(Mode::Autonomous).unwrap();
    assert_eq!(
        rig.recorder.lines(),
        vec!["STOP", "FORWARD:200", "STOP", "STOP"]
    );

    // 跟踪状态已清空: 丢失目标不会沿用旧位置
    *rig.hot.lock().unwrap() = None;
    match rig.control_loop.step() {
        CycleReport::Processed { position, .. } => assert_eq!(position, TrackedPosition::Lost),
        other => panic!("unexpected {:?}", other),
    }
    assert!(!rig.control_loop.tracker().is_locked());
}

#[test]
fn test_camera_failures_mark_degraded() {
    let healthy = Arc::new(AtomicBool::new(false));
    let mut rig = rig_with_camera(
        Box::new(FlakyCamera {
            healthy: healthy.clone(),
        }),
        1,
    );
    let handle = rig.control_loop.handle();

    for _ in 0..2 {
        assert_eq!(rig.control_loop.step(), CycleReport::NoFrame);
    }
    assert!(!handle.status().camera_degraded);
    assert_eq!(rig.control_loop.step(), CycleReport::NoFrame);
    assert!(handle.status().camera_degraded);

    healthy.store(true, Ordering::Relaxed);
    assert_eq!(rig.control_loop.step(), CycleReport::Manual);
    assert!(!handle.status().camera_degraded);
}

#[test]
fn test_interrupt_stops_robot() {
    let rig = rig(1);
    *rig.hot.lock().unwrap() = Some((2, 1));
    let handle = rig.control_loop.handle();
    handle.set_mode(Mode::Autonomous).unwrap();

    let control_loop = rig.control_loop;
    let worker = thread::spawn(move || control_loop.run());
    thread::sleep(Duration::from_millis(100));
    assert_eq!(rig.recorder.lines().last().map(String::as_str), Some("FORWARD:200"));

    // 信号处理线程调用的回调
    thread::spawn(handle.interrupt_callback()).join().unwrap();
    worker.join().unwrap();

    assert!(!handle.is_running());
    assert_eq!(rig.recorder.lines().last().map(String::as_str), Some("STOP"));
}

#[test]
fn test_int8_heatmap_confidence_is_dequantized() {
    let backend = QuantizedHeatmap::new(100);
    let mut detector = Detector::new(Box::new(backend), DetectorConfig::default()).unwrap();

    let det = detector
        .best_candidate(&RgbImage::new(320, 240))
        .unwrap()
        .unwrap();
    assert!((det.confidence - 228.0 / 255.0).abs() < 1e-6);
    assert_eq!((det.center_x, det.center_y), (280.0, 90.0));
    assert_eq!(det.class_id, Some(1));

    // 背景格 (-128) 反量化为 0, 不会超过阈值
    let mut empty =
        Detector::new(Box::new(QuantizedHeatmap::new(-128)), DetectorConfig::default()).unwrap();
    assert!(empty.detect(&RgbImage::new(320, 240)).unwrap().is_none());
}

#[test]
fn test_run_sends_final_stop_on_shutdown() {
    let rig = rig(1);
    *rig.hot.lock().unwrap() = Some((2, 1));
    let handle = rig.control_loop.handle();
    handle.set_mode(Mode::Autonomous).unwrap();

    let control_loop = rig.control_loop;
    let worker = thread::spawn(move || control_loop.run());
    thread::sleep(Duration::from_millis(100));
    handle.shutdown();
    worker.join().unwrap();

    let lines = rig.recorder.lines();
    assert_eq!(lines.first().map(String::as_str), Some("STOP"));
    assert_eq!(lines.last().map(String::as_str), Some("STOP"));
    assert!(lines.iter().any(|l| l == "FORWARD:200"));
}
