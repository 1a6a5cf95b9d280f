// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 模型运行时接口与输出解码
///
/// # 架构说明
///
/// ## 推理后端 (InferenceBackend)
/// - 报告输入张量要求 (尺寸/通道/量化类型) 与输出张量形状
/// - 执行一次前向传播 `invoke`
/// - 默认实现: `OrtBackend` (ONNX Runtime), 文件: `ort_backend.rs`
///
/// ## 输出格式 (DetectionOutput)
/// 模型加载时根据输出形状确定一次, 之后每帧按标签分派:
/// - **Heatmap** (FOMO): 单个 `1 × grid_h × grid_w × classes` 输出, 文件: `heatmap.rs`
/// - **BoundingBoxes** (SSD): boxes / classes / scores 三个并行输出, 文件: `ssd.rs`
///
/// ```text
/// 原始帧 → preprocess → InputTensor
///          ↓
///     InferenceBackend::invoke
///          ↓
///     Vec<OutputTensor> → DetectionOutput → 最佳候选 Detection
/// ```
use std::fmt;

use anyhow::Result;
use ndarray::{Array3, ArrayD, Axis, Ix4};

use crate::detection::types::Detection;
use crate::error::ModelError;

pub mod heatmap;
pub mod ort_backend;
pub mod ssd;

pub use ort_backend::{OrtBackend, OrtConfig};

/// 张量元素类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    /// 有符号8位量化
    I8,
    /// 无符号8位
    U8,
    F32,
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::I8 => f.write_str("int8"),
            ElementType::U8 => f.write_str("uint8"),
            ElementType::F32 => f.write_str("float32"),
        }
    }
}

/// 输入张量布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
    /// 1 × H × W × C (TFLite / Edge Impulse 导出)
    Nhwc,
    /// 1 × C × H × W
    Nchw,
}

/// 模型输入要求
#[derive(Debug, Clone, PartialEq)]
pub struct InputSpec {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub element_type: ElementType,
    pub layout: TensorLayout,
}

impl InputSpec {
    /// 从4维输入形状推断布局; 批次维可以是动态的 (-1)
    pub fn from_shape(
        name: &str,
        element_type: ElementType,
        shape: &[i64],
    ) -> Result<Self, ModelError> {
        if shape.len() != 4 {
            return Err(ModelError::ShapeMismatch(format!(
                "输入 {} 需要4维, 实际 {:?}",
                name, shape
            )));
        }
        let is_channels = |d: i64| d == 1 || d == 3;
        let (layout, h, w, c) = if is_channels(shape[3]) {
            (TensorLayout::Nhwc, shape[1], shape[2], shape[3])
        } else if is_channels(shape[1]) {
            (TensorLayout::Nchw, shape[2], shape[3], shape[1])
        } else {
            return Err(ModelError::ShapeMismatch(format!(
                "输入 {} 通道数必须为1或3: {:?}",
                name, shape
            )));
        };
        if h <= 0 || w <= 0 {
            return Err(ModelError::ShapeMismatch(format!(
                "输入 {} 的宽高必须是固定正数: {:?}",
                name, shape
            )));
        }
        Ok(Self {
            name: name.to_string(),
            width: w as u32,
            height: h as u32,
            channels: c as u32,
            element_type,
            layout,
        })
    }

    /// 张量形状 (批次为1)
    pub fn tensor_shape(&self) -> [usize; 4] {
        let (h, w, c) = (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        );
        match self.layout {
            TensorLayout::Nhwc => [1, h, w, c],
            TensorLayout::Nchw => [1, c, h, w],
        }
    }
}

/// 模型输出描述
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSpec {
    pub name: String,
    pub shape: Vec<i64>,
    pub element_type: ElementType,
}

/// 预处理后的输入张量
#[derive(Debug, Clone)]
pub enum InputTensor {
    I8(ArrayD<i8>),
    U8(ArrayD<u8>),
    F32(ArrayD<f32>),
}

impl InputTensor {
    pub fn shape(&self) -> &[usize] {
        match self {
            InputTensor::I8(a) => a.shape(),
            InputTensor::U8(a) => a.shape(),
            InputTensor::F32(a) => a.shape(),
        }
    }
}

/// 模型原始输出张量
#[derive(Debug, Clone)]
pub enum OutputTensor {
    I8(ArrayD<i8>),
    U8(ArrayD<u8>),
    F32(ArrayD<f32>),
}

impl OutputTensor {
    pub fn shape(&self) -> &[usize] {
        match self {
            OutputTensor::I8(a) => a.shape(),
            OutputTensor::U8(a) => a.shape(),
            OutputTensor::F32(a) => a.shape(),
        }
    }

    /// 反量化到 [0,1]: int8 → (v + 128) / 255, uint8 → v / 255, float 原样
    pub fn dequantize(&self) -> ArrayD<f32> {
        match self {
            OutputTensor::I8(a) => a.mapv(|v| (v as f32 + 128.0) / 255.0),
            OutputTensor::U8(a) => a.mapv(|v| v as f32 / 255.0),
            OutputTensor::F32(a) => a.clone(),
        }
    }

    /// 原始数值 (不缩放)
    pub fn values(&self) -> Vec<f32> {
        match self {
            OutputTensor::I8(a) => a.iter().map(|&v| v as f32).collect(),
            OutputTensor::U8(a) => a.iter().map(|&v| v as f32).collect(),
            OutputTensor::F32(a) => a.iter().copied().collect(),
        }
    }
}

/// 统一的推理后端接口
///
/// 所有运行时(ONNX Runtime, 测试替身等)都应实现此 trait
pub trait InferenceBackend: Send {
    /// 输入张量要求
    fn input_spec(&self) -> &InputSpec;

    /// 输出张量描述 (按模型输出顺序)
    fn output_specs(&self) -> &[OutputSpec];

    /// 执行一次前向传播
    fn invoke(&mut self, input: InputTensor) -> Result<Vec<OutputTensor>>;

    /// 打印模型信息
    fn summary(&self) -> String {
        let input = self.input_spec();
        format!(
            "input {} {}x{}x{} {} {:?}, {} outputs",
            input.name,
            input.width,
            input.height,
            input.channels,
            input.element_type,
            input.layout,
            self.output_specs().len()
        )
    }
}

/// 输出格式 (加载时确定一次)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLayout {
    Heatmap { output: usize },
    BoundingBoxes { boxes: usize, classes: usize, scores: usize },
}

impl OutputLayout {
    /// 单个4维输出 → 热力图; 3个及以上输出 → 检测框
    pub fn resolve(outputs: &[OutputSpec]) -> Result<Self, ModelError> {
        match outputs {
            [only] if only.shape.len() == 4 => Ok(OutputLayout::Heatmap { output: 0 }),
            outs if outs.len() >= 3 => Ok(OutputLayout::BoundingBoxes {
                boxes: 0,
                classes: 1,
                scores: 2,
            }),
            outs => Err(ModelError::UnsupportedLayout(format!(
                "{} outputs with shapes {:?}",
                outs.len(),
                outs.iter().map(|o| o.shape.clone()).collect::<Vec<_>>()
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OutputLayout::Heatmap { .. } => "FOMO heatmap",
            OutputLayout::BoundingBoxes { .. } => "SSD bounding boxes",
        }
    }
}

/// 解码后的模型输出
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionOutput {
    /// grid_h × grid_w × classes, 已反量化
    Heatmap(Array3<f32>),
    /// 归一化 [ymin, xmin, ymax, xmax] / 类别 / 分数
    BoundingBoxes {
        boxes: Vec<[f32; 4]>,
        classes: Vec<f32>,
        scores: Vec<f32>,
    },
}

impl DetectionOutput {
    pub fn from_outputs(
        layout: OutputLayout,
        outputs: &[OutputTensor],
    ) -> Result<Self, ModelError> {
        let get = |idx: usize| {
            outputs.get(idx).ok_or_else(|| {
                ModelError::ShapeMismatch(format!("缺少第{}个输出 (共{}个)", idx, outputs.len()))
            })
        };

        match layout {
            OutputLayout::Heatmap { output } => {
                let grid = get(output)?
                    .dequantize()
                    .into_dimensionality::<Ix4>()
                    .map_err(|e| ModelError::ShapeMismatch(format!("热力图需要4维: {}", e)))?;
                if grid.shape()[0] == 0 {
                    return Err(ModelError::ShapeMismatch("热力图批次为空".into()));
                }
                Ok(DetectionOutput::Heatmap(grid.index_axis_move(Axis(0), 0)))
            }
            OutputLayout::BoundingBoxes {
                boxes,
                classes,
                scores,
            } => {
                let raw_boxes = get(boxes)?.values();
                if raw_boxes.len() % 4 != 0 {
                    return Err(ModelError::ShapeMismatch(format!(
                        "检测框数据长度 {} 不是4的倍数",
                        raw_boxes.len()
                    )));
                }
                let boxes = raw_boxes
                    .chunks_exact(4)
                    .map(|c| [c[0], c[1], c[2], c[3]])
                    .collect();
                let classes = get(classes)?.values();
                let scores = get(scores)?.dequantize().iter().copied().collect();
                Ok(DetectionOutput::BoundingBoxes {
                    boxes,
                    classes,
                    scores,
                })
            }
        }
    }

    /// 最高分候选 (不做阈值过滤), 坐标映射到 `frame_w × frame_h`
    pub fn best_candidate(&self, frame_w: u32, frame_h: u32) -> Option<Detection> {
        match self {
            DetectionOutput::Heatmap(grid) => heatmap::decode_heatmap(grid, frame_w, frame_h),
            DetectionOutput::BoundingBoxes {
                boxes,
                classes,
                scores,
            } => ssd::decode_boxes(boxes, classes, scores, frame_w, frame_h),
        }
    }
}
