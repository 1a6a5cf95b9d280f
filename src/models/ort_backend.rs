// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// ONNX Runtime 推理后端
// 包含: 会话构建、输入/输出元数据读取、张量转换

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use ndarray::{ArrayD, IxDyn};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::tensor::TensorElementType;
use ort::value::{Tensor, ValueType};
use tracing::info;

use super::{ElementType, InferenceBackend, InputSpec, InputTensor, OutputSpec, OutputTensor};
use crate::error::ModelError;

/// ONNX Runtime 配置
#[derive(Debug, Clone)]
pub struct OrtConfig {
    pub model_path: PathBuf,
    pub intra_threads: usize,
}

pub struct OrtBackend {
    session: Session,
    input: InputSpec,
    outputs: Vec<OutputSpec>,
}

impl OrtBackend {
    /// 加载模型并读取输入/输出元数据
    pub fn build(config: OrtConfig) -> Result<Self> {
        info!("📦 加载模型: {}", config.model_path.display());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.intra_threads.max(1))?
            .commit_from_file(&config.model_path)
            .with_context(|| format!("无法加载模型 {}", config.model_path.display()))?;

        let first = session
            .inputs
            .first()
            .ok_or_else(|| anyhow!("模型没有输入张量"))?;
        let (ty, dims) = tensor_info(&first.input_type)
            .ok_or_else(|| ModelError::UnsupportedLayout(format!("输入 {} 不是张量", first.name)))?;
        let input = InputSpec::from_shape(&first.name, element_type(ty)?, &dims)?;

        let outputs = session
            .outputs
            .iter()
            .map(|o| {
                let (ty, dims) = tensor_info(&o.output_type).ok_or_else(|| {
                    ModelError::UnsupportedLayout(format!("输出 {} 不是张量", o.name))
                })?;
                Ok(OutputSpec {
                    name: o.name.clone(),
                    shape: dims,
                    element_type: element_type(ty)?,
                })
            })
            .collect::<Result<Vec<_>, ModelError>>()?;

        let backend = Self {
            session,
            input,
            outputs,
        };
        info!("✅ 模型加载成功: {}", backend.summary());
        Ok(backend)
    }
}

impl InferenceBackend for OrtBackend {
    fn input_spec(&self) -> &InputSpec {
        &self.input
    }

    fn output_specs(&self) -> &[OutputSpec] {
        &self.outputs
    }

    fn invoke(&mut self, input: InputTensor) -> Result<Vec<OutputTensor>> {
        let name = self.input.name.as_str();
        let outputs = match input {
            InputTensor::I8(a) => {
                let shape = a.shape().to_vec();
                let value = Tensor::from_array((shape.as_slice(), a.into_raw_vec().into_boxed_slice()))?;
                self.session.run(ort::inputs![name => value])?
            }
            InputTensor::U8(a) => {
                let shape = a.shape().to_vec();
                let value = Tensor::from_array((shape.as_slice(), a.into_raw_vec().into_boxed_slice()))?;
                self.session.run(ort::inputs![name => value])?
            }
            InputTensor::F32(a) => {
                let shape = a.shape().to_vec();
                let value = Tensor::from_array((shape.as_slice(), a.into_raw_vec().into_boxed_slice()))?;
                self.session.run(ort::inputs![name => value])?
            }
        };

        let mut result = Vec::with_capacity(self.outputs.len());
        for (idx, spec) in self.outputs.iter().enumerate() {
            let value = &outputs[idx];
            let tensor = match spec.element_type {
                ElementType::F32 => {
                    let (shape, data) = value.try_extract_tensor::<f32>()?;
                    OutputTensor::F32(ArrayD::from_shape_vec(dims(shape), data.to_vec())?)
                }
                ElementType::I8 => {
                    let (shape, data) = value.try_extract_tensor::<i8>()?;
                    OutputTensor::I8(ArrayD::from_shape_vec(dims(shape), data.to_vec())?)
                }
                ElementType::U8 => {
                    let (shape, data) = value.try_extract_tensor::<u8>()?;
                    OutputTensor::U8(ArrayD::from_shape_vec(dims(shape), data.to_vec())?)
                }
            };
            result.push(tensor);
        }
        Ok(result)
    }
}

fn tensor_info(value_type: &ValueType) -> Option<(TensorElementType, Vec<i64>)> {
    match value_type {
        ValueType::Tensor { ty, shape, .. } => Some((*ty, shape.to_vec())),
        _ => None,
    }
}

fn element_type(ty: TensorElementType) -> Result<ElementType, ModelError> {
    match ty {
        TensorElementType::Float32 => Ok(ElementType::F32),
        TensorElementType::Int8 => Ok(ElementType::I8),
        TensorElementType::Uint8 => Ok(ElementType::U8),
        other => Err(ModelError::UnsupportedElementType(format!("{:?}", other))),
    }
}

fn dims(shape: &[i64]) -> IxDyn {
    IxDyn(&shape.iter().map(|&d| d.max(0) as usize).collect::<Vec<_>>())
}
