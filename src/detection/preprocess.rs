// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 预处理: RGB帧 → 模型输入张量
//!
//! 1. Resize 到模型输入尺寸 (fast_image_resize + Nearest)
//! 2. 单通道模型转灰度
//! 3. 按输入类型编码: int8 减128, float 除255, uint8 原样
//! 4. 按布局排列 (NHWC / NCHW)

use anyhow::{anyhow, Result};
use fast_image_resize as fr;
use image::{DynamicImage, RgbImage};
use ndarray::{ArrayD, IxDyn};

use crate::models::{ElementType, InputSpec, InputTensor, TensorLayout};

pub struct Preprocessor {
    resizer: fr::Resizer,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Preprocessor {
    pub fn new() -> Self {
        Self {
            resizer: fr::Resizer::new(),
        }
    }

    /// 缩放到 `width × height` (尺寸相同时直接复制)
    pub fn resize(&mut self, frame: &RgbImage, width: u32, height: u32) -> Result<RgbImage> {
        if frame.dimensions() == (width, height) {
            return Ok(frame.clone());
        }
        let src = fr::images::Image::from_vec_u8(
            frame.width(),
            frame.height(),
            frame.as_raw().clone(),
            fr::PixelType::U8x3,
        )?;
        let mut dst = fr::images::Image::new(width, height, fr::PixelType::U8x3);
        self.resizer.resize(
            &src,
            &mut dst,
            &fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Nearest),
        )?;
        RgbImage::from_raw(width, height, dst.buffer().to_vec())
            .ok_or_else(|| anyhow!("缩放结果尺寸不符: {}x{}", width, height))
    }

    pub fn prepare(&mut self, frame: &RgbImage, spec: &InputSpec) -> Result<InputTensor> {
        let resized = self.resize(frame, spec.width, spec.height)?;
        let pixels = if spec.channels == 1 {
            DynamicImage::ImageRgb8(resized).into_luma8().into_raw()
        } else {
            resized.into_raw()
        };
        let data = arrange(&pixels, spec);
        let shape = IxDyn(&spec.tensor_shape());

        let tensor = match spec.element_type {
            ElementType::I8 => InputTensor::I8(ArrayD::from_shape_vec(
                shape,
                data.iter().map(|&p| (p as i16 - 128) as i8).collect(),
            )?),
            ElementType::U8 => InputTensor::U8(ArrayD::from_shape_vec(shape, data)?),
            ElementType::F32 => InputTensor::F32(ArrayD::from_shape_vec(
                shape,
                data.iter().map(|&p| p as f32 / 255.0).collect(),
            )?),
        };
        Ok(tensor)
    }
}

/// 交错像素 (HWC) → 目标布局
fn arrange(pixels: &[u8], spec: &InputSpec) -> Vec<u8> {
    match spec.layout {
        TensorLayout::Nhwc => pixels.to_vec(),
        TensorLayout::Nchw => {
            let c = spec.channels as usize;
            let plane = (spec.width * spec.height) as usize;
            let mut out = vec![0u8; pixels.len()];
            for (i, px) in pixels.chunks_exact(c).enumerate() {
                for (ch, &v) in px.iter().enumerate() {
                    out[ch * plane + i] = v;
                }
            }
            out
        }
    }
}
