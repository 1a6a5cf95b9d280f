// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测数据结构定义
/// Data structures for the follower detection path
use std::fmt;

// ========== 公共常量 ==========

/// 控制环处理帧宽
pub const FRAME_WIDTH: u32 = 320;

/// 控制环处理帧高
pub const FRAME_HEIGHT: u32 = 240;

// ========== 数据结构 ==========

/// 检测框 (帧像素坐标)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }
}

/// 单个目标候选
///
/// 坐标是调用方传入帧尺寸下的像素坐标
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    pub confidence: f32,
    pub center_x: f32,
    pub center_y: f32,
    pub class_id: Option<usize>,
    /// 只有检测框模型才有
    pub bbox: Option<BBox>,
}

impl fmt::Display for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "conf={:.3} @ ({:.0},{:.0})",
            self.confidence, self.center_x, self.center_y
        )?;
        if let Some(class_id) = self.class_id {
            write!(f, " class={}", class_id)?;
        }
        Ok(())
    }
}
