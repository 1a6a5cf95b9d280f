// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 区域划分 (Zone Classifier)
//!
//! 把跟踪到的水平像素位置映射为离散转向区域。纯函数, 无状态, 每帧重新计算。
//! 边界比例来自配置, 不做推导。

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// 水平转向区域
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Zone {
    HardLeft,
    SlightLeft,
    Center,
    SlightRight,
    HardRight,
}

impl Zone {
    /// 状态栏显示名
    pub fn label(self) -> &'static str {
        match self {
            Zone::HardLeft => "HARD LEFT",
            Zone::SlightLeft => "SLIGHT LEFT",
            Zone::Center => "FORWARD",
            Zone::SlightRight => "SLIGHT RIGHT",
            Zone::HardRight => "HARD RIGHT",
        }
    }

    pub fn is_left(self) -> bool {
        matches!(self, Zone::HardLeft | Zone::SlightLeft)
    }

    pub fn is_right(self) -> bool {
        matches!(self, Zone::HardRight | Zone::SlightRight)
    }
}

/// 区域布局 (边界为画面宽度的比例)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ZoneLayout {
    /// LEFT | FORWARD | RIGHT
    ThreeZone { left: f32, right: f32 },
    /// HARD LEFT | SLIGHT LEFT | FORWARD | SLIGHT RIGHT | HARD RIGHT
    FiveZone {
        far_left: f32,
        slight_left: f32,
        slight_right: f32,
        far_right: f32,
    },
}

impl Default for ZoneLayout {
    fn default() -> Self {
        Self::three_zone()
    }
}

impl ZoneLayout {
    /// 默认三区: 0-35% 左, 65-100% 右
    pub fn three_zone() -> Self {
        ZoneLayout::ThreeZone {
            left: 0.35,
            right: 0.65,
        }
    }

    /// 默认五区: 25% / 40% / 60% / 75%
    pub fn five_zone() -> Self {
        ZoneLayout::FiveZone {
            far_left: 0.25,
            slight_left: 0.40,
            slight_right: 0.60,
            far_right: 0.75,
        }
    }

    /// 边界比例 (从左到右)
    pub fn boundaries(&self) -> Vec<f32> {
        match *self {
            ZoneLayout::ThreeZone { left, right } => vec![left, right],
            ZoneLayout::FiveZone {
                far_left,
                slight_left,
                slight_right,
                far_right,
            } => vec![far_left, slight_left, slight_right, far_right],
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let b = self.boundaries();
        let inside = b.iter().all(|f| *f > 0.0 && *f < 1.0);
        let increasing = b.windows(2).all(|w| w[0] < w[1]);
        if inside && increasing {
            Ok(())
        } else {
            Err(ConfigError::ZoneBoundaries(b))
        }
    }

    /// 像素位置 → 区域
    pub fn classify(&self, x: f32, frame_width: u32) -> Zone {
        let w = frame_width as f32;
        match *self {
            ZoneLayout::ThreeZone { left, right } => {
                if x < left * w {
                    Zone::HardLeft
                } else if x > right * w {
                    Zone::HardRight
                } else {
                    Zone::Center
                }
            }
            ZoneLayout::FiveZone {
                far_left,
                slight_left,
                slight_right,
                far_right,
            } => {
                if x < far_left * w {
                    Zone::HardLeft
                } else if x < slight_left * w {
                    Zone::SlightLeft
                } else if x <= slight_right * w {
                    Zone::Center
                } else if x < far_right * w {
                    Zone::SlightRight
                } else {
                    Zone::HardRight
                }
            }
        }
    }

    /// 边界像素位置, 用于画面叠加
    pub fn boundary_pixels(&self, frame_width: u32) -> Vec<f32> {
        self.boundaries()
            .into_iter()
            .map(|f| f * frame_width as f32)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_zone_reference_points() {
        let layout = ZoneLayout::three_zone();
        for w in [1u32, 160, 320, 641, 1920] {
            let wf = w as f32;
            assert_eq!(layout.classify(0.10 * wf, w), Zone::HardLeft);
            assert_eq!(layout.classify(0.50 * wf, w), Zone::Center);
            assert_eq!(layout.classify(0.90 * wf, w), Zone::HardRight);
        }
    }

    #[test]
    fn test_five_zone_reference_points() {
        let layout = ZoneLayout::five_zone();
        for w in [2u32, 320, 640] {
            let wf = w as f32;
            assert_eq!(layout.classify(0.10 * wf, w), Zone::HardLeft);
            assert_eq!(layout.classify(0.30 * wf, w), Zone::SlightLeft);
            assert_eq!(layout.classify(0.50 * wf, w), Zone::Center);
            assert_eq!(layout.classify(0.70 * wf, w), Zone::SlightRight);
            assert_eq!(layout.classify(0.90 * wf, w), Zone::HardRight);
        }
    }

    #[test]
    fn test_three_zone_boundaries_belong_to_center() {
        let layout = ZoneLayout::three_zone();
        // 35% 与 65% 本身属于中间区 (严格比较)
        assert_eq!(layout.classify(35.0, 100), Zone::Center);
        assert_eq!(layout.classify(65.0, 100), Zone::Center);
        assert_eq!(layout.classify(34.9, 100), Zone::HardLeft);
        assert_eq!(layout.classify(65.1, 100), Zone::HardRight);
    }

    #[test]
    fn test_five_zone_center_is_inclusive() {
        let layout = ZoneLayout::five_zone();
        assert_eq!(layout.classify(40.0, 100), Zone::Center);
        assert_eq!(layout.classify(60.0, 100), Zone::Center);
        assert_eq!(layout.classify(75.0, 100), Zone::HardRight);
        assert_eq!(layout.classify(25.0, 100), Zone::SlightLeft);
    }

    #[test]
    fn test_validate_rejects_unordered() {
        assert!(ZoneLayout::three_zone().validate().is_ok());
        assert!(ZoneLayout::five_zone().validate().is_ok());
        let bad = ZoneLayout::ThreeZone {
            left: 0.7,
            right: 0.3,
        };
        assert!(bad.validate().is_err());
        let outside = ZoneLayout::ThreeZone {
            left: 0.0,
            right: 0.5,
        };
        assert!(outside.validate().is_err());
    }
}
