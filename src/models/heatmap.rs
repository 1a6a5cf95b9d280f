// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! FOMO 热力图解码 (Heatmap decoding)
//!
//! 输出为 `grid_h × grid_w × classes` 的逐格置信度。
//! 多类别时第0类是背景, 不参与竞争; 取全局最大值所在格子的中心作为目标位置。

use ndarray::Array3;

use crate::detection::types::Detection;

/// 返回最高分格子 (不过滤阈值)
///
/// 扫描顺序为 行 → 列 → 类别, 分数相同时保留第一次出现的格子。
pub fn decode_heatmap(grid: &Array3<f32>, frame_w: u32, frame_h: u32) -> Option<Detection> {
    let (grid_h, grid_w, classes) = grid.dim();
    if grid_h == 0 || grid_w == 0 || classes == 0 {
        return None;
    }
    let first_class = if classes > 1 { 1 } else { 0 };

    let mut best: Option<(usize, usize, usize, f32)> = None;
    for gy in 0..grid_h {
        for gx in 0..grid_w {
            for class in first_class..classes {
                let score = grid[[gy, gx, class]];
                if score.is_nan() {
                    continue;
                }
                if best.map_or(true, |(_, _, _, s)| score > s) {
                    best = Some((gy, gx, class, score));
                }
            }
        }
    }

    let (gy, gx, class, score) = best?;
    let cell_w = frame_w as f32 / grid_w as f32;
    let cell_h = frame_h as f32 / grid_h as f32;
    Some(Detection {
        confidence: score,
        center_x: (gx as f32 + 0.5) * cell_w,
        center_y: (gy as f32 + 0.5) * cell_h,
        class_id: Some(class),
        bbox: None,
    })
}
