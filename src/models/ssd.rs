// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! SSD 检测框解码
//!
//! 三个并行输出: 归一化框 `[ymin, xmin, ymax, xmax]`、类别编号、分数。
//! 类别编号在模型里从0开始, 对外 +1 (0 留给背景)。

use crate::detection::types::{BBox, Detection};

/// 返回最高分检测框 (不过滤阈值), 分数相同时取第一个
pub fn decode_boxes(
    boxes: &[[f32; 4]],
    classes: &[f32],
    scores: &[f32],
    frame_w: u32,
    frame_h: u32,
) -> Option<Detection> {
    let count = boxes.len().min(scores.len());

    let mut best: Option<(usize, f32)> = None;
    for (idx, &score) in scores.iter().take(count).enumerate() {
        if score.is_nan() {
            continue;
        }
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((idx, score));
        }
    }

    let (idx, score) = best?;
    let [ymin, xmin, ymax, xmax] = boxes[idx];
    let (fw, fh) = (frame_w as f32, frame_h as f32);
    let bbox = BBox {
        x1: xmin * fw,
        y1: ymin * fh,
        x2: xmax * fw,
        y2: ymax * fh,
    };
    let (center_x, center_y) = bbox.center();
    let class_id = classes
        .get(idx)
        .filter(|c| c.is_finite() && **c >= 0.0)
        .map(|&c| c as usize + 1);

    Some(Detection {
        confidence: score,
        center_x,
        center_y,
        class_id,
        bbox: Some(bbox),
    })
}
