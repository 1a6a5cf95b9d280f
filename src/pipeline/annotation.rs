// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 帧叠加层 (Overlay)
//!
//! 区域边界竖线、目标标记 (圆点 / 检测框)、底部状态条。
//! 状态条颜色: 绿=前进, 黄=转向, 红=搜索/停车, 蓝=手动。

use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_circle_mut, draw_hollow_rect_mut,
    draw_line_segment_mut,
};
use imageproc::rect::Rect;

use super::Mode;
use crate::control::{Steering, Zone, ZoneLayout};
use crate::detection::BBox;

const BOUNDARY: Rgb<u8> = Rgb([255, 255, 0]);
const TARGET: Rgb<u8> = Rgb([0, 255, 0]);
const BRIDGED: Rgb<u8> = Rgb([255, 165, 0]);
const BOX: Rgb<u8> = Rgb([0, 200, 255]);

const STATUS_BAR_HEIGHT: u32 = 12;

/// 本帧要画的内容
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Overlay {
    pub steering: Option<Steering>,
    /// 跟踪位置 (x, y)
    pub target: Option<(f32, f32)>,
    /// 目标是沿用的上一位置
    pub bridged: bool,
    pub bbox: Option<BBox>,
}

/// 状态条颜色
pub fn status_color(mode: Mode, steering: Option<Steering>) -> Rgb<u8> {
    match (mode, steering) {
        (Mode::Manual, _) => Rgb([40, 90, 220]),
        (Mode::Autonomous, Some(Steering::Zone(Zone::Center))) => Rgb([0, 180, 0]),
        (Mode::Autonomous, Some(Steering::Zone(_))) => Rgb([230, 200, 0]),
        (Mode::Autonomous, Some(Steering::Stop)) => Rgb([220, 0, 0]),
        (Mode::Autonomous, None) => Rgb([128, 128, 128]),
    }
}

pub fn annotate(frame: &mut RgbImage, zones: &ZoneLayout, overlay: &Overlay, mode: Mode) {
    let (w, h) = frame.dimensions();
    if w == 0 || h == 0 {
        return;
    }

    if mode == Mode::Autonomous {
        for x in zones.boundary_pixels(w) {
            let x = x.round();
            draw_line_segment_mut(frame, (x, 0.0), (x, h as f32), BOUNDARY);
        }
    }

    if let Some(bbox) = overlay.bbox {
        let bw = bbox.width().round() as u32;
        let bh = bbox.height().round() as u32;
        if bw > 0 && bh > 0 {
            let rect = Rect::at(bbox.x1.round() as i32, bbox.y1.round() as i32).of_size(bw, bh);
            draw_hollow_rect_mut(frame, rect, BOX);
        }
    }

    if let Some((x, y)) = overlay.target {
        let center = (x.round() as i32, y.round() as i32);
        if overlay.bridged {
            draw_hollow_circle_mut(frame, center, 8, BRIDGED);
        } else {
            draw_filled_circle_mut(frame, center, 5, TARGET);
            draw_hollow_circle_mut(frame, center, 9, TARGET);
        }
    }

    let bar_h = STATUS_BAR_HEIGHT.min(h);
    draw_filled_rect_mut(
        frame,
        Rect::at(0, (h - bar_h) as i32).of_size(w, bar_h),
        status_color(mode, overlay.steering),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_bar_color_follows_steering() {
        let mut frame = RgbImage::new(320, 240);
        let overlay = Overlay {
            steering: Some(Steering::Stop),
            ..Overlay::default()
        };
        annotate(&mut frame, &ZoneLayout::three_zone(), &overlay, Mode::Autonomous);
        assert_eq!(*frame.get_pixel(10, 235), Rgb([220, 0, 0]));

        let overlay = Overlay {
            steering: Some(Steering::Zone(Zone::Center)),
            ..Overlay::default()
        };
        annotate(&mut frame, &ZoneLayout::three_zone(), &overlay, Mode::Autonomous);
        assert_eq!(*frame.get_pixel(10, 235), Rgb([0, 180, 0]));
    }

    #[test]
    fn test_boundaries_and_target_drawn() {
        let mut frame = RgbImage::new(320, 240);
        let overlay = Overlay {
            steering: Some(Steering::Zone(Zone::HardRight)),
            target: Some((280.0, 90.0)),
            ..Overlay::default()
        };
        annotate(&mut frame, &ZoneLayout::three_zone(), &overlay, Mode::Autonomous);
        assert_eq!(*frame.get_pixel(112, 50), BOUNDARY);
        assert_eq!(*frame.get_pixel(208, 50), BOUNDARY);
        assert_eq!(*frame.get_pixel(280, 90), TARGET);
    }

    #[test]
    fn test_manual_mode_has_no_zone_lines() {
        let mut frame = RgbImage::new(320, 240);
        annotate(&mut frame, &ZoneLayout::three_zone(), &Overlay::default(), Mode::Manual);
        assert_eq!(*frame.get_pixel(112, 50), Rgb([0, 0, 0]));
        assert_eq!(*frame.get_pixel(10, 235), Rgb([40, 90, 220]));
    }
}
