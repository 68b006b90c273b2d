use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::detect::result::Detection;

const STROKE_WIDTH: i32 = 3;

fn class_color(class_id: usize) -> Rgb<u8> {
    let (r, g, b) = match class_id {
        0 => (220, 20, 20),
        1 => (240, 200, 0),
        2 => (20, 120, 240),
        3 => (20, 200, 120),
        _ => (160, 160, 160),
    };
    Rgb([r, g, b])
}

/// Draw detection boxes onto the model-input frame, one color per class.
pub fn annotate_detections(frame: &mut RgbImage, detections: &[Detection]) {
    let (width, height) = (frame.width(), frame.height());
    for det in detections {
        let x1 = (det.bbox[0] * width as f32).round() as i32;
        let y1 = (det.bbox[1] * height as f32).round() as i32;
        let x2 = (det.bbox[2] * width as f32).round() as i32;
        let y2 = (det.bbox[3] * height as f32).round() as i32;

        let x_min = x1.min(x2).clamp(0, width as i32 - 1);
        let y_min = y1.min(y2).clamp(0, height as i32 - 1);
        let x_max = x1.max(x2).clamp(0, width as i32);
        let y_max = y1.max(y2).clamp(0, height as i32);
        let rect_w = (x_max - x_min).max(1) as u32;
        let rect_h = (y_max - y_min).max(1) as u32;

        let color = class_color(det.class_id);
        draw_hollow_rect_mut(frame, Rect::at(x_min, y_min).of_size(rect_w, rect_h), color);
        for inset in 1..STROKE_WIDTH.min(rect_w as i32 / 2).min(rect_h as i32 / 2) {
            let inner_w = rect_w.saturating_sub(2 * inset as u32).max(1);
            let inner_h = rect_h.saturating_sub(2 * inset as u32).max(1);
            let inner = Rect::at(x_min + inset, y_min + inset).of_size(inner_w, inner_h);
            draw_hollow_rect_mut(frame, inner, color);
        }
    }
}
