//! Overlay rendering for the normal and emergency views.
//!
//! Both views draw onto a copy of the display frame; the input is never
//! modified. Boxes are clipped to the frame.

use image::{Rgb, RgbImage};

use crate::detect::{BoundingBox, Detection};
use crate::frame::Frame;
use crate::priority;
use crate::safety::{Rgb as Color, Tier};

const NORMAL_CORNER: i32 = 8;
const NORMAL_CORNER_WIDTH: u32 = 2;
const EMERGENCY_CORNER: i32 = 12;
const EMERGENCY_CORNER_WIDTH: u32 = 3;
const EMERGENCY_ALPHA_BOOST: f32 = 0.15;
const EMERGENCY_STROKE_BOOST: u32 = 1;
const INNER_OFFSET: i32 = 5;

/// Which of the two output streams a frame belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewMode {
    Normal,
    Emergency,
}

/// All detections, SAFE first so DANGER ends up on top.
pub fn render_normal(frame: &Frame, detections: &[Detection], show_detections: bool) -> Frame {
    let mut out = frame.clone();
    if !show_detections {
        return out;
    }
    let img = out.image_mut();
    for tier in Tier::PRIORITY_ORDER {
        for det in detections.iter().filter(|d| d.tier() == tier) {
            let style = det.style();
            let Some(bbox) = visible(img, det.bbox()) else {
                continue;
            };
            fill_rect(img, bbox, style.fill_color, style.fill_opacity);
            stroke_rect(img, bbox, style.stroke_color, style.stroke_width);
            corner_marks(img, bbox, style.stroke_color, NORMAL_CORNER, NORMAL_CORNER_WIDTH);
        }
    }
    out
}

/// Only the tier chosen by the priority resolver, drawn heavier and with a
/// per-tier inner pattern.
pub fn render_emergency(frame: &Frame, detections: &[Detection], show_detections: bool) -> Frame {
    let mut out = frame.clone();
    if !show_detections {
        return out;
    }
    let img = out.image_mut();
    for det in priority::resolve(detections) {
        let style = det.style();
        let Some(bbox) = visible(img, det.bbox()) else {
            continue;
        };
        let alpha = (style.fill_opacity + EMERGENCY_ALPHA_BOOST).min(1.0);
        fill_rect(img, bbox, style.fill_color, alpha);
        stroke_rect(
            img,
            bbox,
            style.stroke_color,
            style.stroke_width + EMERGENCY_STROKE_BOOST,
        );
        corner_marks(img, bbox, style.stroke_color, EMERGENCY_CORNER, EMERGENCY_CORNER_WIDTH);
        inner_pattern(img, bbox, det.tier());
    }
    out
}

fn inner_pattern(img: &mut RgbImage, b: BoundingBox, tier: Tier) {
    let o = INNER_OFFSET;
    match tier {
        Tier::Safe => {
            let color = [0, 200, 0];
            line(img, (b.x1 + o, b.y1 + o), (b.x2 - o, b.y2 - o), color, 1);
            line(img, (b.x2 - o, b.y1 + o), (b.x1 + o, b.y2 - o), color, 1);
        }
        Tier::Caution => {
            let cy = (b.y1 + b.y2) / 2;
            line(img, (b.x1 + o, cy), (b.x2 - o, cy), [200, 200, 0], 1);
        }
        Tier::Danger => {
            let qx1 = b.x1 + b.width() / 4;
            let qx2 = b.x2 - b.width() / 4;
            let color = [200, 0, 0];
            line(img, (qx1, b.y1 + o), (qx1, b.y2 - o), color, 1);
            line(img, (qx2, b.y1 + o), (qx2, b.y2 - o), color, 1);
        }
    }
}

fn corner_marks(img: &mut RgbImage, b: BoundingBox, color: Color, size: i32, width: u32) {
    let marks = [
        ((b.x1, b.y1), (b.x1 + size, b.y1)),
        ((b.x1, b.y1), (b.x1, b.y1 + size)),
        ((b.x2, b.y1), (b.x2 - size, b.y1)),
        ((b.x2, b.y1), (b.x2, b.y1 + size)),
        ((b.x1, b.y2), (b.x1 + size, b.y2)),
        ((b.x1, b.y2), (b.x1, b.y2 - size)),
        ((b.x2, b.y2), (b.x2 - size, b.y2)),
        ((b.x2, b.y2), (b.x2, b.y2 - size)),
    ];
    for (from, to) in marks {
        line(img, from, to, color, width);
    }
}

/// Alpha-blend `color` over the box interior.
fn fill_rect(img: &mut RgbImage, b: BoundingBox, color: Color, alpha: f32) {
    let Some((x0, y0, x1, y1)) = clip(img, b) else {
        return;
    };
    let alpha = alpha.clamp(0.0, 1.0);
    for y in y0..=y1 {
        for x in x0..=x1 {
            let p = img.get_pixel_mut(x, y);
            for c in 0..3 {
                let blended = color[c] as f32 * alpha + p[c] as f32 * (1.0 - alpha);
                p[c] = blended.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

/// Rectangle outline growing inwards from the box edge.
fn stroke_rect(img: &mut RgbImage, b: BoundingBox, color: Color, thickness: u32) {
    for t in 0..thickness as i32 {
        let (x1, y1, x2, y2) = (b.x1 + t, b.y1 + t, b.x2 - t, b.y2 - t);
        if x1 > x2 || y1 > y2 {
            break;
        }
        line(img, (x1, y1), (x2, y1), color, 1);
        line(img, (x1, y2), (x2, y2), color, 1);
        line(img, (x1, y1), (x1, y2), color, 1);
        line(img, (x2, y1), (x2, y2), color, 1);
    }
}

/// Bresenham line with a square brush of side `width`.
fn line(img: &mut RgbImage, from: (i32, i32), to: (i32, i32), color: Color, width: u32) {
    let (mut x, mut y) = from;
    let dx = (to.0 - x).abs();
    let dy = -(to.1 - y).abs();
    let sx = if x < to.0 { 1 } else { -1 };
    let sy = if y < to.1 { 1 } else { -1 };
    let mut err = dx + dy;
    let half = (width as i32 - 1) / 2;
    loop {
        for oy in -half..=(width as i32 - 1 - half) {
            for ox in -half..=(width as i32 - 1 - half) {
                put(img, x + ox, y + oy, color);
            }
        }
        if x == to.0 && y == to.1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

fn put(img: &mut RgbImage, x: i32, y: i32, color: Color) {
    if x < 0 || y < 0 || x as u32 >= img.width() || y as u32 >= img.height() {
        return;
    }
    img.put_pixel(x as u32, y as u32, Rgb(color));
}

/// The part of `b` inside the image. Everything is drawn from this box so
/// line walks stay bounded by the frame.
fn visible(img: &RgbImage, b: BoundingBox) -> Option<BoundingBox> {
    let (x1, y1, x2, y2) = clip(img, b)?;
    Some(BoundingBox::new(x1 as i32, y1 as i32, x2 as i32, y2 as i32))
}

fn clip(img: &RgbImage, b: BoundingBox) -> Option<(u32, u32, u32, u32)> {
    let max_x = img.width() as i32 - 1;
    let max_y = img.height() as i32 - 1;
    if max_x < 0 || max_y < 0 || b.x2 < 0 || b.y2 < 0 || b.x1 > max_x || b.y1 > max_y {
        return None;
    }
    Some((
        b.x1.max(0) as u32,
        b.y1.max(0) as u32,
        b.x2.min(max_x) as u32,
        b.y2.min(max_y) as u32,
    ))
}
