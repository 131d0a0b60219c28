//! Click-to-detect placement zones
//!
//! Mockup photos usually show the printable area as a flat, evenly lit
//! region (a blank frame, a plain shirt front). Clicking inside it grows a
//! 4-connected region of similar colour and returns its bounding box.

use image::RgbaImage;
use tracing::debug;

use crate::placement::{Point, QuadPlacement};

/// Maximum summed absolute RGB difference from the clicked pixel
pub const COLOR_THRESHOLD: u32 = 40;

/// Detect a quad placement from a click given in percent of the image.
///
/// Returns `None` when the click lies outside the image.
pub fn detect_placement(image: &RgbaImage, click: Point) -> Option<QuadPlacement> {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 || !click.x.is_finite() || !click.y.is_finite() {
        return None;
    }

    let px = (click.x / 100.0 * w as f64).floor();
    let py = (click.y / 100.0 * h as f64).floor();
    if px < 0.0 || py < 0.0 || px >= w as f64 || py >= h as f64 {
        return None;
    }

    let (min_x, min_y, max_x, max_y) = flood_bounds(image, px as u32, py as u32, COLOR_THRESHOLD);
    debug!(
        "Detected region ({}, {})-({}, {}) from click at ({}, {})",
        min_x, min_y, max_x, max_y, px, py
    );

    let to_pct = |x: u32, y: u32| {
        Point::new(x as f64 * 100.0 / w as f64, y as f64 * 100.0 / h as f64)
    };
    Some(QuadPlacement {
        tl: to_pct(min_x, min_y),
        tr: to_pct(max_x, min_y),
        br: to_pct(max_x, max_y),
        bl: to_pct(min_x, max_y),
    })
}

/// Inclusive pixel bounds of the similar-coloured region containing the seed
fn flood_bounds(
    image: &RgbaImage,
    seed_x: u32,
    seed_y: u32,
    threshold: u32,
) -> (u32, u32, u32, u32) {
    let (w, h) = image.dimensions();
    let target = image.get_pixel(seed_x, seed_y).0;
    let matches = |x: u32, y: u32| {
        let p = image.get_pixel(x, y).0;
        let diff: u32 = (0..3).map(|c| (p[c] as i32 - target[c] as i32).unsigned_abs()).sum();
        diff < threshold
    };

    let mut visited = vec![false; w as usize * h as usize];
    let mut stack = vec![(seed_x, seed_y)];
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (seed_x, seed_y, seed_x, seed_y);

    while let Some((x, y)) = stack.pop() {
        let idx = y as usize * w as usize + x as usize;
        if visited[idx] {
            continue;
        }
        visited[idx] = true;
        if !matches(x, y) {
            continue;
        }

        min_x = min_x.min(x);
        max_x = max_x.max(x);
        min_y = min_y.min(y);
        max_y = max_y.max(y);

        if x > 0 {
            stack.push((x - 1, y));
        }
        if x + 1 < w {
            stack.push((x + 1, y));
        }
        if y > 0 {
            stack.push((x, y - 1));
        }
        if y + 1 < h {
            stack.push((x, y + 1));
        }
    }

    (min_x, min_y, max_x, max_y)
}
