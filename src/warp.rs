//! Perspective warp of a design image into a destination quadrilateral
//!
//! Every canvas pixel inside the destination bounding box is mapped back
//! through the inverse homography into design space and bilinearly
//! sampled. Blending happens per pixel against the untouched mockup, and
//! the resulting off-screen region is then drawn onto the canvas with a
//! plain source-over.

use image::{GrayImage, RgbaImage};
use rayon::prelude::*;
use tracing::debug;

use crate::blend::{blend, source_over, BlendContext, BlendModel, BlendTuning, FoldMap, Rgba};
use crate::homography::Homography;
use crate::placement::{bounding_box, Point};

/// Integer pixel rectangle on the canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Summary of a warp that touched the canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarpStats {
    pub region: PixelRegion,
    /// Pixels written onto the canvas
    pub written: usize,
}

/// Bounding box of `points` clamped to a `width x height` canvas.
///
/// Returns `None` when the box is empty or the points are not finite.
pub fn clamped_region(points: &[Point], width: u32, height: u32) -> Option<PixelRegion> {
    if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return None;
    }
    let b = bounding_box(points);

    let min_x = b.x.floor().max(0.0);
    let min_y = b.y.floor().max(0.0);
    let max_x = (b.x + b.width).ceil().min(width as f64);
    let max_y = (b.y + b.height).ceil().min(height as f64);

    if max_x <= min_x || max_y <= min_y {
        return None;
    }

    Some(PixelRegion {
        x: min_x as u32,
        y: min_y as u32,
        width: (max_x - min_x) as u32,
        height: (max_y - min_y) as u32,
    })
}

/// Warp `design` onto `canvas` so its corners land on `dst`.
///
/// Degenerate geometry (singular homography, empty or off-canvas box) is
/// a silent no-op returning `None`. When `clip` is given, only pixels with
/// a non-zero mask value are written.
pub fn warp(
    canvas: &mut RgbaImage,
    design: &RgbaImage,
    dst: &[Point; 4],
    model: BlendModel,
    tuning: &BlendTuning,
    clip: Option<&GrayImage>,
) -> Option<WarpStats> {
    let (src_w, src_h) = design.dimensions();
    if src_w == 0 || src_h == 0 {
        return None;
    }

    let forward = Homography::from_rect(src_w as f64, src_h as f64, dst);
    let Some(inverse) = forward.inverse() else {
        debug!("Skipping warp: degenerate homography for {:?}", dst);
        return None;
    };

    let (canvas_w, canvas_h) = canvas.dimensions();
    let Some(region) = clamped_region(dst, canvas_w, canvas_h) else {
        debug!("Skipping warp: destination box is empty");
        return None;
    };

    let fold_map = (model == BlendModel::AdaptiveFabric).then(|| {
        FoldMap::measure(canvas, region.x, region.y, region.width, region.height, tuning)
    });
    let base_ctx = BlendContext {
        avg_lum: fold_map.as_ref().map(|m| m.avg_lum()).unwrap_or(0.5),
        ..BlendContext::new(tuning)
    };

    // Off-screen straight-alpha buffer covering the region only
    let row_len = region.width as usize * 4;
    let mut buffer = vec![0u8; row_len * region.height as usize];
    {
        let backdrop: &RgbaImage = canvas;
        buffer
            .par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(row, out)| {
                let y = region.y + row as u32;
                for col in 0..region.width {
                    let x = region.x + col;
                    let Some((sx, sy)) = inverse.apply(x as f64, y as f64) else {
                        continue;
                    };
                    if !(sx >= 0.0 && sx < src_w as f64 && sy >= 0.0 && sy < src_h as f64) {
                        continue;
                    }

                    let sample = sample_bilinear(design, sx, sy);
                    let ctx = BlendContext {
                        fold_detail: fold_map.as_ref().map(|m| m.detail_at(x, y)).unwrap_or(0.0),
                        ..base_ctx
                    };
                    let pixel = blend(model, sample, backdrop.get_pixel(x, y).0, &ctx);

                    let o = col as usize * 4;
                    out[o..o + 4].copy_from_slice(&pixel);
                }
            });
    }

    let mut written = 0usize;
    for row in 0..region.height {
        let y = region.y + row;
        for col in 0..region.width {
            let x = region.x + col;
            let o = row as usize * row_len + col as usize * 4;
            let src = [buffer[o], buffer[o + 1], buffer[o + 2], buffer[o + 3]];
            if src[3] == 0 {
                continue;
            }
            if let Some(mask) = clip {
                if x >= mask.width() || y >= mask.height() || mask.get_pixel(x, y).0[0] == 0 {
                    continue;
                }
            }
            let dst_px = canvas.get_pixel_mut(x, y);
            dst_px.0 = source_over(src, dst_px.0);
            written += 1;
        }
    }

    Some(WarpStats { region, written })
}

/// Bilinear sample of an RGBA image at fractional coordinates.
///
/// Coordinates are clamped to the image, so callers that need "outside
/// means transparent" must range-check first.
#[inline]
pub fn sample_bilinear(image: &RgbaImage, x: f64, y: f64) -> Rgba {
    let (width, height) = image.dimensions();
    let max_x = (width.max(1) - 1) as f64;
    let max_y = (height.max(1) - 1) as f64;
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let fx = (x - x0 as f64) as f32;
    let fy = (y - y0 as f64) as f32;

    let w00 = (1.0 - fx) * (1.0 - fy);
    let w10 = fx * (1.0 - fy);
    let w01 = (1.0 - fx) * fy;
    let w11 = fx * fy;

    let p00 = image.get_pixel(x0, y0).0;
    let p10 = image.get_pixel(x1, y0).0;
    let p01 = image.get_pixel(x0, y1).0;
    let p11 = image.get_pixel(x1, y1).0;

    let mut result = [0.0f32; 4];
    for c in 0..4 {
        result[c] = p00[c] as f32 * w00
            + p10[c] as f32 * w10
            + p01[c] as f32 * w01
            + p11[c] as f32 * w11;
    }
    result
}
