//! Photometric blend models for placing a flat design onto a photo
//!
//! Three models are supported:
//! - Normal: the sampled design pixel replaces the mockup pixel
//! - Shadow-preserving multiply for rigid surfaces (wall art, posters)
//! - Adaptive screen/multiply with fold shading for fabric
//!
//! The fabric model is a heuristic: its constants live in [`BlendTuning`]
//! so they can be adjusted without touching the warp loop.

use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// Straight (non-premultiplied) RGBA with channels in 0-255
pub type Rgba = [f32; 4];

/// Photometric model used when writing a design pixel over a mockup pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BlendModel {
    #[default]
    Normal,
    ShadowMultiply,
    AdaptiveFabric,
}

/// Canvas-level composite operations used by the fast preview path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeOp {
    SourceOver,
    Multiply,
    Screen,
}

impl BlendModel {
    /// Coarse canvas operation approximating this model.
    /// `avg_lum` is the mean luminance of the mockup under the design.
    pub fn preview_op(&self, avg_lum: f32) -> CompositeOp {
        match self {
            BlendModel::Normal => CompositeOp::SourceOver,
            BlendModel::ShadowMultiply => CompositeOp::Multiply,
            BlendModel::AdaptiveFabric => {
                if fabric_mix(avg_lum) < 0.5 {
                    CompositeOp::Screen
                } else {
                    CompositeOp::Multiply
                }
            }
        }
    }

    /// Whether blending reads the mockup pixels under the design
    pub fn reads_destination(&self) -> bool {
        !matches!(self, BlendModel::Normal)
    }
}

/// Empirical constants for the realism blends
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendTuning {
    /// How strongly fabric folds modulate the design brightness
    pub fold_strength: f32,
    /// Fold blur radius as a fraction of the smaller region dimension
    pub fold_blur_fraction: f32,
    /// Lower bound for the fold blur radius, in pixels
    pub fold_blur_min_radius: u32,
    /// Quadratic ramp for shadow-preserving multiply (`min(1, lum^2 * ramp)`)
    pub shadow_ramp: f32,
}

impl Default for BlendTuning {
    fn default() -> Self {
        Self {
            fold_strength: 1.8,
            fold_blur_fraction: 0.015,
            fold_blur_min_radius: 2,
            shadow_ramp: 4.0,
        }
    }
}

/// Per-pixel inputs to [`blend`] beyond the two pixels themselves
#[derive(Debug, Clone, Copy)]
pub struct BlendContext {
    /// Average luminance (0-1) of the mockup region under the design
    pub avg_lum: f32,
    /// Local luminance minus its blurred surroundings at this pixel
    pub fold_detail: f32,
    pub fold_strength: f32,
    pub shadow_ramp: f32,
}

impl BlendContext {
    pub fn new(tuning: &BlendTuning) -> Self {
        Self {
            avg_lum: 0.5,
            fold_detail: 0.0,
            fold_strength: tuning.fold_strength,
            shadow_ramp: tuning.shadow_ramp,
        }
    }
}

/// Rec. 601 luma, normalized to 0-1
#[inline]
pub fn luminance(r: f32, g: f32, b: f32) -> f32 {
    (r * 0.299 + g * 0.587 + b * 0.114) / 255.0
}

/// Interpolation weight between screen (0) and multiply (1) for fabric
#[inline]
pub fn fabric_mix(avg_lum: f32) -> f32 {
    ((avg_lum - 0.2) / 0.5).clamp(0.0, 1.0)
}

/// Weight of plain multiply versus shadow-only darkening
#[inline]
pub fn shadow_mix(lum: f32, ramp: f32) -> f32 {
    (lum * lum * ramp).min(1.0)
}

#[inline]
fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[inline]
fn multiply(s: f32, d: f32) -> f32 {
    s * d / 255.0
}

#[inline]
fn screen(s: f32, d: f32) -> f32 {
    255.0 - (255.0 - s) * (255.0 - d) / 255.0
}

/// Blend a sampled design pixel against the existing mockup pixel.
///
/// The result keeps the design's alpha; colour channels are clamped to
/// 0-255 since the heuristic models can overshoot.
pub fn blend(model: BlendModel, src: Rgba, dst: [u8; 4], ctx: &BlendContext) -> [u8; 4] {
    let [sr, sg, sb, sa] = src;
    let (dr, dg, db) = (dst[0] as f32, dst[1] as f32, dst[2] as f32);

    let rgb = match model {
        BlendModel::Normal => [sr, sg, sb],
        BlendModel::ShadowMultiply => {
            let lum = luminance(dr, dg, db);
            let mix = shadow_mix(lum, ctx.shadow_ramp);
            let channel = |s: f32, d: f32| multiply(s, d) * mix + s * lum * (1.0 - mix);
            [channel(sr, dr), channel(sg, dg), channel(sb, db)]
        }
        BlendModel::AdaptiveFabric => {
            let pix_lum = luminance(dr, dg, db);
            let fold_factor = 1.0 + ctx.fold_detail * ctx.fold_strength;
            let t = fabric_mix(ctx.avg_lum);
            let shadow_dim = 0.85 + 0.15 * pix_lum;

            let channel = |s: f32, d: f32| {
                let s = (s * fold_factor).clamp(0.0, 255.0);
                (screen(s, d) * (1.0 - t) + multiply(s, d) * t) * shadow_dim
            };
            [channel(sr, dr), channel(sg, dg), channel(sb, db)]
        }
    };

    [to_u8(rgb[0]), to_u8(rgb[1]), to_u8(rgb[2]), to_u8(sa)]
}

/// Straight-alpha source-over of `src` onto `dst`
#[inline]
pub fn source_over(src: [u8; 4], dst: [u8; 4]) -> [u8; 4] {
    composite(CompositeOp::SourceOver, src, dst)
}

/// Canvas-style compositing: the blend function is applied where both
/// layers are present, then source-over weighted by the source alpha.
pub fn composite(op: CompositeOp, src: [u8; 4], dst: [u8; 4]) -> [u8; 4] {
    let sa = src[3] as f32 / 255.0;
    if sa <= 0.0 {
        return dst;
    }
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);

    let mut out = [0u8; 4];
    for c in 0..3 {
        let cs = src[c] as f32;
        let cb = dst[c] as f32;
        let mixed = match op {
            CompositeOp::SourceOver => cs,
            CompositeOp::Multiply => multiply(cs, cb),
            CompositeOp::Screen => screen(cs, cb),
        };
        // Where the backdrop is transparent the source shows unblended
        let cs = (1.0 - da) * cs + da * mixed;
        let value = (sa * cs + (1.0 - sa) * da * cb) / out_a;
        out[c] = to_u8(value);
    }
    out[3] = to_u8(out_a * 255.0);
    out
}

/// Luminance statistics of the mockup region beneath a design
#[derive(Debug, Clone)]
pub struct FoldMap {
    x0: u32,
    y0: u32,
    width: u32,
    height: u32,
    avg_lum: f32,
    detail: Vec<f32>,
}

impl FoldMap {
    /// Measure the region `[x0, x0+width) x [y0, y0+height)` of `canvas`.
    ///
    /// Fold detail is raw luminance minus a box-blurred luminance:
    /// positive on highlight ridges, negative in creases.
    pub fn measure(
        canvas: &RgbaImage,
        x0: u32,
        y0: u32,
        width: u32,
        height: u32,
        tuning: &BlendTuning,
    ) -> Self {
        let w = width as usize;
        let h = height as usize;
        let mut lum = Vec::with_capacity(w * h);
        let mut sum = 0.0f64;

        for y in y0..y0 + height {
            for x in x0..x0 + width {
                let p = canvas.get_pixel(x, y).0;
                let l = luminance(p[0] as f32, p[1] as f32, p[2] as f32);
                sum += l as f64;
                lum.push(l);
            }
        }

        let avg_lum = if lum.is_empty() {
            0.5
        } else {
            (sum / lum.len() as f64) as f32
        };

        let radius = (((w.min(h)) as f32 * tuning.fold_blur_fraction).round() as usize)
            .max(tuning.fold_blur_min_radius as usize);
        let smooth = box_blur(&lum, w, h, radius);

        let detail = lum.iter().zip(smooth.iter()).map(|(l, s)| l - s).collect();

        Self {
            x0,
            y0,
            width,
            height,
            avg_lum,
            detail,
        }
    }

    pub fn avg_lum(&self) -> f32 {
        self.avg_lum
    }

    /// Fold detail at canvas coordinates, 0 outside the measured region
    #[inline]
    pub fn detail_at(&self, x: u32, y: u32) -> f32 {
        if x < self.x0 || y < self.y0 || x >= self.x0 + self.width || y >= self.y0 + self.height {
            return 0.0;
        }
        let idx = (y - self.y0) as usize * self.width as usize + (x - self.x0) as usize;
        self.detail.get(idx).copied().unwrap_or(0.0)
    }
}

/// Separable box blur with window `[i-r, i+r]`, truncated at the edges
pub fn box_blur(values: &[f32], width: usize, height: usize, radius: usize) -> Vec<f32> {
    let mut tmp = vec![0.0f32; values.len()];
    let mut out = vec![0.0f32; values.len()];
    if width == 0 || height == 0 {
        return out;
    }

    for y in 0..height {
        let row = &values[y * width..(y + 1) * width];
        sliding_mean(row.iter().copied(), width, radius, |x, v| {
            tmp[y * width + x] = v;
        });
    }

    for x in 0..width {
        let column = (0..height).map(|y| tmp[y * width + x]);
        sliding_mean(column, height, radius, |y, v| {
            out[y * width + x] = v;
        });
    }

    out
}

fn sliding_mean(
    input: impl Iterator<Item = f32>,
    len: usize,
    radius: usize,
    mut write: impl FnMut(usize, f32),
) {
    let line: Vec<f32> = input.collect();
    let mut sum = 0.0f32;
    let mut count = 0usize;

    for v in line.iter().take(radius.min(len)) {
        sum += v;
        count += 1;
    }

    for i in 0..len {
        if i + radius < len {
            sum += line[i + radius];
            count += 1;
        }
        if i >= radius + 1 {
            sum -= line[i - radius - 1];
            count -= 1;
        }
        write(i, sum / count as f32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba as Px;

    fn ctx() -> BlendContext {
        BlendContext::new(&BlendTuning::default())
    }

    #[test]
    fn test_normal_copies_source() {
        let out = blend(BlendModel::Normal, [10.2, 200.0, 99.6, 128.0], [1, 2, 3, 255], &ctx());
        assert_eq!(out, [10, 200, 100, 128]);
    }

    #[test]
    fn test_shadow_multiply_black_destination() {
        let out = blend(
            BlendModel::ShadowMultiply,
            [200.0, 150.0, 90.0, 255.0],
            [0, 0, 0, 255],
            &ctx(),
        );
        assert_eq!(out, [0, 0, 0, 255]);
    }

    #[test]
    fn test_shadow_multiply_white_destination() {
        let out = blend(
            BlendModel::ShadowMultiply,
            [200.0, 150.0, 90.0, 255.0],
            [255, 255, 255, 255],
            &ctx(),
        );
        assert_eq!(out, [200, 150, 90, 255]);
    }

    #[test]
    fn test_shadow_multiply_keeps_hue_in_shadow() {
        // lum ~0.2 -> mix 0.16: mostly shadow-only darkening
        let src = [255.0, 0.0, 0.0, 255.0];
        let dst = [51, 51, 51, 255];
        let out = blend(BlendModel::ShadowMultiply, src, dst, &ctx());
        let lum = luminance(51.0, 51.0, 51.0);
        let mix = shadow_mix(lum, 4.0);
        let expected = (255.0 * 51.0 / 255.0) * mix + 255.0 * lum * (1.0 - mix);
        assert_eq!(out[0], expected.round() as u8);
        assert_eq!(out[1], 0);
    }

    #[test]
    fn test_fabric_mix_boundaries() {
        assert_eq!(fabric_mix(0.1), 0.0);
        assert_eq!(fabric_mix(0.9), 1.0);
        assert!((fabric_mix(0.45) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_fabric_dark_is_screen() {
        let mut c = ctx();
        c.avg_lum = 0.1;
        let src = [120.0, 60.0, 200.0, 255.0];
        let dst = [20u8, 20, 20, 255];
        let out = blend(BlendModel::AdaptiveFabric, src, dst, &c);

        let dim = 0.85 + 0.15 * luminance(20.0, 20.0, 20.0);
        for ch in 0..3 {
            let expected = screen(src[ch], dst[ch] as f32) * dim;
            assert_eq!(out[ch], expected.round() as u8);
        }
    }

    #[test]
    fn test_fabric_light_is_multiply() {
        let mut c = ctx();
        c.avg_lum = 0.9;
        let src = [120.0, 60.0, 200.0, 255.0];
        let dst = [230u8, 225, 235, 255];
        let out = blend(BlendModel::AdaptiveFabric, src, dst, &c);

        let dim = 0.85 + 0.15 * luminance(230.0, 225.0, 235.0);
        for ch in 0..3 {
            let expected = multiply(src[ch], dst[ch] as f32) * dim;
            assert_eq!(out[ch], expected.round() as u8);
        }
    }

    #[test]
    fn test_fabric_fold_modulation_clamps() {
        let mut c = ctx();
        c.avg_lum = 0.9;
        c.fold_detail = 10.0;
        let out = blend(
            BlendModel::AdaptiveFabric,
            [250.0, 250.0, 250.0, 255.0],
            [255, 255, 255, 255],
            &c,
        );
        assert_eq!(out, [255, 255, 255, 255]);

        c.fold_detail = -10.0;
        let out = blend(
            BlendModel::AdaptiveFabric,
            [250.0, 250.0, 250.0, 255.0],
            [255, 255, 255, 255],
            &c,
        );
        assert_eq!(&out[..3], &[0, 0, 0]);
    }

    #[test]
    fn test_preview_ops() {
        assert_eq!(BlendModel::Normal.preview_op(0.5), CompositeOp::SourceOver);
        assert_eq!(BlendModel::ShadowMultiply.preview_op(0.0), CompositeOp::Multiply);
        assert_eq!(BlendModel::AdaptiveFabric.preview_op(0.1), CompositeOp::Screen);
        assert_eq!(BlendModel::AdaptiveFabric.preview_op(0.8), CompositeOp::Multiply);
    }

    #[test]
    fn test_composite_ops() {
        let dst = [100, 200, 50, 255];
        assert_eq!(source_over([10, 20, 30, 255], dst), [10, 20, 30, 255]);
        assert_eq!(source_over([10, 20, 30, 0], dst), dst);
        assert_eq!(
            composite(CompositeOp::Multiply, [255, 255, 255, 255], dst),
            dst
        );
        assert_eq!(
            composite(CompositeOp::Screen, [0, 0, 0, 255], dst),
            dst
        );
        // Half alpha lands halfway between backdrop and blended colour
        let half = source_over([0, 0, 0, 128], [200, 200, 200, 255]);
        assert!((half[0] as i32 - 100).abs() <= 1);
        assert_eq!(half[3], 255);
    }

    #[test]
    fn test_box_blur_constant_field() {
        let values = vec![0.4f32; 12 * 7];
        let out = box_blur(&values, 12, 7, 3);
        assert!(out.iter().all(|v| (v - 0.4).abs() < 1e-6));
    }

    #[test]
    fn test_box_blur_window() {
        let values = [0.0, 0.0, 9.0, 0.0, 0.0];
        let out = box_blur(&values, 5, 1, 1);
        assert!((out[0] - 0.0).abs() < 1e-6);
        assert!((out[1] - 3.0).abs() < 1e-6);
        assert!((out[2] - 3.0).abs() < 1e-6);
        assert!((out[3] - 3.0).abs() < 1e-6);
        assert!((out[4] - 0.0).abs() < 1e-6);
    }

    #[test]
    fn test_fold_map_detects_ridges_and_creases() {
        // Mid-grey fabric with a bright ridge at x=10 and a dark crease at x=30
        let canvas = RgbaImage::from_fn(40, 40, |x, _| match x {
            10 => Px([240, 240, 240, 255]),
            30 => Px([20, 20, 20, 255]),
            _ => Px([128, 128, 128, 255]),
        });
        let map = FoldMap::measure(&canvas, 0, 0, 40, 40, &BlendTuning::default());

        assert!(map.detail_at(10, 20) > 0.1);
        assert!(map.detail_at(30, 20) < -0.1);
        assert!(map.detail_at(20, 20).abs() < 1e-5);
        assert_eq!(map.detail_at(100, 100), 0.0);
        assert!((map.avg_lum() - 0.5).abs() < 0.05);
    }
}
