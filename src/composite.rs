//! Full-fidelity and fast-preview composites of a design onto a mockup
//!
//! The full render upscales the working canvas to a minimum resolution,
//! clips to the placement polygon for rigid products and warps the design
//! with per-pixel blending. The fast preview skips the warp and stretches
//! the design into its axis-aligned bounding box with a canvas-style
//! multiply or screen, which is cheap enough to run on every drag frame.

use std::time::Instant;

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbaImage};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point as PolyPoint;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::blend::{composite, luminance, BlendTuning};
use crate::cache::{ImageCache, ImageSource};
use crate::error::{CompositeError, Result};
use crate::placement::{
    compute_destination_points, placement_polygon, Placement, Point, ProductType, Transform,
};
use crate::warp::{clamped_region, sample_bilinear, warp};

/// Default minimum long-edge resolution of the working canvas
pub const DEFAULT_MIN_RESOLUTION: u32 = 2400;

/// Everything about a render except the images themselves
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompositeRequest {
    pub placement: Placement,
    #[serde(default)]
    pub transform: Transform,
    #[serde(default)]
    pub product_type: ProductType,
    /// Overrides the product type's default clipping when set
    #[serde(default)]
    pub clip_to_placement: Option<bool>,
}

impl CompositeRequest {
    pub fn new(placement: Placement, product_type: ProductType) -> Self {
        Self {
            placement,
            transform: Transform::default(),
            product_type,
            clip_to_placement: None,
        }
    }

    pub fn clips(&self) -> bool {
        self.clip_to_placement
            .unwrap_or_else(|| self.product_type.clips_to_placement())
    }
}

/// Resolution and blend parameters for full renders
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSettings {
    pub min_resolution: u32,
    pub tuning: BlendTuning,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            min_resolution: DEFAULT_MIN_RESOLUTION,
            tuning: BlendTuning::default(),
        }
    }
}

/// Upscale factor so the long edge reaches `min_resolution` (never below 1)
pub fn working_scale(width: u32, height: u32, min_resolution: u32) -> f64 {
    let long_edge = width.max(height).max(1) as f64;
    (min_resolution as f64 / long_edge).max(1.0)
}

/// Working canvas holding the mockup at render resolution
pub fn prepare_canvas(mockup: &RgbaImage, min_resolution: u32) -> RgbaImage {
    let (w, h) = mockup.dimensions();
    let scale = working_scale(w, h, min_resolution);
    let target_w = (w as f64 * scale).round() as u32;
    let target_h = (h as f64 * scale).round() as u32;

    if (target_w, target_h) == (w, h) {
        mockup.clone()
    } else {
        debug!("Upscaling mockup {}x{} -> {}x{}", w, h, target_w, target_h);
        imageops::resize(mockup, target_w, target_h, FilterType::Triangle)
    }
}

/// Rasterize a clip polygon into a mask.
///
/// The polygon is clipped to the canvas first, so rasterizing costs no more
/// than the canvas area however far the placement reaches. A polygon that
/// collapses to fewer than three distinct pixel vertices yields an empty
/// mask, which hides the design layer entirely.
pub fn clip_mask(polygon: &[Point; 4], width: u32, height: u32) -> GrayImage {
    let mut mask = GrayImage::new(width, height);
    if width == 0 || height == 0 {
        return mask;
    }
    if polygon.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return mask;
    }

    let clipped = clip_to_rect(polygon, width as f64, height as f64);
    let mut poly: Vec<PolyPoint<i32>> = Vec::with_capacity(clipped.len());
    for p in &clipped {
        let vertex = PolyPoint::new(p.x.round() as i32, p.y.round() as i32);
        if poly.last() != Some(&vertex) {
            poly.push(vertex);
        }
    }
    while poly.len() > 1 && poly.first() == poly.last() {
        poly.pop();
    }
    if poly.len() < 3 {
        return mask;
    }

    draw_polygon_mut(&mut mask, &poly, Luma([255u8]));
    mask
}

/// Sutherland-Hodgman clip of a polygon against `[0, width] x [0, height]`
fn clip_to_rect(polygon: &[Point], width: f64, height: f64) -> Vec<Point> {
    // (clips x rather than y, boundary, keeps the side above the boundary)
    let edges = [
        (true, 0.0, true),
        (true, width, false),
        (false, 0.0, true),
        (false, height, false),
    ];

    let mut output = polygon.to_vec();
    for (vertical, bound, keep_above) in edges {
        let inside = |p: &Point| {
            let v = if vertical { p.x } else { p.y };
            if keep_above {
                v >= bound
            } else {
                v <= bound
            }
        };

        let input = std::mem::take(&mut output);
        let Some(&last) = input.last() else {
            break;
        };
        let mut prev = last;
        for &cur in &input {
            if inside(&cur) != inside(&prev) {
                output.push(edge_crossing(prev, cur, bound, vertical));
            }
            if inside(&cur) {
                output.push(cur);
            }
            prev = cur;
        }
    }
    output
}

/// Point where segment `a`-`b` crosses `x = bound` (vertical) or `y = bound`
fn edge_crossing(a: Point, b: Point, bound: f64, vertical: bool) -> Point {
    if vertical {
        let t = (bound - a.x) / (b.x - a.x);
        Point::new(bound, a.y + t * (b.y - a.y))
    } else {
        let t = (bound - a.y) / (b.y - a.y);
        Point::new(a.x + t * (b.x - a.x), bound)
    }
}

/// Render the full-fidelity composite from decoded images.
pub fn composite_full(
    mockup: &RgbaImage,
    design: &RgbaImage,
    request: &CompositeRequest,
    settings: &RenderSettings,
) -> RgbaImage {
    let started = Instant::now();
    let mut canvas = prepare_canvas(mockup, settings.min_resolution);
    let (w, h) = canvas.dimensions();

    if design.width() == 0 || design.height() == 0 {
        return canvas;
    }

    let design_aspect = design.width() as f64 / design.height() as f64;
    let dst = compute_destination_points(
        &request.placement,
        design_aspect,
        w as f64,
        h as f64,
        &request.transform,
    );

    let mask = request
        .clips()
        .then(|| clip_mask(&placement_polygon(&request.placement, w as f64, h as f64), w, h));

    let model = request.product_type.blend_model();
    match warp(&mut canvas, design, &dst, model, &settings.tuning, mask.as_ref()) {
        Some(stats) => debug!(
            "Warped {} pixels ({:?}) in {:?}",
            stats.written,
            model,
            started.elapsed()
        ),
        None => debug!("Design layer skipped; rendering mockup only"),
    }

    canvas
}

/// Decode (or reuse cached) images and render the full composite.
///
/// Decode failures propagate; degenerate geometry yields the mockup alone.
pub async fn render_full_composite(
    cache: &ImageCache,
    mockup: &ImageSource,
    design: &ImageSource,
    request: &CompositeRequest,
    settings: &RenderSettings,
) -> Result<RgbaImage> {
    let started = Instant::now();
    let pair = cache.load(mockup, design).await?;

    let request = *request;
    let settings = *settings;
    let canvas = tokio::task::spawn_blocking(move || {
        composite_full(&pair.mockup, &pair.design, &request, &settings)
    })
    .await
    .map_err(|e| CompositeError::Task(e.to_string()))?;

    info!(
        "Full composite {}x{} ({}) in {:?}",
        canvas.width(),
        canvas.height(),
        request.product_type.as_str(),
        started.elapsed()
    );
    Ok(canvas)
}

/// Cheap composite for interactive dragging.
///
/// Keeps the canvas size, redraws the mockup, and stretches the design
/// into the bounding box of its destination points without perspective.
pub fn render_fast_preview(
    canvas: &mut RgbaImage,
    mockup: &RgbaImage,
    design: &RgbaImage,
    request: &CompositeRequest,
) {
    let (w, h) = canvas.dimensions();
    if w == 0 || h == 0 {
        return;
    }

    if mockup.dimensions() == (w, h) {
        canvas.copy_from_slice(mockup.as_raw());
    } else {
        *canvas = imageops::resize(mockup, w, h, FilterType::Triangle);
    }

    let (dw, dh) = design.dimensions();
    if dw == 0 || dh == 0 {
        return;
    }

    let dst = compute_destination_points(
        &request.placement,
        dw as f64 / dh as f64,
        w as f64,
        h as f64,
        &request.transform,
    );
    let Some(region) = clamped_region(&dst, w, h) else {
        return;
    };

    let bx = dst.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
    let by = dst.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
    let bw = dst.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max) - bx;
    let bh = dst.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max) - by;
    if bw <= 0.0 || bh <= 0.0 {
        return;
    }

    let model = request.product_type.blend_model();
    let avg_lum = if model.reads_destination() {
        region_luminance(canvas, region.x, region.y, region.width, region.height)
    } else {
        0.5
    };
    let op = model.preview_op(avg_lum);

    let mask = request
        .clips()
        .then(|| clip_mask(&placement_polygon(&request.placement, w as f64, h as f64), w, h));

    for y in region.y..region.y + region.height {
        let v = (y as f64 + 0.5 - by) / bh * dh as f64 - 0.5;
        for x in region.x..region.x + region.width {
            if let Some(m) = &mask {
                if m.get_pixel(x, y).0[0] == 0 {
                    continue;
                }
            }
            let u = (x as f64 + 0.5 - bx) / bw * dw as f64 - 0.5;
            let sample = sample_bilinear(design, u, v);
            let src = sample.map(|c| c.round().clamp(0.0, 255.0) as u8);

            let px = canvas.get_pixel_mut(x, y);
            px.0 = composite(op, src, px.0);
        }
    }
}

/// Mean luminance (0-1) of a canvas region
fn region_luminance(canvas: &RgbaImage, x0: u32, y0: u32, width: u32, height: u32) -> f32 {
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for y in y0..y0 + height {
        for x in x0..x0 + width {
            let p = canvas.get_pixel(x, y).0;
            sum += luminance(p[0] as f32, p[1] as f32, p[2] as f32) as f64;
            count += 1;
        }
    }
    if count == 0 {
        0.5
    } else {
        (sum / count as f64) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{encode_canvas, ExportFormat};
    use crate::placement::{FillMode, QuadPlacement, RectPlacement};
    use image::Rgba;

    fn square_quad() -> Placement {
        Placement::Quad(QuadPlacement {
            tl: Point::new(20.0, 20.0),
            tr: Point::new(80.0, 20.0),
            br: Point::new(80.0, 80.0),
            bl: Point::new(20.0, 80.0),
        })
    }

    fn png(img: &RgbaImage) -> Vec<u8> {
        encode_canvas(img, ExportFormat::Png).unwrap()
    }

    #[test]
    fn test_working_scale() {
        assert_eq!(working_scale(600, 400, 2400), 4.0);
        assert_eq!(working_scale(3000, 2000, 2400), 1.0);
        assert_eq!(working_scale(2400, 10, 2400), 1.0);
    }

    #[test]
    fn test_prepare_canvas_upscales_low_res_mockups() {
        let mockup = RgbaImage::from_pixel(60, 40, Rgba([255, 255, 255, 255]));
        let canvas = prepare_canvas(&mockup, 240);
        assert_eq!(canvas.dimensions(), (240, 160));

        let canvas = prepare_canvas(&mockup, 10);
        assert_eq!(canvas.dimensions(), (60, 40));
    }

    #[test]
    fn test_clip_mask_covers_polygon() {
        let poly = [
            Point::new(10.0, 10.0),
            Point::new(30.0, 10.0),
            Point::new(30.0, 30.0),
            Point::new(10.0, 30.0),
        ];
        let mask = clip_mask(&poly, 40, 40);
        assert_eq!(mask.get_pixel(20, 20).0[0], 255);
        assert_eq!(mask.get_pixel(5, 5).0[0], 0);
        assert_eq!(mask.get_pixel(35, 20).0[0], 0);
    }

    #[test]
    fn test_clip_mask_degenerate_polygon_is_empty() {
        let poly = [Point::new(12.2, 7.9); 4];
        let mask = clip_mask(&poly, 20, 20);
        assert!(mask.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn test_clip_mask_far_beyond_canvas_fills_it() {
        let poly = [
            Point::new(-1e9, -1e9),
            Point::new(1e9, -1e9),
            Point::new(1e9, 1e9),
            Point::new(-1e9, 1e9),
        ];
        let mask = clip_mask(&poly, 100, 100);
        assert!(mask.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn test_clip_mask_partially_off_canvas() {
        let poly = [
            Point::new(-1e8, -1e8),
            Point::new(20.0, -1e8),
            Point::new(20.0, 20.0),
            Point::new(-1e8, 20.0),
        ];
        let mask = clip_mask(&poly, 100, 100);
        assert_eq!(mask.get_pixel(0, 0).0[0], 255);
        assert_eq!(mask.get_pixel(15, 15).0[0], 255);
        assert_eq!(mask.get_pixel(30, 10).0[0], 0);
        assert_eq!(mask.get_pixel(10, 30).0[0], 0);
    }

    #[test]
    fn test_clip_mask_entirely_off_canvas_is_empty() {
        let poly = [
            Point::new(1e6, 1e6),
            Point::new(2e6, 1e6),
            Point::new(2e6, 2e6),
            Point::new(1e6, 2e6),
        ];
        let mask = clip_mask(&poly, 50, 50);
        assert!(mask.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn test_clip_to_rect_bounds_vertices() {
        let poly = [
            Point::new(-40.0, 50.0),
            Point::new(50.0, -40.0),
            Point::new(140.0, 50.0),
            Point::new(50.0, 140.0),
        ];
        let clipped = clip_to_rect(&poly, 100.0, 100.0);
        assert_eq!(clipped.len(), 8);
        for p in &clipped {
            assert!((0.0..=100.0).contains(&p.x));
            assert!((0.0..=100.0).contains(&p.y));
        }
        assert!(clipped.contains(&Point::new(0.0, 10.0)));
        assert!(clipped.contains(&Point::new(0.0, 90.0)));
    }

    #[test]
    fn test_full_composite_end_to_end() {
        // 1000x1000 white mockup, 2:1 red design, square quad placement
        let mockup = RgbaImage::from_pixel(1000, 1000, Rgba([255, 255, 255, 255]));
        let design = RgbaImage::from_pixel(300, 150, Rgba([200, 30, 30, 255]));
        let request = CompositeRequest::new(square_quad(), ProductType::Poster);
        let settings = RenderSettings {
            min_resolution: 1000,
            ..RenderSettings::default()
        };

        let canvas = composite_full(&mockup, &design, &request, &settings);
        assert_eq!(canvas.dimensions(), (1000, 1000));

        // Fitted quad spans (200,350)-(800,650)
        assert_eq!(canvas.get_pixel(500, 500).0, [200, 30, 30, 255]);
        assert_eq!(canvas.get_pixel(210, 360).0, [200, 30, 30, 255]);
        assert_eq!(canvas.get_pixel(500, 300).0, [255, 255, 255, 255]);
        assert_eq!(canvas.get_pixel(500, 700).0, [255, 255, 255, 255]);
        assert_eq!(canvas.get_pixel(100, 500).0, [255, 255, 255, 255]);
    }

    #[test]
    fn test_full_composite_clips_to_placement() {
        let mockup = RgbaImage::from_pixel(200, 200, Rgba([255, 255, 255, 255]));
        let design = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 200, 255]));
        let mut request = CompositeRequest::new(square_quad(), ProductType::WallArt);
        request.transform.scale = 1.5;
        let settings = RenderSettings {
            min_resolution: 200,
            ..RenderSettings::default()
        };

        let clipped = composite_full(&mockup, &design, &request, &settings);
        // Scaled design reaches (10,10) but the zone starts at (40,40)
        assert_eq!(clipped.get_pixel(30, 100).0, [255, 255, 255, 255]);
        assert_eq!(clipped.get_pixel(100, 100).0, [0, 0, 200, 255]);

        request.clip_to_placement = Some(false);
        let unclipped = composite_full(&mockup, &design, &request, &settings);
        assert_eq!(unclipped.get_pixel(30, 100).0, [0, 0, 200, 255]);
    }

    #[test]
    fn test_full_composite_with_collapsed_placement_is_mockup_only() {
        let mockup = RgbaImage::from_pixel(50, 50, Rgba([9, 8, 7, 255]));
        let design = RgbaImage::from_pixel(10, 10, Rgba([200, 0, 0, 255]));
        let collapsed = Placement::Quad(QuadPlacement {
            tl: Point::new(10.0, 10.0),
            tr: Point::new(30.0, 30.0),
            br: Point::new(50.0, 50.0),
            bl: Point::new(70.0, 70.0),
        });
        let request = CompositeRequest::new(collapsed, ProductType::Poster);
        let settings = RenderSettings {
            min_resolution: 50,
            ..RenderSettings::default()
        };

        let canvas = composite_full(&mockup, &design, &request, &settings);
        assert_eq!(canvas, mockup);
    }

    #[test]
    fn test_fabric_composite_on_dark_shirt_lightens() {
        let mockup = RgbaImage::from_pixel(100, 100, Rgba([20, 20, 20, 255]));
        let design = RgbaImage::from_pixel(10, 10, Rgba([220, 220, 220, 255]));
        let rect = Placement::Rect(RectPlacement {
            x: 25.0,
            y: 25.0,
            width: 50.0,
            height: 50.0,
        });
        let request = CompositeRequest::new(rect, ProductType::Clothing);
        let settings = RenderSettings {
            min_resolution: 100,
            ..RenderSettings::default()
        };

        let canvas = composite_full(&mockup, &design, &request, &settings);
        let center = canvas.get_pixel(50, 50).0;
        // Screen blend keeps a light design visible on dark fabric
        assert!(center[0] > 150, "got {:?}", center);
        assert_eq!(canvas.get_pixel(5, 5).0, [20, 20, 20, 255]);
    }

    #[test]
    fn test_fast_preview_stretches_into_bounds() {
        let mockup = RgbaImage::from_pixel(100, 100, Rgba([255, 255, 255, 255]));
        let design = RgbaImage::from_pixel(20, 10, Rgba([100, 150, 200, 255]));
        let mut request = CompositeRequest::new(square_quad(), ProductType::Poster);
        request.transform.fill_mode = FillMode::Fill;

        let mut canvas = RgbaImage::new(100, 100);
        render_fast_preview(&mut canvas, &mockup, &design, &request);

        // Multiply over white leaves the design colour
        assert_eq!(canvas.get_pixel(50, 50).0, [100, 150, 200, 255]);
        assert_eq!(canvas.get_pixel(10, 10).0, [255, 255, 255, 255]);
    }

    #[test]
    fn test_fast_preview_keeps_canvas_size() {
        let mockup = RgbaImage::from_pixel(50, 50, Rgba([128, 128, 128, 255]));
        let design = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 255]));
        let request = CompositeRequest::new(square_quad(), ProductType::Other);

        let mut canvas = RgbaImage::new(200, 200);
        render_fast_preview(&mut canvas, &mockup, &design, &request);
        assert_eq!(canvas.dimensions(), (200, 200));
        assert_eq!(canvas.get_pixel(100, 100).0, [0, 0, 0, 255]);
        assert_eq!(canvas.get_pixel(5, 5).0, [128, 128, 128, 255]);
    }

    #[tokio::test]
    async fn test_render_full_composite_decodes_through_cache() {
        let cache = ImageCache::new(2);
        let mockup = ImageSource::new(
            "mockup.png",
            png(&RgbaImage::from_pixel(40, 40, Rgba([255, 255, 255, 255]))),
        );
        let design = ImageSource::new(
            "design.png",
            png(&RgbaImage::from_pixel(4, 4, Rgba([10, 10, 10, 255]))),
        );
        let request = CompositeRequest::new(square_quad(), ProductType::Poster);

        let settings = RenderSettings {
            min_resolution: 400,
            ..RenderSettings::default()
        };

        let canvas = render_full_composite(&cache, &mockup, &design, &request, &settings)
            .await
            .unwrap();
        assert_eq!(canvas.dimensions(), (400, 400));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_render_full_composite_reports_decode_errors() {
        let cache = ImageCache::new(2);
        let mockup = ImageSource::new("bad", vec![0u8; 16]);
        let design = ImageSource::new(
            "design.png",
            png(&RgbaImage::from_pixel(4, 4, Rgba([10, 10, 10, 255]))),
        );
        let request = CompositeRequest::new(square_quad(), ProductType::Poster);

        let result =
            render_full_composite(&cache, &mockup, &design, &request, &RenderSettings::default()).await;
        assert!(matches!(result, Err(CompositeError::Decode { .. })));
    }
}
