//! Placement zones, per-render transforms, and destination geometry
//!
//! Placements are stored in percent-of-mockup coordinates (0-100) so they
//! stay valid at any render resolution. Every render converts the stored
//! placement plus the session transform into exactly four pixel-space
//! destination points (top-left, top-right, bottom-right, bottom-left).

use serde::{Deserialize, Serialize};

use crate::blend::BlendModel;

/// A 2D point. Percent or pixel units depending on context.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Convert a percent point (0-100) to pixel coordinates
    pub fn percent_to_pixels(&self, width: f64, height: f64) -> Self {
        Self {
            x: self.x / 100.0 * width,
            y: self.y / 100.0 * height,
        }
    }

    pub fn distance(&self, other: Point) -> f64 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt()
    }

    fn midpoint(&self, other: Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

/// Four named corners of a perspective placement, in percent
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct QuadPlacement {
    pub tl: Point,
    pub tr: Point,
    pub br: Point,
    pub bl: Point,
}

/// Axis-aligned placement zone, in percent
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RectPlacement {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Where a design sits on a mockup template
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Placement {
    /// Perspective placement used by wall-art and poster templates
    Quad(QuadPlacement),
    /// Legacy rectangle used by clothing and accessory templates
    Rect(RectPlacement),
}

/// How the design fills its placement zone
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(from = "String", into = "String")]
pub enum FillMode {
    /// Preserve the design's aspect ratio inside the zone
    #[default]
    Fit,
    /// Stretch the design to exactly cover the zone
    Fill,
}

impl From<String> for FillMode {
    fn from(value: String) -> Self {
        if value == "fill" {
            FillMode::Fill
        } else {
            FillMode::Fit
        }
    }
}

impl From<FillMode> for String {
    fn from(mode: FillMode) -> Self {
        match mode {
            FillMode::Fit => "fit".to_string(),
            FillMode::Fill => "fill".to_string(),
        }
    }
}

impl FillMode {
    pub fn toggled(self) -> Self {
        match self {
            FillMode::Fit => FillMode::Fill,
            FillMode::Fill => FillMode::Fit,
        }
    }
}

/// Transient per-session adjustment layered on top of a placement
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Transform {
    /// Size multiplier around the placement centroid
    pub scale: f64,
    /// Horizontal translation in percent of mockup width
    pub offset_x: f64,
    /// Vertical translation in percent of mockup height
    pub offset_y: f64,
    pub fill_mode: FillMode,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
            fill_mode: FillMode::Fit,
        }
    }
}

impl Transform {
    pub fn is_default(&self) -> bool {
        *self == Transform::default()
    }
}

/// Kind of product photographed by a mockup template
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(from = "String", into = "String")]
pub enum ProductType {
    WallArt,
    #[default]
    Poster,
    Clothing,
    Accessories,
    /// Anything unrecognised; composites without realism blending
    Other,
}

impl From<String> for ProductType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "wall-art" => ProductType::WallArt,
            "poster" => ProductType::Poster,
            "clothing" => ProductType::Clothing,
            "accessories" => ProductType::Accessories,
            _ => ProductType::Other,
        }
    }
}

impl From<ProductType> for String {
    fn from(product: ProductType) -> Self {
        product.as_str().to_string()
    }
}

impl ProductType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::WallArt => "wall-art",
            ProductType::Poster => "poster",
            ProductType::Clothing => "clothing",
            ProductType::Accessories => "accessories",
            ProductType::Other => "other",
        }
    }

    /// Rigid products are clipped to their placement polygon
    pub fn clips_to_placement(&self) -> bool {
        matches!(self, ProductType::WallArt | ProductType::Poster)
    }

    pub fn blend_model(&self) -> BlendModel {
        match self {
            ProductType::WallArt | ProductType::Poster => BlendModel::ShadowMultiply,
            ProductType::Clothing | ProductType::Accessories => BlendModel::AdaptiveFabric,
            ProductType::Other => BlendModel::Normal,
        }
    }

    /// Upper bound for interactive scaling
    pub fn max_scale(&self) -> f64 {
        match self {
            ProductType::Poster => 2.5,
            _ => 5.0,
        }
    }
}

/// Axis-aligned rectangle in pixels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Bounding box of the design in mockup pixels, used to place drag handles
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DesignBounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub mockup_width: u32,
    pub mockup_height: u32,
}

impl DesignBounds {
    pub fn bounds(&self) -> Bounds {
        Bounds {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }
}

/// Pixel dimensions of an image
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

/// The raw placement zone in pixels, with no transform applied.
/// This is the clip polygon for rigid products.
pub fn placement_polygon(placement: &Placement, width: f64, height: f64) -> [Point; 4] {
    match placement {
        Placement::Quad(q) => [
            q.tl.percent_to_pixels(width, height),
            q.tr.percent_to_pixels(width, height),
            q.br.percent_to_pixels(width, height),
            q.bl.percent_to_pixels(width, height),
        ],
        Placement::Rect(r) => {
            let x = r.x / 100.0 * width;
            let y = r.y / 100.0 * height;
            let w = r.width / 100.0 * width;
            let h = r.height / 100.0 * height;
            rect_points(x, y, w, h)
        }
    }
}

/// Compute the four pixel-space destination points for a design.
///
/// Degenerate zones (zero width or height, zero scale) produce collapsed
/// points rather than an error; the renderer skips them.
pub fn compute_destination_points(
    placement: &Placement,
    design_aspect: f64,
    mockup_width: f64,
    mockup_height: f64,
    transform: &Transform,
) -> [Point; 4] {
    let ox = transform.offset_x / 100.0 * mockup_width;
    let oy = transform.offset_y / 100.0 * mockup_height;

    match placement {
        Placement::Quad(_) => {
            let raw = placement_polygon(placement, mockup_width, mockup_height);
            let fitted = match transform.fill_mode {
                FillMode::Fill => raw,
                FillMode::Fit => fit_quad(raw, design_aspect),
            };

            let c = centroid(&fitted);
            fitted.map(|p| {
                Point::new(
                    c.x + (p.x - c.x) * transform.scale + ox,
                    c.y + (p.y - c.y) * transform.scale + oy,
                )
            })
        }
        Placement::Rect(r) => {
            let orig_w = r.width / 100.0 * mockup_width;
            let orig_h = r.height / 100.0 * mockup_height;
            let orig_x = r.x / 100.0 * mockup_width;
            let orig_y = r.y / 100.0 * mockup_height;

            let zone_w = orig_w * transform.scale;
            let zone_h = orig_h * transform.scale;
            let zone_x = orig_x + (orig_w - zone_w) / 2.0;
            let zone_y = orig_y + (orig_h - zone_h) / 2.0;

            let (draw_x, draw_y, draw_w, draw_h) = match transform.fill_mode {
                FillMode::Fill => (zone_x, zone_y, zone_w, zone_h),
                FillMode::Fit => {
                    let zone_aspect = zone_w / zone_h;
                    if design_aspect > zone_aspect {
                        let h = zone_w / design_aspect;
                        (zone_x, zone_y + (zone_h - h) / 2.0, zone_w, h)
                    } else {
                        let w = zone_h * design_aspect;
                        (zone_x + (zone_w - w) / 2.0, zone_y, w, zone_h)
                    }
                }
            };

            rect_points(draw_x + ox, draw_y + oy, draw_w, draw_h)
        }
    }
}

/// Axis-aligned bounding box of the design in mockup pixels
pub fn compute_design_bounds(
    mockup: Size,
    design: Size,
    placement: &Placement,
    transform: &Transform,
) -> DesignBounds {
    let points = compute_destination_points(
        placement,
        design.aspect(),
        mockup.width as f64,
        mockup.height as f64,
        transform,
    );
    let b = bounding_box(&points);

    DesignBounds {
        x: b.x,
        y: b.y,
        width: b.width,
        height: b.height,
        mockup_width: mockup.width,
        mockup_height: mockup.height,
    }
}

pub fn bounding_box(points: &[Point]) -> Bounds {
    let min_x = points.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
    let max_x = points.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
    let min_y = points.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
    let max_y = points.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);

    Bounds {
        x: min_x,
        y: min_y,
        width: max_x - min_x,
        height: max_y - min_y,
    }
}

pub fn centroid(points: &[Point; 4]) -> Point {
    Point::new(
        points.iter().map(|p| p.x).sum::<f64>() / 4.0,
        points.iter().map(|p| p.y).sum::<f64>() / 4.0,
    )
}

/// Effective (width, height) of a quad: averaged opposite edge lengths
pub fn quad_dimensions(q: &[Point; 4]) -> (f64, f64) {
    let top = q[0].distance(q[1]);
    let bottom = q[3].distance(q[2]);
    let left = q[0].distance(q[3]);
    let right = q[1].distance(q[2]);
    ((top + bottom) / 2.0, (left + right) / 2.0)
}

fn rect_points(x: f64, y: f64, w: f64, h: f64) -> [Point; 4] {
    [
        Point::new(x, y),
        Point::new(x + w, y),
        Point::new(x + w, y + h),
        Point::new(x, y + h),
    ]
}

/// Shrink a quad symmetrically so its effective aspect matches the design.
///
/// Opposite edges are pulled toward the quad's midline, anchored on edge
/// midpoints, so the perspective shape is preserved.
fn fit_quad(raw: [Point; 4], design_aspect: f64) -> [Point; 4] {
    let (quad_w, quad_h) = quad_dimensions(&raw);
    let quad_aspect = quad_w / quad_h;

    if design_aspect > quad_aspect {
        // Wider design: move top and bottom edges inward
        let fit_h = quad_w / design_aspect;
        let t = if quad_h > 0.0 { fit_h / quad_h } else { 1.0 };
        let mid_top = raw[0].midpoint(raw[1]);
        let mid_bottom = raw[3].midpoint(raw[2]);
        let mid = mid_top.midpoint(mid_bottom);

        let mut fitted = raw;
        for (i, p) in fitted.iter_mut().enumerate() {
            let anchor = if i <= 1 { mid_top } else { mid_bottom };
            p.x += (mid.x - anchor.x) * (1.0 - t);
            p.y += (mid.y - anchor.y) * (1.0 - t);
        }
        fitted
    } else if design_aspect < quad_aspect {
        // Taller design: move left and right edges inward
        let fit_w = quad_h * design_aspect;
        let t = if quad_w > 0.0 { fit_w / quad_w } else { 1.0 };
        let mid_left = raw[0].midpoint(raw[3]);
        let mid_right = raw[1].midpoint(raw[2]);
        let mid = mid_left.midpoint(mid_right);

        let mut fitted = raw;
        for (i, p) in fitted.iter_mut().enumerate() {
            let anchor = if i == 0 || i == 3 { mid_left } else { mid_right };
            p.x += (mid.x - anchor.x) * (1.0 - t);
            p.y += (mid.y - anchor.y) * (1.0 - t);
        }
        fitted
    } else {
        raw
    }
}
