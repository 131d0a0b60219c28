//! Transform editing driven by pointer drags and keyboard nudges
//!
//! The preview is shown scaled to some display size, so pointer deltas
//! arrive in display pixels. Offsets are stored in percent of the mockup,
//! which makes the display size the only thing needed to convert.

use serde::{Deserialize, Serialize};

use crate::placement::{DesignBounds, Point, ProductType, Transform};

/// Smallest scale interactive resizing can reach
pub const MIN_SCALE: f64 = 0.1;
/// Keyboard nudge step in percent
pub const NUDGE_STEP: f64 = 0.5;
/// Keyboard nudge step with shift held
pub const NUDGE_STEP_COARSE: f64 = 5.0;

/// On-screen size of the rendered preview, in display pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DragMode {
    Move,
    Resize,
}

/// State captured when a drag begins
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragStart {
    pub mode: DragMode,
    /// Pointer position in display pixels
    pub pointer: Point,
    pub transform: Transform,
    /// Design bounds centre in display pixels
    pub center: Point,
    /// Pointer distance from `center`, floored at 1px
    pub distance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NudgeDirection {
    Left,
    Right,
    Up,
    Down,
}

/// Convert a display-pixel delta into percent of the mockup
pub fn display_delta_to_percent(dx: f64, dy: f64, viewport: Viewport) -> (f64, f64) {
    let px = if viewport.width > 0.0 {
        dx / viewport.width * 100.0
    } else {
        0.0
    };
    let py = if viewport.height > 0.0 {
        dy / viewport.height * 100.0
    } else {
        0.0
    };
    (px, py)
}

pub fn clamp_scale(scale: f64, product_type: ProductType) -> f64 {
    scale.clamp(MIN_SCALE, product_type.max_scale())
}

/// Capture the starting state of a drag.
///
/// `bounds` are the current design bounds in mockup pixels; they are mapped
/// into display space to find the resize centre.
pub fn begin_drag(
    mode: DragMode,
    pointer: Point,
    transform: Transform,
    bounds: &DesignBounds,
    viewport: Viewport,
) -> DragStart {
    let sx = if bounds.mockup_width > 0 {
        viewport.width / bounds.mockup_width as f64
    } else {
        1.0
    };
    let sy = if bounds.mockup_height > 0 {
        viewport.height / bounds.mockup_height as f64
    } else {
        1.0
    };
    let c = bounds.bounds().center();
    let center = Point::new(c.x * sx, c.y * sy);

    DragStart {
        mode,
        pointer,
        transform,
        center,
        distance: pointer.distance(center).max(1.0),
    }
}

/// Transform for the pointer's current position during a drag
pub fn drag_transform(
    start: &DragStart,
    pointer: Point,
    viewport: Viewport,
    product_type: ProductType,
) -> Transform {
    let mut t = start.transform;
    match start.mode {
        DragMode::Move => {
            let (dx, dy) = display_delta_to_percent(
                pointer.x - start.pointer.x,
                pointer.y - start.pointer.y,
                viewport,
            );
            t.offset_x = start.transform.offset_x + dx;
            t.offset_y = start.transform.offset_y + dy;
        }
        DragMode::Resize => {
            let distance = pointer.distance(start.center).max(1.0);
            t.scale = clamp_scale(start.transform.scale * distance / start.distance, product_type);
        }
    }
    t
}

/// Shift the offset by one keyboard step
pub fn nudge(transform: Transform, direction: NudgeDirection, coarse: bool) -> Transform {
    let step = if coarse { NUDGE_STEP_COARSE } else { NUDGE_STEP };
    let mut t = transform;
    match direction {
        NudgeDirection::Left => t.offset_x -= step,
        NudgeDirection::Right => t.offset_x += step,
        NudgeDirection::Up => t.offset_y -= step,
        NudgeDirection::Down => t.offset_y += step,
    }
    t
}

pub fn toggle_fill(transform: Transform) -> Transform {
    Transform {
        fill_mode: transform.fill_mode.toggled(),
        ..transform
    }
}

pub fn reset() -> Transform {
    Transform::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placement::FillMode;

    fn bounds() -> DesignBounds {
        DesignBounds {
            x: 200.0,
            y: 350.0,
            width: 600.0,
            height: 300.0,
            mockup_width: 1000,
            mockup_height: 1000,
        }
    }

    #[test]
    fn test_display_delta_to_percent() {
        let vp = Viewport::new(500.0, 250.0);
        assert_eq!(display_delta_to_percent(50.0, -25.0, vp), (10.0, -10.0));
        assert_eq!(display_delta_to_percent(5.0, 5.0, Viewport::new(0.0, 0.0)), (0.0, 0.0));
    }

    #[test]
    fn test_move_drag_accumulates_from_start() {
        let vp = Viewport::new(500.0, 500.0);
        let mut start_t = Transform::default();
        start_t.offset_x = 2.0;
        let start = begin_drag(DragMode::Move, Point::new(100.0, 100.0), start_t, &bounds(), vp);

        let t = drag_transform(&start, Point::new(150.0, 75.0), vp, ProductType::Poster);
        assert!((t.offset_x - 12.0).abs() < 1e-9);
        assert!((t.offset_y + 5.0).abs() < 1e-9);
        assert_eq!(t.scale, 1.0);

        // Returning to the start restores the original transform
        let t = drag_transform(&start, Point::new(100.0, 100.0), vp, ProductType::Poster);
        assert_eq!(t, start_t);
    }

    #[test]
    fn test_resize_drag_scales_by_distance_ratio() {
        // Display at half size: bounds centre (500,500) -> (250,250)
        let vp = Viewport::new(500.0, 500.0);
        let start = begin_drag(
            DragMode::Resize,
            Point::new(350.0, 250.0),
            Transform::default(),
            &bounds(),
            vp,
        );
        assert_eq!(start.center, Point::new(250.0, 250.0));
        assert_eq!(start.distance, 100.0);

        let t = drag_transform(&start, Point::new(400.0, 250.0), vp, ProductType::Clothing);
        assert!((t.scale - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_resize_clamps_per_product() {
        let vp = Viewport::new(1000.0, 1000.0);
        let start = begin_drag(
            DragMode::Resize,
            Point::new(510.0, 500.0),
            Transform::default(),
            &bounds(),
            vp,
        );

        let far = Point::new(1000.0, 500.0);
        assert_eq!(drag_transform(&start, far, vp, ProductType::Poster).scale, 2.5);
        assert_eq!(drag_transform(&start, far, vp, ProductType::Clothing).scale, 5.0);

        // Pointer on the centre floors the distance at 1px
        let t = drag_transform(&start, Point::new(500.0, 500.0), vp, ProductType::Clothing);
        assert_eq!(t.scale, MIN_SCALE);
    }

    #[test]
    fn test_resize_from_centre_uses_floor_distance() {
        let vp = Viewport::new(1000.0, 1000.0);
        let start = begin_drag(
            DragMode::Resize,
            Point::new(500.0, 500.0),
            Transform::default(),
            &bounds(),
            vp,
        );
        assert_eq!(start.distance, 1.0);
        let t = drag_transform(&start, Point::new(502.0, 500.0), vp, ProductType::Other);
        assert_eq!(t.scale, 2.0);
    }

    #[test]
    fn test_nudge() {
        let t = nudge(Transform::default(), NudgeDirection::Right, false);
        assert_eq!(t.offset_x, 0.5);
        let t = nudge(t, NudgeDirection::Up, true);
        assert_eq!(t.offset_y, -5.0);
        let t = nudge(t, NudgeDirection::Left, false);
        assert_eq!(t.offset_x, 0.0);
        let t = nudge(t, NudgeDirection::Down, true);
        assert_eq!(t.offset_y, 0.0);
    }

    #[test]
    fn test_toggle_and_reset() {
        let mut t = Transform::default();
        t.scale = 2.0;
        let toggled = toggle_fill(t);
        assert_eq!(toggled.fill_mode, FillMode::Fill);
        assert_eq!(toggled.scale, 2.0);
        assert_eq!(toggle_fill(toggled).fill_mode, FillMode::Fit);
        assert!(reset().is_default());
    }
}
