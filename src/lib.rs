//! Perspective-correct compositing of flat designs onto product photos
//!
//! A design is mapped into a placement zone on a mockup photo through a
//! homography, then blended so it picks up the photo's lighting: shadows
//! on rigid prints, folds and fabric tone on clothing.

pub mod blend;
pub mod cache;
pub mod composite;
pub mod config;
pub mod detect;
pub mod error;
pub mod export;
pub mod homography;
pub mod interaction;
pub mod placement;
pub mod scheduler;
pub mod server;
pub mod session;
pub mod warp;

pub use blend::{BlendModel, BlendTuning};
pub use cache::{ImageCache, ImageSource};
pub use composite::{
    composite_full, render_fast_preview, render_full_composite, CompositeRequest, RenderSettings,
};
pub use error::{CompositeError, Result};
pub use homography::Homography;
pub use placement::{
    compute_design_bounds, compute_destination_points, DesignBounds, FillMode, Placement, Point,
    ProductType, QuadPlacement, RectPlacement, Transform,
};
pub use session::PreviewSession;
