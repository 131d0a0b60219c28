//! Interactive preview session for one mockup/design pair
//!
//! A session owns the decoded images, the current transform and the
//! displayed canvas. Drags update the canvas through the fast preview,
//! coalesced to one render per frame. Once a drag ends, or shortly after
//! a keyboard edit, a full-fidelity render replaces the preview.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use image::RgbaImage;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cache::{ImageCache, ImagePair, ImageSource};
use crate::composite::{
    prepare_canvas, render_fast_preview, render_full_composite, CompositeRequest, RenderSettings,
};
use crate::error::Result;
use crate::interaction::{self, DragMode, DragStart, NudgeDirection, Viewport};
use crate::placement::{
    compute_design_bounds, DesignBounds, Placement, Point, ProductType, Size, Transform,
};
use crate::scheduler::{Debouncer, FrameSlot};

/// Template data that stays fixed for the life of a session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Template {
    pub placement: Placement,
    pub product_type: ProductType,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub settings: RenderSettings,
    /// Quiet period before a full render after a non-drag edit
    pub debounce: Duration,
    /// Cached image pairs
    pub cache_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            settings: RenderSettings::default(),
            debounce: Duration::from_millis(30),
            cache_capacity: 4,
        }
    }
}

#[derive(Debug)]
struct EditState {
    transform: Transform,
    drag: Option<DragStart>,
    viewport: Viewport,
}

pub struct PreviewSession {
    mockup: ImageSource,
    design: ImageSource,
    template: Template,
    settings: RenderSettings,
    cache: ImageCache,
    images: Arc<ImagePair>,
    /// Mockup at working resolution, the backdrop for fast previews
    base: RgbaImage,
    state: Mutex<EditState>,
    canvas: Mutex<RgbaImage>,
    frames: FrameSlot<Transform>,
    full_render: Debouncer,
    /// Held for the duration of a full render; at most one runs at a time
    render_gate: tokio::sync::Mutex<()>,
    /// Bumped on every transform change so stale full renders are dropped
    generation: AtomicU64,
    /// Generation of the last installed full render
    installed: AtomicU64,
    full_renders: AtomicUsize,
    preview_frames: AtomicUsize,
    last_error: Mutex<Option<String>>,
}

impl PreviewSession {
    /// Decode both images and perform the initial full render.
    pub async fn open(
        mockup: ImageSource,
        design: ImageSource,
        template: Template,
        options: SessionOptions,
    ) -> Result<Arc<Self>> {
        let cache = ImageCache::new(options.cache_capacity);
        let images = cache.load(&mockup, &design).await?;

        let request = CompositeRequest::new(template.placement, template.product_type);
        let canvas =
            render_full_composite(&cache, &mockup, &design, &request, &options.settings).await?;
        let base = prepare_canvas(&images.mockup, options.settings.min_resolution);

        info!(
            "Opened preview session {} | {} ({}x{})",
            mockup.id,
            design.id,
            canvas.width(),
            canvas.height()
        );

        let viewport = Viewport::new(canvas.width() as f64, canvas.height() as f64);
        Ok(Arc::new(Self {
            mockup,
            design,
            template,
            settings: options.settings,
            cache,
            images,
            base,
            state: Mutex::new(EditState {
                transform: Transform::default(),
                drag: None,
                viewport,
            }),
            canvas: Mutex::new(canvas),
            frames: FrameSlot::new(),
            full_render: Debouncer::new(options.debounce),
            render_gate: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
            installed: AtomicU64::new(0),
            full_renders: AtomicUsize::new(1),
            preview_frames: AtomicUsize::new(0),
            last_error: Mutex::new(None),
        }))
    }

    pub fn template(&self) -> Template {
        self.template
    }

    pub fn transform(&self) -> Transform {
        self.state.lock().transform
    }

    pub fn is_dragging(&self) -> bool {
        self.state.lock().drag.is_some()
    }

    /// Set the on-screen size the preview is displayed at
    pub fn set_viewport(&self, viewport: Viewport) {
        self.state.lock().viewport = viewport;
    }

    /// Snapshot of the displayed canvas
    pub fn canvas(&self) -> RgbaImage {
        self.canvas.lock().clone()
    }

    pub fn full_render_count(&self) -> usize {
        self.full_renders.load(Ordering::SeqCst)
    }

    pub fn preview_frame_count(&self) -> usize {
        self.preview_frames.load(Ordering::SeqCst)
    }

    /// Whether the canvas holds a full render of the current transform
    pub fn is_current(&self) -> bool {
        self.installed.load(Ordering::SeqCst) == self.generation.load(Ordering::SeqCst)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    /// Design bounds in original mockup pixels for the current transform
    pub fn design_bounds(&self) -> DesignBounds {
        let mockup = Size::new(self.images.mockup.width(), self.images.mockup.height());
        let design = Size::new(self.images.design.width(), self.images.design.height());
        compute_design_bounds(mockup, design, &self.template.placement, &self.transform())
    }

    /// Replace the transform outside of a drag; full render is debounced.
    pub fn set_transform(self: &Arc<Self>, transform: Transform) {
        self.state.lock().transform = transform;
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.schedule_full_render(false);
    }

    pub fn nudge(self: &Arc<Self>, direction: NudgeDirection, coarse: bool) {
        let t = interaction::nudge(self.transform(), direction, coarse);
        self.set_transform(t);
    }

    pub fn toggle_fill_mode(self: &Arc<Self>) {
        let t = interaction::toggle_fill(self.transform());
        self.set_transform(t);
    }

    pub fn reset_transform(self: &Arc<Self>) {
        self.set_transform(interaction::reset());
    }

    /// Start a move or resize drag at `pointer` (display pixels)
    pub fn begin_drag(&self, mode: DragMode, pointer: Point) {
        let bounds = self.design_bounds();
        let mut state = self.state.lock();
        let start = interaction::begin_drag(mode, pointer, state.transform, &bounds, state.viewport);
        state.drag = Some(start);
        drop(state);

        // Nothing full-fidelity should land mid-drag
        self.full_render.cancel();
        debug!("Drag started ({:?}) at {:?}", mode, pointer);
    }

    /// Update the drag and queue a fast preview frame.
    /// Returns the new transform, or `None` when no drag is active.
    pub fn drag_to(&self, pointer: Point) -> Option<Transform> {
        let mut state = self.state.lock();
        let start = state.drag?;
        let t = interaction::drag_transform(
            &start,
            pointer,
            state.viewport,
            self.template.product_type,
        );
        state.transform = t;
        drop(state);

        self.generation.fetch_add(1, Ordering::SeqCst);
        if self.frames.submit(t) {
            debug!("Coalesced preview frame");
        }
        Some(t)
    }

    /// Finish the drag and render at full fidelity right away
    pub fn end_drag(self: &Arc<Self>) {
        if self.state.lock().drag.take().is_some() {
            self.schedule_full_render(true);
        }
    }

    /// Render the latest queued preview frame, if any.
    /// Intended to be called once per display frame.
    pub fn render_frame(&self) -> bool {
        let Some(transform) = self.frames.take() else {
            return false;
        };

        let mut request = CompositeRequest::new(self.template.placement, self.template.product_type);
        request.transform = transform;

        let mut canvas = self.canvas.lock();
        render_fast_preview(&mut canvas, &self.base, &self.images.design, &request);
        self.preview_frames.fetch_add(1, Ordering::SeqCst);
        true
    }

    /// Render the current transform at full fidelity and install the result
    /// unless the transform changed while rendering. Waits for any full
    /// render already in flight.
    pub async fn render_full_now(&self) -> Result<()> {
        let _gate = self.render_gate.lock().await;
        self.render_full_locked().await
    }

    /// Debounced entry point: skipped when a later edit has already
    /// scheduled its own render or a drag has moved on.
    async fn render_full_if_current(&self, scheduled: u64) -> Result<()> {
        let _gate = self.render_gate.lock().await;
        if self.generation.load(Ordering::SeqCst) != scheduled {
            debug!("Skipping superseded full render");
            return Ok(());
        }
        self.render_full_locked().await
    }

    async fn render_full_locked(&self) -> Result<()> {
        let generation = self.generation.load(Ordering::SeqCst);
        let mut request = CompositeRequest::new(self.template.placement, self.template.product_type);
        request.transform = self.transform();

        let started = Instant::now();
        let result =
            render_full_composite(&self.cache, &self.mockup, &self.design, &request, &self.settings).await;

        match result {
            Ok(canvas) => {
                if self.install_full_render(generation, canvas) {
                    debug!("Full render installed in {:?}", started.elapsed());
                } else {
                    debug!("Discarding stale full render");
                }
                Ok(())
            }
            Err(e) => {
                warn!("Full render failed: {}", e);
                *self.last_error.lock() = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Replace the canvas with a full render made at `generation`.
    /// The check runs under the canvas lock so a preview frame for a newer
    /// transform is never overwritten.
    fn install_full_render(&self, generation: u64, canvas: RgbaImage) -> bool {
        let mut current = self.canvas.lock();
        if self.generation.load(Ordering::SeqCst) != generation {
            return false;
        }
        *current = canvas;
        drop(current);

        self.installed.store(generation, Ordering::SeqCst);
        *self.last_error.lock() = None;
        self.full_renders.fetch_add(1, Ordering::SeqCst);
        true
    }

    /// Drive [`render_frame`](Self::render_frame) at a fixed interval until
    /// the session is dropped.
    pub fn run_frame_loop(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(session) = weak.upgrade() else {
                    break;
                };
                session.render_frame();
            }
            debug!("Frame loop stopped");
        })
    }

    fn schedule_full_render(self: &Arc<Self>, immediate: bool) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let scheduled = self.generation.load(Ordering::SeqCst);
        let action = move || async move {
            if let Some(session) = weak.upgrade() {
                // Failures are recorded in last_error
                let _ = session.render_full_if_current(scheduled).await;
            }
        };

        if immediate {
            self.full_render.schedule_now(action);
        } else {
            self.full_render.schedule(action);
        }
    }
}
