//! HTTP API for the compositing engine

use anyhow::Result;
use arc_swap::ArcSwap;
use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::RgbaImage;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::blend::BlendTuning;
use crate::cache::{ImageCache, ImageSource};
use crate::composite::{render_fast_preview, render_full_composite, CompositeRequest, RenderSettings};
use crate::config::Config;
use crate::detect::detect_placement;
use crate::error::CompositeError;
use crate::export::{encode_canvas, export_filename, ExportFormat};
use crate::placement::{compute_design_bounds, DesignBounds, Placement, Point, Size, Transform};
use crate::session::SessionOptions;

/// Uploaded images arrive base64-encoded inside JSON bodies
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Shared application state
pub struct AppState {
    pub config: RwLock<Config>,
    /// Path to save configuration
    config_path: PathBuf,
    /// Blend tuning, swapped atomically on update
    tuning: ArcSwap<BlendTuning>,
    /// Decoded images shared across requests
    cache: ImageCache,
}

impl AppState {
    pub fn new(config: Config, config_path: PathBuf) -> Self {
        Self {
            tuning: ArcSwap::from_pointee(config.blend),
            cache: ImageCache::new(config.render.cache_capacity),
            config: RwLock::new(config),
            config_path,
        }
    }

    pub fn tuning(&self) -> BlendTuning {
        **self.tuning.load()
    }

    pub fn render_settings(&self) -> RenderSettings {
        RenderSettings {
            min_resolution: self.config.read().render.min_resolution,
            tuning: self.tuning(),
        }
    }

    /// Options for interactive preview sessions, with the live blend tuning
    pub fn session_options(&self) -> SessionOptions {
        let mut options = self.config.read().session_options();
        options.settings.tuning = self.tuning();
        options
    }

    /// Replace the live blend tuning and persist it
    pub fn update_tuning(&self, tuning: BlendTuning) -> Result<()> {
        self.tuning.store(Arc::new(tuning));
        let mut config = self.config.write();
        config.blend = tuning;
        config.save(&self.config_path)
    }
}

/// Run the web server
pub async fn run_server(addr: &str, state: Arc<AppState>) -> Result<()> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/info", get(get_info))
        .route("/api/composite", post(composite))
        .route("/api/preview", post(preview))
        .route("/api/bounds", post(bounds))
        .route("/api/detect", post(detect))
        .route("/api/settings", get(get_settings).put(put_settings))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Web server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Base64 image payload, optionally as a data URL
#[derive(Debug, Deserialize)]
struct EncodedImage {
    /// Stable identity for caching; derived from the bytes when absent
    #[serde(default)]
    id: Option<String>,
    data: String,
}

impl EncodedImage {
    fn into_source(self) -> std::result::Result<ImageSource, Response> {
        let payload = match self.data.split_once(";base64,") {
            Some((_, rest)) => rest,
            None => self.data.as_str(),
        };
        let bytes = STANDARD.decode(payload.trim()).map_err(|e| {
            (StatusCode::BAD_REQUEST, format!("Invalid base64 image: {}", e)).into_response()
        })?;

        let id = self.id.unwrap_or_else(|| {
            let mut hasher = DefaultHasher::new();
            bytes.hash(&mut hasher);
            format!("upload-{:016x}", hasher.finish())
        });
        Ok(ImageSource::new(id, bytes))
    }
}

fn error_response(e: CompositeError) -> Response {
    let status = match e {
        CompositeError::Decode { .. } => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string()).into_response()
}

async fn encode_response(
    canvas: RgbaImage,
    format: ExportFormat,
    filename: Option<String>,
) -> Response {
    let encoded = tokio::task::spawn_blocking(move || encode_canvas(&canvas, format)).await;
    let bytes = match encoded {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(e)) => return error_response(e),
        Err(e) => return error_response(CompositeError::Task(e.to_string())),
    };

    let mut headers = vec![(header::CONTENT_TYPE, format.content_type().to_string())];
    if let Some(name) = filename {
        headers.push((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", name),
        ));
    }

    let mut response = bytes.into_response();
    for (name, value) in headers {
        if let Ok(value) = value.parse() {
            response.headers_mut().insert(name, value);
        }
    }
    response
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenderBody {
    mockup: EncodedImage,
    design: EncodedImage,
    #[serde(flatten)]
    request: CompositeRequest,
    /// Mockup display name used for the download filename
    #[serde(default)]
    mockup_name: Option<String>,
    /// Explicit output filename; its extension picks the format
    #[serde(default)]
    filename: Option<String>,
}

/// Full-fidelity composite, encoded for download
async fn composite(State(state): State<Arc<AppState>>, Json(body): Json<RenderBody>) -> Response {
    let mockup = match body.mockup.into_source() {
        Ok(source) => source,
        Err(response) => return response,
    };
    let design = match body.design.into_source() {
        Ok(source) => source,
        Err(response) => return response,
    };

    let settings = state.render_settings();
    let canvas =
        match render_full_composite(&state.cache, &mockup, &design, &body.request, &settings).await {
            Ok(canvas) => canvas,
            Err(e) => return error_response(e),
        };

    let filename = body
        .filename
        .unwrap_or_else(|| export_filename(body.mockup_name.as_deref().unwrap_or("composite")));
    let quality = state.config.read().export.jpeg_quality;
    let format = ExportFormat::from_filename(&filename, quality);

    encode_response(canvas, format, Some(filename)).await
}

/// Fast approximate preview at the mockup's native size, as PNG
async fn preview(State(state): State<Arc<AppState>>, Json(body): Json<RenderBody>) -> Response {
    let mockup = match body.mockup.into_source() {
        Ok(source) => source,
        Err(response) => return response,
    };
    let design = match body.design.into_source() {
        Ok(source) => source,
        Err(response) => return response,
    };

    let pair = match state.cache.load(&mockup, &design).await {
        Ok(pair) => pair,
        Err(e) => return error_response(e),
    };

    let request = body.request;
    let rendered = tokio::task::spawn_blocking(move || {
        let mut canvas = RgbaImage::new(pair.mockup.width(), pair.mockup.height());
        render_fast_preview(&mut canvas, &pair.mockup, &pair.design, &request);
        canvas
    })
    .await;

    match rendered {
        Ok(canvas) => encode_response(canvas, ExportFormat::Png, None).await,
        Err(e) => error_response(CompositeError::Task(e.to_string())),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BoundsBody {
    mockup: Size,
    design: Size,
    placement: Placement,
    #[serde(default)]
    transform: Transform,
}

/// Design bounding box in mockup pixels, for drawing drag handles
async fn bounds(Json(body): Json<BoundsBody>) -> Json<DesignBounds> {
    Json(compute_design_bounds(
        body.mockup,
        body.design,
        &body.placement,
        &body.transform,
    ))
}

#[derive(Deserialize)]
struct DetectBody {
    image: EncodedImage,
    /// Click position in percent of the image
    x: f64,
    y: f64,
}

/// Detect a placement quad from a click on the mockup
async fn detect(Json(body): Json<DetectBody>) -> Response {
    let source = match body.image.into_source() {
        Ok(source) => source,
        Err(response) => return response,
    };

    let click = Point::new(body.x, body.y);
    let detected = tokio::task::spawn_blocking(move || {
        crate::cache::decode(&source).map(|image| detect_placement(&image, click))
    })
    .await;

    match detected {
        Ok(Ok(Some(quad))) => Json(Placement::Quad(quad)).into_response(),
        Ok(Ok(None)) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "Click is outside the image").into_response()
        }
        Ok(Err(e)) => error_response(e),
        Err(e) => error_response(CompositeError::Task(e.to_string())),
    }
}

/// Get the live blend tuning
async fn get_settings(State(state): State<Arc<AppState>>) -> Json<BlendTuning> {
    Json(state.tuning())
}

/// Replace the blend tuning and save it to the config file
async fn put_settings(
    State(state): State<Arc<AppState>>,
    Json(tuning): Json<BlendTuning>,
) -> impl IntoResponse {
    match state.update_tuning(tuning) {
        Ok(_) => (StatusCode::OK, "Saved").into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// System information response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InfoResponse {
    version: String,
    min_resolution: u32,
    cached_pairs: usize,
    jpeg_quality: u8,
    /// Preview session timing for interactive clients
    debounce_ms: u64,
    frame_interval_ms: u64,
}

/// Get system information
async fn get_info(State(state): State<Arc<AppState>>) -> Json<InfoResponse> {
    let session = state.session_options();
    let config = state.config.read();

    Json(InfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        min_resolution: session.settings.min_resolution,
        cached_pairs: state.cache.len(),
        jpeg_quality: config.export.jpeg_quality,
        debounce_ms: session.debounce.as_millis() as u64,
        frame_interval_ms: config.render.frame_interval().as_millis() as u64,
    })
}
