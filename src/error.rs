//! Error types for the compositing engine
//!
//! Degenerate geometry is not an error: renders silently skip the design
//! layer. Only image decode/encode and task failures surface here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompositeError {
    /// Source bytes could not be decoded as an image
    #[error("failed to decode image {id}: {source}")]
    Decode {
        id: String,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to encode image: {0}")]
    Encode(#[from] image::ImageError),

    /// A blocking render or decode task failed to complete
    #[error("render task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, CompositeError>;
