//! Decoded image cache keyed by (mockup source, design source)
//!
//! Interactive previews re-render many times per second from the same pair
//! of images, so decoded pixels are kept in a size-bounded LRU. The cache
//! is owned by whoever renders (a preview session or the HTTP state) and
//! is dropped with it.

use std::num::NonZeroUsize;
use std::sync::Arc;

use image::RgbaImage;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{CompositeError, Result};

/// Encoded image bytes handed in by the caller, with a stable identity
#[derive(Debug, Clone)]
pub struct ImageSource {
    /// Identity used for caching (a URL, upload id, or content hash)
    pub id: String,
    pub bytes: Arc<[u8]>,
}

impl ImageSource {
    pub fn new(id: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            id: id.into(),
            bytes: bytes.into(),
        }
    }
}

/// A decoded mockup and design, ready for compositing
#[derive(Debug, Clone)]
pub struct ImagePair {
    pub mockup: Arc<RgbaImage>,
    pub design: Arc<RgbaImage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PairKey {
    mockup_id: String,
    design_id: String,
}

impl PairKey {
    fn new(mockup_id: &str, design_id: &str) -> Self {
        Self {
            mockup_id: mockup_id.to_string(),
            design_id: design_id.to_string(),
        }
    }
}

/// Size-bounded LRU of decoded image pairs
pub struct ImageCache {
    entries: Mutex<LruCache<PairKey, Arc<ImagePair>>>,
}

impl ImageCache {
    /// Create a cache holding at most `capacity` pairs (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, mockup_id: &str, design_id: &str) -> Option<Arc<ImagePair>> {
        self.entries.lock().get(&PairKey::new(mockup_id, design_id)).cloned()
    }

    /// Insert a pair unless one is already cached for the key.
    /// Returns the entry that ends up cached.
    pub fn insert(&self, mockup_id: &str, design_id: &str, pair: ImagePair) -> Arc<ImagePair> {
        let mut entries = self.entries.lock();
        entries
            .get_or_insert(PairKey::new(mockup_id, design_id), || Arc::new(pair))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Fetch a decoded pair, decoding both images in parallel on a miss.
    ///
    /// Decode failures are returned to the caller and never cached.
    pub async fn load(&self, mockup: &ImageSource, design: &ImageSource) -> Result<Arc<ImagePair>> {
        if let Some(pair) = self.get(&mockup.id, &design.id) {
            debug!("Image cache hit: {} | {}", mockup.id, design.id);
            return Ok(pair);
        }

        debug!("Image cache miss: {} | {}", mockup.id, design.id);
        let (mockup_img, design_img) =
            futures::future::try_join(decode_blocking(mockup.clone()), decode_blocking(design.clone()))
                .await?;

        Ok(self.insert(
            &mockup.id,
            &design.id,
            ImagePair {
                mockup: Arc::new(mockup_img),
                design: Arc::new(design_img),
            },
        ))
    }
}

/// Decode encoded bytes into straight-alpha RGBA
pub fn decode(source: &ImageSource) -> Result<RgbaImage> {
    image::load_from_memory(&source.bytes)
        .map(|img| img.to_rgba8())
        .map_err(|e| {
            warn!("Failed to decode image {}: {}", source.id, e);
            CompositeError::Decode {
                id: source.id.clone(),
                source: e,
            }
        })
}

/// Decode on the blocking pool so large images don't stall the runtime
pub async fn decode_blocking(source: ImageSource) -> Result<RgbaImage> {
    tokio::task::spawn_blocking(move || decode(&source))
        .await
        .map_err(|e| CompositeError::Task(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{encode_canvas, ExportFormat};
    use image::Rgba;

    fn png_source(id: &str, w: u32, h: u32) -> ImageSource {
        let img = RgbaImage::from_pixel(w, h, Rgba([10, 20, 30, 255]));
        let bytes = encode_canvas(&img, ExportFormat::Png).unwrap();
        ImageSource::new(id, bytes)
    }

    #[tokio::test]
    async fn test_load_decodes_and_caches() {
        let cache = ImageCache::new(4);
        let mockup = png_source("mockup", 6, 4);
        let design = png_source("design", 3, 2);

        let first = cache.load(&mockup, &design).await.unwrap();
        assert_eq!(first.mockup.dimensions(), (6, 4));
        assert_eq!(first.design.dimensions(), (3, 2));
        assert_eq!(cache.len(), 1);

        let second = cache.load(&mockup, &design).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_decode_failure_is_not_cached() {
        let cache = ImageCache::new(4);
        let mockup = png_source("mockup", 6, 4);
        let broken = ImageSource::new("broken", b"not an image".to_vec());

        let err = cache.load(&mockup, &broken).await.unwrap_err();
        assert!(matches!(err, CompositeError::Decode { ref id, .. } if id == "broken"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lru_eviction() {
        let cache = ImageCache::new(2);
        let pair = || ImagePair {
            mockup: Arc::new(RgbaImage::new(1, 1)),
            design: Arc::new(RgbaImage::new(1, 1)),
        };

        cache.insert("m1", "d", pair());
        cache.insert("m2", "d", pair());
        // Touch m1 so m2 becomes least recently used
        assert!(cache.get("m1", "d").is_some());
        cache.insert("m3", "d", pair());

        assert_eq!(cache.len(), 2);
        assert!(cache.get("m1", "d").is_some());
        assert!(cache.get("m2", "d").is_none());
        assert!(cache.get("m3", "d").is_some());
    }

    #[test]
    fn test_insert_keeps_first_entry() {
        let cache = ImageCache::new(2);
        let first = cache.insert(
            "m",
            "d",
            ImagePair {
                mockup: Arc::new(RgbaImage::new(2, 2)),
                design: Arc::new(RgbaImage::new(1, 1)),
            },
        );
        let second = cache.insert(
            "m",
            "d",
            ImagePair {
                mockup: Arc::new(RgbaImage::new(9, 9)),
                design: Arc::new(RgbaImage::new(9, 9)),
            },
        );
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.mockup.dimensions(), (2, 2));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let cache = ImageCache::new(0);
        cache.insert(
            "m",
            "d",
            ImagePair {
                mockup: Arc::new(RgbaImage::new(1, 1)),
                design: Arc::new(RgbaImage::new(1, 1)),
            },
        );
        assert_eq!(cache.len(), 1);
    }
}
