//! Photo ingestion: validate, resize, and persist uploaded images.
//!
//! Decoding and resizing are CPU-bound and run on tokio's blocking pool so
//! they never stall the request workers. The whole ingestion is bounded by a
//! timeout; if the caller goes away the blocking work still completes but its
//! result is dropped.

mod blob;

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

pub use blob::{BlobError, BlobStore, LocalBlobStore, MemoryBlobStore};

/// Default width of stored photos, in pixels.
pub const DEFAULT_IMAGE_WIDTH: u32 = 800;

/// Errors from image ingestion.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    /// The upload does not declare an `image/*` mimetype.
    #[error("That filetype isn't allowed! ({0})")]
    UnsupportedType(String),

    /// The bytes are not a decodable image.
    #[error("could not read image: {0}")]
    Decode(String),

    #[error("could not encode image: {0}")]
    Encode(String),

    #[error(transparent)]
    Storage(#[from] BlobError),

    #[error("image processing timed out")]
    Timeout,

    /// The blocking task panicked or was cancelled.
    #[error("image task failed: {0}")]
    Task(String),
}

/// Resizes uploads to a fixed width and writes them to a [`BlobStore`].
#[derive(Clone)]
pub struct ImagePipeline {
    blobs: Arc<dyn BlobStore>,
    width: u32,
    timeout: Duration,
}

impl ImagePipeline {
    #[must_use]
    pub fn new(blobs: Arc<dyn BlobStore>, width: u32, timeout: Duration) -> Self {
        Self {
            blobs,
            width: width.max(1),
            timeout,
        }
    }

    /// The underlying blob store, for serving stored photos.
    #[must_use]
    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    /// Ingest an uploaded photo and return its storage reference (filename).
    ///
    /// # Errors
    ///
    /// - `UnsupportedType` if `mime` is not `image/*` (nothing is decoded)
    /// - `Decode` if the bytes are not an image
    /// - `Encode`, `Storage`, `Timeout`, or `Task` on processing failures
    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    pub async fn ingest(&self, bytes: Vec<u8>, mime: &str) -> Result<String, ImageError> {
        if !mime.starts_with("image/") {
            return Err(ImageError::UnsupportedType(mime.to_owned()));
        }
        let filename = format!("{}.{}", Uuid::new_v4(), extension_for(mime));

        tokio::time::timeout(self.timeout, self.process_and_store(bytes, &filename))
            .await
            .map_err(|_| ImageError::Timeout)??;

        debug!(%filename, "Stored photo");
        Ok(filename)
    }

    /// Best-effort removal of a stored photo that ended up unreferenced.
    pub async fn discard(&self, filename: &str) {
        match self.blobs.delete(filename).await {
            Ok(()) => debug!(%filename, "Discarded photo"),
            Err(e) => warn!(%filename, error = %e, "Failed to discard photo"),
        }
    }

    async fn process_and_store(&self, bytes: Vec<u8>, filename: &str) -> Result<(), ImageError> {
        let width = self.width;
        let resized = tokio::task::spawn_blocking(move || resize_to_width(&bytes, width))
            .await
            .map_err(|e| ImageError::Task(e.to_string()))??;

        self.blobs.put(filename, resized).await?;
        Ok(())
    }
}

/// File extension derived from the mime subtype (`image/svg+xml` -> `svg`).
fn extension_for(mime: &str) -> String {
    let subtype = mime
        .split_once('/')
        .map_or("", |(_, sub)| sub)
        .split([';', '+'])
        .next()
        .unwrap_or_default();
    let ext: String = subtype
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if ext.is_empty() { "img".to_owned() } else { ext }
}

/// Height that keeps the aspect ratio at `target_width`, rounded, at least 1.
fn scaled_height(width: u32, height: u32, target_width: u32) -> u32 {
    let (w, h, t) = (u64::from(width), u64::from(height), u64::from(target_width));
    let scaled = (h * t + w / 2) / w.max(1);
    u32::try_from(scaled).unwrap_or(u32::MAX).max(1)
}

/// Decode, resize to `target_width`, and re-encode in the source format.
fn resize_to_width(bytes: &[u8], target_width: u32) -> Result<Vec<u8>, ImageError> {
    let format = image::guess_format(bytes).map_err(|e| ImageError::Decode(e.to_string()))?;
    let img = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| ImageError::Decode(e.to_string()))?;

    let height = scaled_height(img.width(), img.height(), target_width);
    let resized = img.resize_exact(target_width, height, FilterType::Lanczos3);

    // JPEG has no alpha channel
    let resized = if format == ImageFormat::Jpeg {
        DynamicImage::ImageRgb8(resized.to_rgb8())
    } else {
        resized
    };

    let mut out = Cursor::new(Vec::new());
    resized
        .write_to(&mut out, format)
        .map_err(|e| ImageError::Encode(e.to_string()))?;
    Ok(out.into_inner())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::{GenericImageView, Rgb, RgbImage};

    use super::*;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 40, 40]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn pipeline() -> (Arc<MemoryBlobStore>, ImagePipeline) {
        let blobs = Arc::new(MemoryBlobStore::new());
        let pipeline = ImagePipeline::new(blobs.clone(), DEFAULT_IMAGE_WIDTH, Duration::from_secs(15));
        (blobs, pipeline)
    }

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for("image/png"), "png");
        assert_eq!(extension_for("image/svg+xml"), "svg");
        assert_eq!(extension_for("image/jpeg; charset=binary"), "jpeg");
        assert_eq!(extension_for("image/"), "img");
        assert_eq!(extension_for("image/../x"), "x");
    }

    #[test]
    fn test_scaled_height() {
        assert_eq!(scaled_height(1600, 1200, 800), 600);
        assert_eq!(scaled_height(400, 300, 800), 600);
        assert_eq!(scaled_height(3, 2, 800), 533);
        assert_eq!(scaled_height(10_000, 1, 800), 1);
    }

    #[tokio::test]
    async fn test_rejects_non_image_mimetype_without_storing() {
        let (blobs, pipeline) = pipeline();
        let err = pipeline
            .ingest(b"hello".to_vec(), "text/plain")
            .await
            .unwrap_err();
        assert!(matches!(err, ImageError::UnsupportedType(_)));
        assert!(blobs.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_undecodable_bytes() {
        let (blobs, pipeline) = pipeline();
        let err = pipeline
            .ingest(b"not really a png".to_vec(), "image/png")
            .await
            .unwrap_err();
        assert!(matches!(err, ImageError::Decode(_)));
        assert!(blobs.is_empty());
    }

    #[tokio::test]
    async fn test_stores_resized_copy_at_fixed_width() {
        let (blobs, pipeline) = pipeline();
        let filename = pipeline.ingest(png(1600, 1200), "image/png").await.unwrap();
        assert!(
            std::path::Path::new(&filename)
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
        );

        let stored = blobs.get(&filename).await.unwrap().unwrap();
        let img = image::load_from_memory(&stored).unwrap();
        assert_eq!(img.dimensions(), (800, 600));
    }

    #[tokio::test]
    async fn test_upscales_small_images() {
        let (blobs, pipeline) = pipeline();
        let filename = pipeline.ingest(png(200, 100), "image/png").await.unwrap();
        let stored = blobs.get(&filename).await.unwrap().unwrap();
        let img = image::load_from_memory(&stored).unwrap();
        assert_eq!(img.dimensions(), (800, 400));
    }
}
