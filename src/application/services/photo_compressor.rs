//! Camera capture downscaling.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use thiserror::Error;
use tracing::debug;

/// Longest edge of a compressed photo.
pub const DEFAULT_MAX_EDGE: u32 = 1920;
/// JPEG quality used for re-encoding.
pub const DEFAULT_QUALITY: u8 = 80;

const JPEG_MIME: &str = "image/jpeg";

/// Why a capture could not be prepared for upload.
#[derive(Debug, Error)]
pub enum CompressError {
    /// Input is not a supported image.
    #[error("not a decodable image: {0}")]
    Decode(String),
    /// JPEG encoding failed.
    #[error("failed to encode photo: {0}")]
    Encode(String),
    /// The blocking worker died.
    #[error("compression task panicked: {0}")]
    Task(String),
}

/// Re-encoded photo ready for the upload queue.
#[derive(Debug, Clone)]
pub struct CompressedPhoto {
    /// JPEG data.
    pub bytes: Bytes,
    /// Always `image/jpeg`.
    pub mime_type: &'static str,
    /// Width after scaling.
    pub width: u32,
    /// Height after scaling.
    pub height: u32,
}

/// Downscales camera captures before they are queued.
#[derive(Debug, Clone, Copy)]
pub struct PhotoCompressor {
    max_edge: u32,
    quality: u8,
}

impl Default for PhotoCompressor {
    fn default() -> Self {
        Self {
            max_edge: DEFAULT_MAX_EDGE,
            quality: DEFAULT_QUALITY,
        }
    }
}

impl PhotoCompressor {
    /// Compressor with a custom long-edge limit and JPEG quality (1 to 100).
    #[must_use]
    pub fn new(max_edge: u32, quality: u8) -> Self {
        Self {
            max_edge: max_edge.max(1),
            quality: quality.clamp(1, 100),
        }
    }

    /// Decodes `raw`, shrinks it so the long edge fits, and re-encodes it as
    /// JPEG on the blocking pool.
    ///
    /// # Errors
    /// Returns error if the input is not an image or encoding fails.
    pub async fn compress(&self, raw: Bytes) -> Result<CompressedPhoto, CompressError> {
        let compressor = *self;
        let original_size = raw.len();
        let photo = tokio::task::spawn_blocking(move || compressor.compress_blocking(&raw))
            .await
            .map_err(|e| CompressError::Task(e.to_string()))??;

        debug!(
            original = original_size,
            compressed = photo.bytes.len(),
            width = photo.width,
            height = photo.height,
            "Photo compressed"
        );
        Ok(photo)
    }

    fn compress_blocking(&self, raw: &[u8]) -> Result<CompressedPhoto, CompressError> {
        let img = image::load_from_memory(raw).map_err(|e| CompressError::Decode(e.to_string()))?;

        let img = if img.width().max(img.height()) > self.max_edge {
            img.resize(self.max_edge, self.max_edge, FilterType::Lanczos3)
        } else {
            img
        };

        let rgb = img.to_rgb8();
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, self.quality)
            .encode_image(&rgb)
            .map_err(|e| CompressError::Encode(e.to_string()))?;

        Ok(CompressedPhoto {
            bytes: Bytes::from(out),
            mime_type: JPEG_MIME,
            width: rgb.width(),
            height: rgb.height(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Bytes {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([40, 120, 200])));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        Bytes::from(out.into_inner())
    }

    #[tokio::test]
    async fn test_large_photo_is_downscaled() {
        let photo = PhotoCompressor::default().compress(png(3000, 1000)).await.unwrap();

        assert_eq!((photo.width, photo.height), (1920, 640));
        assert_eq!(photo.mime_type, "image/jpeg");
        let decoded = image::load_from_memory(&photo.bytes).unwrap();
        assert_eq!(decoded.width(), 1920);
    }

    #[tokio::test]
    async fn test_small_photo_keeps_dimensions() {
        let photo = PhotoCompressor::default().compress(png(64, 48)).await.unwrap();
        assert_eq!((photo.width, photo.height), (64, 48));
    }

    #[tokio::test]
    async fn test_garbage_is_rejected() {
        let result = PhotoCompressor::default()
            .compress(Bytes::from_static(b"definitely not an image"))
            .await;
        assert!(matches!(result, Err(CompressError::Decode(_))));
    }
}
