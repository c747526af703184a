//! Reorient, resize and re-encode a source image.
//!
//! Pipeline:
//! 1. Read EXIF orientation and resolution (failures mean "none")
//! 2. Decode and rotate according to the orientation
//! 3. Scale to the canonical width, keeping the rotated aspect ratio
//! 4. Encode with the codec's output format, recording the resolution

use thiserror::Error;
use tracing::debug;

use super::codec::{ImageCodec, Rotation, SourceMetadata};

/// Canonical output width in pixels.
pub const DEFAULT_TARGET_WIDTH: u32 = 800;

/// Resolution reported when the source has none (or reports zero).
pub const DEFAULT_DPI: f64 = 300.0;

/// Image transformation errors.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("cannot scale a {width}x{height} image to width {target_width}")]
    DegenerateSource {
        width: u32,
        height: u32,
        target_width: u32,
    },

    #[error("output {width}x{height} exceeds the encoder limit of {max}px")]
    TooLarge { width: u32, height: u32, max: u32 },

    #[error("failed to encode image: {0}")]
    Encode(String),
}

/// Output resolution in dots per inch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dpi {
    pub x: f64,
    pub y: f64,
}

impl Dpi {
    /// Keep the source resolution unless either axis is zero, missing or
    /// not a finite number; then both axes fall back to [`DEFAULT_DPI`].
    pub fn from_source(source: Option<(f64, f64)>) -> Self {
        match source {
            Some((x, y)) if x.is_finite() && y.is_finite() && x > 0.0 && y > 0.0 => Self { x, y },
            _ => Self {
                x: DEFAULT_DPI,
                y: DEFAULT_DPI,
            },
        }
    }
}

/// A normalized image ready for upload.
#[derive(Debug, Clone)]
pub struct TransformedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub dpi: Dpi,
    pub rotation: Rotation,
    pub content_type: &'static str,
}

/// Height of a `source_width` x `source_height` image scaled to
/// `target_width`, rounded down.
pub fn target_height(
    target_width: u32,
    source_width: u32,
    source_height: u32,
) -> Result<u32, TransformError> {
    let degenerate = || TransformError::DegenerateSource {
        width: source_width,
        height: source_height,
        target_width,
    };

    if source_width == 0 || source_height == 0 {
        return Err(degenerate());
    }

    let height = u64::from(target_width) * u64::from(source_height) / u64::from(source_width);
    match u32::try_from(height) {
        Ok(0) | Err(_) => Err(degenerate()),
        Ok(h) => Ok(h),
    }
}

/// Runs the normalization pipeline over an [`ImageCodec`].
#[derive(Debug, Clone)]
pub struct ImageTransformer<C> {
    codec: C,
    target_width: u32,
}

impl<C: ImageCodec> ImageTransformer<C> {
    pub fn new(codec: C, target_width: u32) -> Self {
        Self {
            codec,
            target_width,
        }
    }

    pub fn target_width(&self) -> u32 {
        self.target_width
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Normalize raw bytes, reading orientation and DPI from their EXIF data.
    pub fn transform(&self, bytes: &[u8]) -> Result<TransformedImage, TransformError> {
        let metadata = self.codec.read_metadata(bytes);
        self.transform_with(bytes, metadata)
    }

    /// Normalize raw bytes using caller-supplied metadata.
    pub fn transform_with(
        &self,
        bytes: &[u8],
        metadata: SourceMetadata,
    ) -> Result<TransformedImage, TransformError> {
        let rotation = Rotation::from_orientation(metadata.orientation);
        let dpi = Dpi::from_source(metadata.dpi);

        let raster = self.codec.decode(bytes)?;
        let raster = self.codec.rotate(raster, rotation);

        let (source_width, source_height) = self.codec.dimensions(&raster);
        let height = target_height(self.target_width, source_width, source_height)?;

        // Checked before resizing so an oversized raster is never allocated.
        if let Some(max) = self.codec.max_dimension() {
            if self.target_width > max || height > max {
                return Err(TransformError::TooLarge {
                    width: self.target_width,
                    height,
                    max,
                });
            }
        }

        debug!(
            source_width = source_width,
            source_height = source_height,
            width = self.target_width,
            height = height,
            rotation = ?rotation,
            "Resizing image"
        );

        let resized = self.codec.resize(&raster, self.target_width, height);
        let encoded = self.codec.encode(&resized, dpi)?;

        Ok(TransformedImage {
            bytes: encoded,
            width: self.target_width,
            height,
            dpi,
            rotation,
            content_type: self.codec.content_type(),
        })
    }
}
