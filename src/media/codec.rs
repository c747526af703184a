//! Image codec capabilities used by the transformer.
//!
//! [`ImageCodec`] is the seam between the normalization pipeline and the
//! concrete image libraries. [`WebpCodec`] decodes with `image`, reads EXIF
//! with `rexif` and encodes with `webp`.

use image::imageops::FilterType;
use image::DynamicImage;
use rexif::{ExifData, ExifTag, TagValue};

use super::container;
use super::transform::{Dpi, TransformError};

/// Default lossy WebP quality (0-100).
pub const DEFAULT_WEBP_QUALITY: f32 = 85.0;

/// Largest width or height libwebp can encode.
pub const WEBP_MAX_DIMENSION: u32 = 16383;

/// Clockwise rotation applied before resizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    /// Map an EXIF orientation tag to a rotation.
    ///
    /// Only the pure rotations (6, 3, 8) are handled; mirrored orientations
    /// and unknown values leave the image as stored.
    pub fn from_orientation(orientation: Option<u16>) -> Self {
        match orientation {
            Some(8) => Self::Cw270,
            Some(3) => Self::Cw180,
            Some(6) => Self::Cw90,
            _ => Self::None,
        }
    }

    /// Whether the rotation swaps width and height.
    pub fn swaps_axes(&self) -> bool {
        matches!(self, Self::Cw90 | Self::Cw270)
    }
}

/// Metadata read from the raw bytes before decoding. Every field is optional:
/// missing or corrupt EXIF is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SourceMetadata {
    /// EXIF orientation tag (1-8).
    pub orientation: Option<u16>,

    /// Horizontal and vertical resolution in dots per inch.
    pub dpi: Option<(f64, f64)>,
}

/// Compression used for the normalized output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WebpCompression {
    /// Lossy VP8 at the given quality (0-100).
    Lossy(f32),
    /// Lossless VP8L.
    Lossless,
}

impl Default for WebpCompression {
    fn default() -> Self {
        Self::Lossy(DEFAULT_WEBP_QUALITY)
    }
}

/// Decode / rotate / resize / encode capabilities.
pub trait ImageCodec {
    /// Decoded pixel data.
    type Raster;

    /// MIME type of the encoded output.
    fn content_type(&self) -> &'static str;

    fn read_metadata(&self, bytes: &[u8]) -> SourceMetadata;

    fn decode(&self, bytes: &[u8]) -> Result<Self::Raster, TransformError>;

    /// `(width, height)` of a raster.
    fn dimensions(&self, raster: &Self::Raster) -> (u32, u32);

    fn rotate(&self, raster: Self::Raster, rotation: Rotation) -> Self::Raster;

    /// Resample to exactly `width` x `height`.
    fn resize(&self, raster: &Self::Raster, width: u32, height: u32) -> Self::Raster;

    /// Largest output width or height the encoder accepts.
    fn max_dimension(&self) -> Option<u32> {
        None
    }

    /// Encode a raster, recording `dpi` in the output where the format allows.
    fn encode(&self, raster: &Self::Raster, dpi: Dpi) -> Result<Vec<u8>, TransformError>;
}

/// Production codec: `image` + `rexif` in, WebP out.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebpCodec {
    compression: WebpCompression,
}

impl WebpCodec {
    pub fn new(compression: WebpCompression) -> Self {
        Self { compression }
    }
}

impl ImageCodec for WebpCodec {
    type Raster = DynamicImage;

    fn content_type(&self) -> &'static str {
        "image/webp"
    }

    fn read_metadata(&self, bytes: &[u8]) -> SourceMetadata {
        // WebP keeps its TIFF blob in an EXIF chunk, sometimes behind the
        // JPEG APP1 "Exif\0\0" marker.
        let bytes = match container::find_chunk(bytes, b"EXIF") {
            Some(exif) => exif.strip_prefix(b"Exif\0\0").unwrap_or(exif),
            None => bytes,
        };
        match rexif::parse_buffer_quiet(bytes).0 {
            Ok(exif) => SourceMetadata {
                orientation: exif_u16(&exif, ExifTag::Orientation),
                dpi: exif_dpi(&exif),
            },
            Err(_) => SourceMetadata::default(),
        }
    }

    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, TransformError> {
        image::load_from_memory(bytes).map_err(|e| TransformError::Decode(e.to_string()))
    }

    fn dimensions(&self, raster: &DynamicImage) -> (u32, u32) {
        (raster.width(), raster.height())
    }

    fn rotate(&self, raster: DynamicImage, rotation: Rotation) -> DynamicImage {
        match rotation {
            Rotation::None => raster,
            Rotation::Cw90 => raster.rotate90(),
            Rotation::Cw180 => raster.rotate180(),
            Rotation::Cw270 => raster.rotate270(),
        }
    }

    fn resize(&self, raster: &DynamicImage, width: u32, height: u32) -> DynamicImage {
        // Catmull-Rom is the bicubic kernel; samples outside the source are
        // clamped to the nearest edge pixel.
        raster.resize_exact(width, height, FilterType::CatmullRom)
    }

    fn max_dimension(&self) -> Option<u32> {
        Some(WEBP_MAX_DIMENSION)
    }

    fn encode(&self, raster: &DynamicImage, dpi: Dpi) -> Result<Vec<u8>, TransformError> {
        // libwebp only accepts 8-bit RGB/RGBA input.
        let converted;
        let input = match raster {
            DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => raster,
            other if other.color().has_alpha() => {
                converted = DynamicImage::ImageRgba8(other.to_rgba8());
                &converted
            }
            other => {
                converted = DynamicImage::ImageRgb8(other.to_rgb8());
                &converted
            }
        };

        let encoder = webp::Encoder::from_image(input)
            .map_err(|e| TransformError::Encode(e.to_string()))?;
        let (lossless, quality) = match self.compression {
            WebpCompression::Lossy(quality) => (false, quality.clamp(0.0, 100.0)),
            // For lossless output "quality" is compression effort.
            WebpCompression::Lossless => (true, 75.0),
        };
        let encoded = encoder
            .encode_simple(lossless, quality)
            .map_err(|e| TransformError::Encode(format!("{e:?}")))?;

        container::embed_exif(
            &encoded,
            input.width(),
            input.height(),
            &container::resolution_exif(dpi),
        )
        .map_err(|e| TransformError::Encode(e.to_string()))
    }
}

fn exif_u16(exif: &ExifData, tag: ExifTag) -> Option<u16> {
    exif.entries
        .iter()
        .find(|entry| entry.tag == tag)
        .and_then(|entry| match &entry.value {
            TagValue::U16(values) => values.first().copied(),
            TagValue::U8(values) => values.first().copied().map(u16::from),
            TagValue::U32(values) => values.first().and_then(|&v| u16::try_from(v).ok()),
            _ => None,
        })
}

fn exif_rational(exif: &ExifData, tag: ExifTag) -> Option<f64> {
    exif.entries
        .iter()
        .find(|entry| entry.tag == tag)
        .and_then(|entry| match &entry.value {
            TagValue::URational(values) => values.first().and_then(|r| {
                (r.denominator != 0).then(|| f64::from(r.numerator) / f64::from(r.denominator))
            }),
            _ => None,
        })
}

/// X/Y resolution converted to dots per inch (ResolutionUnit 3 = centimetres).
fn exif_dpi(exif: &ExifData) -> Option<(f64, f64)> {
    let x = exif_rational(exif, ExifTag::XResolution)?;
    let y = exif_rational(exif, ExifTag::YResolution)?;
    let per_cm = exif_u16(exif, ExifTag::ResolutionUnit) == Some(3);
    let scale = if per_cm { 2.54 } else { 1.0 };
    Some((x * scale, y * scale))
}
