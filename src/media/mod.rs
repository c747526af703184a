//! Media normalization: content sniffing, image transformation and the
//! WebP container.

pub mod codec;
pub mod container;
pub mod sniff;
pub mod transform;

pub use codec::{
    ImageCodec, Rotation, SourceMetadata, WebpCodec, WebpCompression, WEBP_MAX_DIMENSION,
};
pub use sniff::{is_image, sniff, OCTET_STREAM};
pub use transform::{
    target_height, Dpi, ImageTransformer, TransformError, TransformedImage, DEFAULT_TARGET_WIDTH,
};
