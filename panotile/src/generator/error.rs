//! Pyramid generation errors.

use thiserror::Error;

/// Errors surfaced to callers of the generator.
///
/// Generation is all-or-nothing: any of these aborts the whole pyramid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeneratorError {
    /// The source bytes are not a decodable image.
    #[error("unsupported source image: {0}")]
    UnsupportedFormat(String),

    /// The source is larger than the generator accepts.
    #[error("source image {width}×{height} exceeds the {max}px limit")]
    DimensionOverflow { width: u32, height: u32, max: u32 },

    /// A tile or preview could not be encoded.
    #[error("tile encoding failed: {0}")]
    EncodeFailure(String),
}

impl From<image::ImageError> for GeneratorError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Encoding(e) => GeneratorError::EncodeFailure(e.to_string()),
            other => GeneratorError::UnsupportedFormat(other.to_string()),
        }
    }
}
