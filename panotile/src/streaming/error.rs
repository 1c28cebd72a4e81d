//! Tile fetch errors.

use thiserror::Error;

/// Why a tile could not be made resident.
///
/// All variants are non-fatal: the tile stays absent, the coarser level
/// underneath remains visible and a later reconcile may request it again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TileFetchError {
    /// The locator does not exist.
    #[error("tile not found: {0}")]
    NotFound(String),

    /// Transport failure or unexpected response.
    #[error("network error: {0}")]
    Network(String),

    /// The bytes are not a decodable image.
    #[error("failed to decode tile: {0}")]
    Decode(String),
}

impl TileFetchError {
    /// Whether retrying the same locator cannot succeed.
    pub fn is_not_found(&self) -> bool {
        matches!(self, TileFetchError::NotFound(_))
    }
}

impl From<image::ImageError> for TileFetchError {
    fn from(err: image::ImageError) -> Self {
        TileFetchError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            TileFetchError::NotFound("a/l0_0_0.jpg".to_string()).to_string(),
            "tile not found: a/l0_0_0.jpg"
        );
        assert_eq!(
            TileFetchError::Network("HTTP 500".to_string()).to_string(),
            "network error: HTTP 500"
        );
    }

    #[test]
    fn test_is_not_found() {
        assert!(TileFetchError::NotFound(String::new()).is_not_found());
        assert!(!TileFetchError::Decode(String::new()).is_not_found());
    }
}
