//! Manifest parsing errors.

use thiserror::Error;

/// Errors produced while turning a serialized manifest into a [`super::Manifest`].
///
/// Every variant is recoverable: callers fall back to showing the preview
/// image without a pyramid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    /// The blob is not JSON, not an object, or has the wrong shape.
    #[error("malformed manifest: {0}")]
    Malformed(String),

    /// Neither levels nor tiles could be found or derived.
    #[error("manifest describes no levels or tiles")]
    Empty,

    /// Panorama dimensions are absent and cannot be derived from the levels.
    #[error("manifest is missing panorama dimensions")]
    MissingDimensions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_error_display() {
        assert_eq!(
            ManifestError::Malformed("expected object".to_string()).to_string(),
            "malformed manifest: expected object"
        );
        assert_eq!(
            ManifestError::Empty.to_string(),
            "manifest describes no levels or tiles"
        );
        assert_eq!(
            ManifestError::MissingDimensions.to_string(),
            "manifest is missing panorama dimensions"
        );
    }
}
