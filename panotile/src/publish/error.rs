//! Publication errors.

use thiserror::Error;

use crate::generator::GeneratorError;

/// Why a pyramid was not published. The scene is never updated when any of
/// these occur.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("upload of {key} failed: {reason}")]
    Upload { key: String, reason: String },

    #[error("scene update failed: {0}")]
    SceneUpdate(String),

    #[error(transparent)]
    Generator(#[from] GeneratorError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = PublishError::Upload {
            key: "l0_0_0.jpg".to_string(),
            reason: "timeout".to_string(),
        };
        assert_eq!(err.to_string(), "upload of l0_0_0.jpg failed: timeout");

        let err: PublishError = GeneratorError::EncodeFailure("x".to_string()).into();
        assert_eq!(err.to_string(), "tile encoding failed: x");
    }
}
