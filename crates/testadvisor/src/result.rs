//! Result and error types for TestAdvisor.

use thiserror::Error;

/// Result type for TestAdvisor operations
pub type AdvisorResult<T> = Result<T, AdvisorError>;

/// Errors that can occur while processing a test run
#[derive(Debug, Error)]
pub enum AdvisorError {
    /// Raw result could not be turned into a test run
    #[error("Adapter failed: {message}")]
    Adapter {
        /// Error message
        message: String,
    },

    /// Registry layout or lookup error
    #[error("Registry error: {message}")]
    Registry {
        /// Error message
        message: String,
    },

    /// Image comparison error
    #[error("Image comparison failed: {message}")]
    ImageComparison {
        /// Error message
        message: String,
    },

    /// Image processing error (decoding, encoding, annotating)
    #[error("Image processing failed: {message}")]
    ImageProcessing {
        /// Error message
        message: String,
    },

    /// Configuration value could not be used
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message
        message: String,
    },

    /// Malformed properties file
    #[error("Properties error: {message}")]
    Properties {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AdvisorError {
    /// Create an adapter error
    #[must_use]
    pub fn adapter(message: impl Into<String>) -> Self {
        Self::Adapter {
            message: message.into(),
        }
    }

    /// Create a registry error
    #[must_use]
    pub fn registry(message: impl Into<String>) -> Self {
        Self::Registry {
            message: message.into(),
        }
    }

    /// Create an image comparison error
    #[must_use]
    pub fn image_comparison(message: impl Into<String>) -> Self {
        Self::ImageComparison {
            message: message.into(),
        }
    }

    /// Create an image processing error
    #[must_use]
    pub fn image_processing(message: impl Into<String>) -> Self {
        Self::ImageProcessing {
            message: message.into(),
        }
    }

    /// Create an invalid configuration error
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a properties error
    #[must_use]
    pub fn properties(message: impl Into<String>) -> Self {
        Self::Properties {
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_error() {
        let err = AdvisorError::adapter("bad result");
        assert!(err.to_string().contains("Adapter"));
        assert!(err.to_string().contains("bad result"));
    }

    #[test]
    fn test_registry_error() {
        let err = AdvisorError::registry("no root");
        assert!(err.to_string().contains("Registry"));
    }

    #[test]
    fn test_image_errors() {
        assert!(AdvisorError::image_comparison("x")
            .to_string()
            .contains("comparison"));
        assert!(AdvisorError::image_processing("x")
            .to_string()
            .contains("processing"));
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: AdvisorError = io_err.into();
        assert!(err.to_string().contains("I/O"));
    }

    #[test]
    fn test_json_error_from() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: AdvisorError = json_err.into();
        assert!(err.to_string().contains("JSON"));
    }
}
