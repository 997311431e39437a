//! Error types for tidy.

use thiserror::Error;

/// Result type alias using tidy's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for tidy operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Document not found
    #[error("Document not found: {0}")]
    DocumentNotFound(uuid::Uuid),

    /// A single classifier call failed (transport, status, or decoding)
    #[error("Inference error: {0}")]
    Inference(String),

    /// Both the primary and the fallback model failed
    #[error("Classification unavailable: {0}")]
    ClassificationUnavailable(String),

    /// Classifier output could not be parsed after cleanup
    #[error("Malformed classifier response: {0}")]
    MalformedResponse(String),

    /// A target path segment could not be found or created
    #[error("Cannot resolve destination {path}: {reason}")]
    DestinationResolution { path: String, reason: String },

    /// Restoring a recorded change failed
    #[error("Revert failed: {0}")]
    RevertFailure(String),

    /// The change is no longer in the bounded history
    #[error("Change is not revertable: {0}")]
    NotRevertable(uuid::Uuid),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a classifier failure should be retried against another model.
    pub fn is_retryable_classification(&self) -> bool {
        matches!(
            self,
            Error::Inference(_) | Error::MalformedResponse(_) | Error::Request(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("test resource".to_string());
        assert_eq!(err.to_string(), "Not found: test resource");
    }

    #[test]
    fn test_error_display_document_not_found() {
        let id = Uuid::nil();
        let err = Error::DocumentNotFound(id);
        assert_eq!(err.to_string(), format!("Document not found: {}", id));
    }

    #[test]
    fn test_error_display_destination_resolution() {
        let err = Error::DestinationResolution {
            path: "/Work/Planning".to_string(),
            reason: "segment 'Work' is a leaf".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Cannot resolve destination /Work/Planning: segment 'Work' is a leaf"
        );
    }

    #[test]
    fn test_error_display_not_revertable() {
        let id = Uuid::new_v4();
        let err = Error::NotRevertable(id);
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn test_retryable_classification_errors() {
        assert!(Error::Inference("timeout".into()).is_retryable_classification());
        assert!(Error::MalformedResponse("not json".into()).is_retryable_classification());
        assert!(Error::Request("refused".into()).is_retryable_classification());
        assert!(!Error::Config("no model".into()).is_retryable_classification());
        assert!(!Error::DocumentNotFound(Uuid::nil()).is_retryable_classification());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
