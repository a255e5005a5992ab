//! Error types for hotlympics-rater
//!
//! Fetch failures are values, not panics: the queue and cache turn them into
//! observable state, and the submitter turns them into a logged `false`.

use thiserror::Error;

/// Failure talking to a remote collaborator
///
/// `Transport`, `Status` and `Rejected` are fetch failures; `Decode` and
/// `NotAnImage` are decode failures. Both are handled identically for
/// control flow and only differ in how they are logged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Connection, timeout or other transport error
    #[error("Network error: {0}")]
    Transport(String),

    /// Server answered with a non-success HTTP status
    #[error("API error {0}: {1}")]
    Status(u16, String),

    /// Well-formed response carrying `success: false`
    #[error("Rejected by server: {0}")]
    Rejected(String),

    /// Response body could not be parsed
    #[error("Decode error: {0}")]
    Decode(String),

    /// Media bytes are not a recognised image format
    #[error("Not an image: {0}")]
    NotAnImage(String),
}

impl FetchError {
    /// True for malformed payloads rather than transport/status problems
    pub fn is_decode(&self) -> bool {
        matches!(self, FetchError::Decode(_) | FetchError::NotAnImage(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::Status(status.as_u16(), err.to_string())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

/// Convenience Result type for remote calls
pub type FetchResult<T> = std::result::Result<T, FetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_classification() {
        assert!(FetchError::Decode("eof".into()).is_decode());
        assert!(FetchError::NotAnImage("a.txt".into()).is_decode());
        assert!(!FetchError::Status(503, "busy".into()).is_decode());
        assert!(!FetchError::Transport("refused".into()).is_decode());
        assert!(!FetchError::Rejected("success=false".into()).is_decode());
    }

    #[test]
    fn test_display_includes_status() {
        let err = FetchError::Status(404, "missing".into());
        assert_eq!(err.to_string(), "API error 404: missing");
    }
}
