//! Error types for the batch-poller crate.

/// Boxed error used by fetchers that wrap arbitrary transport errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by the poller's own API.
#[derive(Debug, thiserror::Error)]
pub enum PollerError {
    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The poller was created outside of a tokio runtime
    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),
}

/// Errors produced by a batch fetch.
///
/// These never reach callers of `add_listener`/`remove_listener`. The scheduler
/// logs them and treats the cycle as one that brought no news.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The transport failed to deliver a response
    #[error("Transport error: {0}")]
    Transport(String),

    /// A response arrived but could not be decoded into events
    #[error("Failed to decode batch response: {0}")]
    Decode(String),

    /// The fetch future panicked
    #[error("Batch fetch panicked: {0}")]
    Panicked(String),

    /// Any other error raised by the fetcher
    #[error(transparent)]
    Other(#[from] BoxError),
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Decode(err.to_string())
    }
}

/// Convenience type alias for Results using PollerError.
pub type PollerResult<T> = std::result::Result<T, PollerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poller_error_display() {
        let error = PollerError::Configuration("base_time must be greater than 0".to_string());
        assert_eq!(
            error.to_string(),
            "Configuration error: base_time must be greater than 0"
        );

        let error = PollerError::NoRuntime("must be called from a runtime".to_string());
        assert!(error.to_string().starts_with("No tokio runtime available"));
    }

    #[test]
    fn test_fetch_error_display() {
        let error = FetchError::Transport("connection reset".to_string());
        assert_eq!(error.to_string(), "Transport error: connection reset");

        let error = FetchError::Panicked("boom".to_string());
        assert_eq!(error.to_string(), "Batch fetch panicked: boom");
    }

    #[test]
    fn test_fetch_error_from_boxed_error() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        let boxed: BoxError = Box::new(io);
        let error: FetchError = boxed.into();

        match error {
            FetchError::Other(inner) => assert_eq!(inner.to_string(), "timed out"),
            other => panic!("Expected Other variant, got {other:?}"),
        }
    }

    #[test]
    fn test_fetch_error_from_json_error() {
        let err = serde_json::from_str::<Vec<u32>>("not json").unwrap_err();
        let error: FetchError = err.into();
        assert!(matches!(error, FetchError::Decode(_)));
    }
}
