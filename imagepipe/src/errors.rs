//! Error types for the imagepipe crate.
//!
//! The request context itself never fails: cancellation is idempotent and
//! callback registration always succeeds. Errors only arise at the edges, when
//! a producer reports a failure, when configuration is invalid, or when the
//! result channel of a request closes early.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// The main error type for imagepipe operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The request was cancelled before a final result was produced.
    #[error("Request cancelled: {request_id}")]
    Cancelled {
        /// Id of the cancelled request.
        request_id: String,
    },

    /// A producer reported a failure through its consumer.
    #[error("Producer failure: {0}")]
    Producer(#[source] anyhow::Error),

    /// The producer finished without delivering a final result.
    #[error("Result channel closed before a final result for request {request_id}")]
    ChannelClosed {
        /// Id of the affected request.
        request_id: String,
    },

    /// The pipeline configuration is invalid.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Creates a cancellation error for the given request id.
    #[must_use]
    pub fn cancelled(request_id: impl Into<String>) -> Self {
        Self::Cancelled {
            request_id: request_id.into(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Returns true if this error represents a cancellation.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_display() {
        let err = PipelineError::cancelled("req-1");
        assert_eq!(err.to_string(), "Request cancelled: req-1");
        assert!(err.is_cancellation());
    }

    #[test]
    fn test_producer_error_keeps_source() {
        let err = PipelineError::Producer(anyhow::anyhow!("decode failed"));
        assert!(err.to_string().contains("decode failed"));
        assert!(!err.is_cancellation());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_serialization_from() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: PipelineError = json_err.into();
        assert!(matches!(err, PipelineError::Serialization(_)));
    }
}
