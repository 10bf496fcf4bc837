//! Error taxonomy for the client SDK.
//!
//! Errors are `Clone` because the first failure observed by a task is
//! latched in shared state and later returned from the completion path.

use thiserror::Error;

/// Errors surfaced by client operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    /// Malformed input, rejected synchronously before any RPC is scheduled.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No cached region covers the key.
    #[error("region not found for key {0}")]
    RegionNotFound(String),

    /// The cached region list does not cover the requested range.
    #[error("range not covered: [{start}, {end})")]
    RangeNotCovered { start: String, end: String },

    /// The region epoch sent with a request is stale. Absorbed by the
    /// controller on a successful refresh; surfaced only when the refresh
    /// round is exhausted.
    #[error("epoch mismatch on region {region_id}")]
    EpochMismatch { region_id: i64 },

    /// The region has no built DiskANN index. Never latched; routed to the
    /// brute-force fallback queue by the search part task.
    #[error("diskann index has no data on region {region_id}")]
    DiskAnnNoData { region_id: i64 },

    /// Unknown index id.
    #[error("index {0} not found")]
    IndexNotFound(i64),

    /// The index kind cannot be mapped to search parameters.
    #[error("unsupported index kind: {0}")]
    UnsupportedIndexKind(String),

    /// The filter expression failed to compile.
    #[error("invalid filter expression: {0}")]
    InvalidExpression(String),

    /// Transport-level failure after the controller's retries are exhausted.
    #[error("transport error: {0}")]
    Transport(String),

    /// A single RPC attempt exceeded its deadline.
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// An application error returned in the response body.
    #[error("server error {code}: {message}")]
    Server { code: i32, message: String },
}

impl ClientError {
    /// True for errors the controller may retry on the same region.
    pub(crate) fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Transport(_) | ClientError::Timeout { .. })
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = ClientError::Timeout { timeout_ms: 250 };
        assert!(err.to_string().contains("250ms"));

        let err = ClientError::Server {
            code: 30007,
            message: "raft not ready".to_string(),
        };
        assert!(err.to_string().contains("30007"));
    }

    #[test]
    fn test_retryable() {
        assert!(ClientError::Transport("reset".into()).is_retryable());
        assert!(ClientError::Timeout { timeout_ms: 1 }.is_retryable());
        assert!(!ClientError::InvalidArgument("x".into()).is_retryable());
        assert!(!ClientError::DiskAnnNoData { region_id: 1 }.is_retryable());
    }
}
