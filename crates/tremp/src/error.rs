//! Typed error kinds for the core seams.
//!
//! Tool handlers deliberately do NOT use these: at the dispatch seam errors
//! are returned as plain strings so the model can read them and self-correct.

use thiserror::Error;

/// Failures from the document-store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend hiccup — retried once with jitter before surfacing.
    #[error("transient store failure: {0}")]
    Transient(String),

    /// The addressed record does not exist (already deleted, or bad id).
    #[error("record not found")]
    NotFound,
}

/// Failure from the external routing engine.
///
/// Network errors, non-2xx, timeouts, and malformed bodies all collapse to
/// this single recoverable kind: the ride is persisted without route data
/// and matching degrades to name-exact mode.
#[derive(Debug, Error)]
#[error("routing unavailable: {0}")]
pub struct RoutingError(pub String);

/// Failures from the intent-extraction model.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The call exceeded its wall-clock deadline.
    #[error("llm call timed out after {0}s")]
    Timeout(u64),

    /// Transport or API failure after retries were exhausted.
    #[error("llm unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats() {
        assert_eq!(
            StoreError::Transient("socket closed".into()).to_string(),
            "transient store failure: socket closed"
        );
        assert_eq!(StoreError::NotFound.to_string(), "record not found");
        assert_eq!(
            RoutingError("HTTP 503".into()).to_string(),
            "routing unavailable: HTTP 503"
        );
        assert_eq!(
            LlmError::Timeout(45).to_string(),
            "llm call timed out after 45s"
        );
    }
}
