//! Error taxonomy shared by every core component.

use std::time::Duration;

pub type CoreResult<T> = std::result::Result<T, CoreError>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A referenced primary record does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    /// Duplicate key or constraint violation.
    #[error("conflict: {0}")]
    Conflict(String),
    /// The event bus, search index or primary store is unreachable or timed out.
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),
    /// An event or document failed shape validation.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    /// The caller may not modify the record.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Caller-supplied input was rejected before reaching any store.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl CoreError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn timed_out(operation: &str, after: Duration) -> Self {
        Self::TransportUnavailable(format!(
            "{} timed out after {}ms",
            operation,
            after.as_millis()
        ))
    }

    /// True for failures a caller may reasonably retry later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransportUnavailable(_))
    }
}

/// Runs `fut` with a deadline, mapping expiry to [`CoreError::TransportUnavailable`].
pub async fn with_timeout<T, F>(operation: &str, after: Duration, fut: F) -> CoreResult<T>
where
    F: std::future::Future<Output = CoreResult<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(CoreError::timed_out(operation, after)),
    }
}
