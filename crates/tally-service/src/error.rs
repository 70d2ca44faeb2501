//! Error types for the metrics service.

use tally_store::StoreError;
use thiserror::Error;

/// Result type alias for metrics service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors reported by [`crate::MetricsService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Unparseable, NaN or infinite value, or a JSON envelope missing its
    /// id or its value field.
    #[error("bad value: {0}")]
    BadValue(String),

    /// Metric type other than `gauge` or `counter`.
    #[error("bad metric type: {0:?}")]
    BadKind(String),

    /// Empty metric name.
    #[error("metric name is required")]
    MissingName,

    /// The storage backend failed to apply or read a value.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// The durable state could not be written or read back.
    #[error("persistence error: {0}")]
    Persist(#[source] StoreError),
}
