//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An aggregate (stream or read model document) was not found.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(Uuid),

    /// Optimistic concurrency conflict.
    #[error("concurrency conflict on aggregate {aggregate_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The aggregate that had the conflict.
        aggregate_id: Uuid,
        /// The expected version.
        expected: i64,
        /// The actual version found.
        actual: i64,
    },

    /// A business-rule violation in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// A stored event could not be decoded (unknown type or malformed payload).
    #[error("schema error: {0}")]
    Schema(String),

    /// A failure that may succeed if the operation is attempted again.
    #[error("transient infrastructure error: {0}")]
    Transient(String),

    /// An infrastructure/persistence error that will not go away on retry.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl DomainError {
    /// Returns `true` if the retry policy may attempt the operation again.
    ///
    /// Concurrency conflicts are deliberately excluded: the caller has to
    /// reload the stream and re-run its decision against the new state.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_errors_are_retryable() {
        assert!(DomainError::Transient("connection reset".into()).is_transient());
        assert!(!DomainError::Infrastructure("disk full".into()).is_transient());
        assert!(!DomainError::Validation("bad".into()).is_transient());
        assert!(!DomainError::Schema("unknown event".into()).is_transient());
        assert!(!DomainError::AggregateNotFound(Uuid::new_v4()).is_transient());
        assert!(
            !DomainError::ConcurrencyConflict {
                aggregate_id: Uuid::new_v4(),
                expected: 3,
                actual: 5,
            }
            .is_transient()
        );
    }

    #[test]
    fn test_concurrency_conflict_message_names_both_versions() {
        let id = Uuid::new_v4();
        let err = DomainError::ConcurrencyConflict {
            aggregate_id: id,
            expected: 3,
            actual: 5,
        };

        assert_eq!(
            err.to_string(),
            format!("concurrency conflict on aggregate {id}: expected version 3, found 5")
        );
    }
}
