//! Event log abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Stored representation of a domain event (the event envelope).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Stream this event belongs to.
    pub stream_id: Uuid,
    /// Event type name for deserialization routing.
    pub event_type: String,
    /// Serialized event payload.
    pub payload: serde_json::Value,
    /// Sequence number within the stream.
    pub sequence_number: i64,
    /// Correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Causation ID linking to the causing event/command.
    pub causation_id: Uuid,
    /// Timestamp of event creation.
    pub occurred_at: chrono::DateTime<chrono::Utc>,
}

/// Repository trait for loading and appending domain events.
///
/// Implementations treat `append_events` as the unit of work: the events,
/// every inline projection update, and every outbox entry produced by the
/// cascade rules are committed together or not at all.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Load all events for a given stream, ordered by sequence number.
    /// Returns an empty vector if the stream does not exist.
    async fn load_events(&self, stream_id: Uuid) -> Result<Vec<StoredEvent>, DomainError>;

    /// Append new events to a stream with optimistic concurrency and return
    /// the new stream version.
    ///
    /// `expected_version` is the last known sequence number; `0` means the
    /// stream must not exist yet.
    ///
    /// Appending a batch that is already stored at `expected_version + 1..`
    /// (same event IDs, same order) succeeds without writing anything, so a
    /// retry after a lost commit acknowledgement is safe.
    async fn append_events(
        &self,
        stream_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<i64, DomainError>;
}

/// Checks that a batch is addressed to `stream_id` and numbered
/// `expected_version + 1, expected_version + 2, ...` without gaps.
///
/// # Errors
///
/// Returns `DomainError::Validation` describing the first offending event.
pub fn check_batch(
    stream_id: Uuid,
    expected_version: i64,
    events: &[StoredEvent],
) -> Result<(), DomainError> {
    if expected_version < 0 {
        return Err(DomainError::Validation(format!(
            "expected version must not be negative, got {expected_version}"
        )));
    }
    for (offset, event) in (1_i64..).zip(events) {
        if event.stream_id != stream_id {
            return Err(DomainError::Validation(format!(
                "event {} belongs to stream {}, not {stream_id}",
                event.event_id, event.stream_id
            )));
        }
        let wanted = expected_version + offset;
        if event.sequence_number != wanted {
            return Err(DomainError::Validation(format!(
                "event {} has sequence number {}, expected {wanted}",
                event.event_id, event.sequence_number
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn event(stream_id: Uuid, sequence_number: i64) -> StoredEvent {
        StoredEvent {
            event_id: Uuid::new_v4(),
            stream_id,
            event_type: "test.event".to_owned(),
            payload: serde_json::json!({}),
            sequence_number,
            correlation_id: Uuid::new_v4(),
            causation_id: Uuid::new_v4(),
            occurred_at: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_check_batch_accepts_consecutive_sequence_numbers() {
        let stream_id = Uuid::new_v4();
        let batch = vec![event(stream_id, 3), event(stream_id, 4)];

        assert!(check_batch(stream_id, 2, &batch).is_ok());
    }

    #[test]
    fn test_check_batch_rejects_gap() {
        let stream_id = Uuid::new_v4();
        let batch = vec![event(stream_id, 1), event(stream_id, 3)];

        let result = check_batch(stream_id, 0, &batch);

        match result {
            Err(DomainError::Validation(msg)) => assert!(msg.contains("expected 2")),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_check_batch_rejects_foreign_stream() {
        let stream_id = Uuid::new_v4();
        let batch = vec![event(Uuid::new_v4(), 1)];

        assert!(matches!(
            check_batch(stream_id, 0, &batch),
            Err(DomainError::Validation(_))
        ));
    }
}
