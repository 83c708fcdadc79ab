//! Aggregate root abstraction.

use uuid::Uuid;

use crate::error::DomainError;
use crate::event::DomainEvent;
use crate::repository::StoredEvent;

/// Trait for aggregate roots that reconstitute from event history.
///
/// `apply` must be a pure function of the current state and the event: no
/// clock reads, no id generation, no I/O. Replaying the same stream always
/// yields the same aggregate.
pub trait AggregateRoot: Send + Sync {
    /// The event type this aggregate produces and consumes.
    type Event: DomainEvent;

    /// Returns the aggregate identifier.
    fn aggregate_id(&self) -> Uuid;

    /// Returns the current version (sequence number of the last applied event).
    fn version(&self) -> i64;

    /// Apply an event to mutate internal state (used during reconstitution).
    fn apply(&mut self, event: &Self::Event);

    /// Returns uncommitted events produced by command handling.
    fn uncommitted_events(&self) -> &[Self::Event];

    /// Clears uncommitted events after persistence.
    fn clear_uncommitted_events(&mut self);
}

/// Folds a stored stream into `initial`.
///
/// Every envelope is decoded before it is applied, so an event type the
/// aggregate does not know aborts the fold instead of being skipped.
///
/// # Errors
///
/// Returns `DomainError::Schema` if any stored event cannot be decoded.
pub fn reconstitute<A: AggregateRoot>(
    mut initial: A,
    stored_events: &[StoredEvent],
) -> Result<A, DomainError> {
    for stored in stored_events {
        let event = A::Event::from_stored(stored)?;
        initial.apply(&event);
    }
    Ok(initial)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventMetadata;
    use chrono::{TimeZone, Utc};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Added {
        amount: i64,
    }

    #[derive(Debug, Clone)]
    struct TallyEvent {
        metadata: EventMetadata,
        kind: Added,
    }

    impl DomainEvent for TallyEvent {
        fn event_type(&self) -> &'static str {
            "tally.added"
        }

        fn to_payload(&self) -> serde_json::Value {
            serde_json::to_value(&self.kind).expect("Added serialization is infallible")
        }

        fn metadata(&self) -> &EventMetadata {
            &self.metadata
        }

        fn from_stored(stored: &StoredEvent) -> Result<Self, DomainError> {
            if stored.event_type != "tally.added" {
                return Err(DomainError::Schema(format!(
                    "unknown event type {}",
                    stored.event_type
                )));
            }
            let kind = serde_json::from_value(stored.payload.clone())
                .map_err(|e| DomainError::Schema(e.to_string()))?;
            Ok(Self {
                metadata: EventMetadata::from_stored(stored),
                kind,
            })
        }
    }

    #[derive(Debug, PartialEq)]
    struct Tally {
        id: Uuid,
        total: i64,
        version: i64,
    }

    impl AggregateRoot for Tally {
        type Event = TallyEvent;

        fn aggregate_id(&self) -> Uuid {
            self.id
        }

        fn version(&self) -> i64 {
            self.version
        }

        fn apply(&mut self, event: &Self::Event) {
            self.total += event.kind.amount;
            self.version = event.metadata.sequence_number;
        }

        fn uncommitted_events(&self) -> &[Self::Event] {
            &[]
        }

        fn clear_uncommitted_events(&mut self) {}
    }

    fn stored(stream_id: Uuid, sequence_number: i64, event_type: &str, amount: i64) -> StoredEvent {
        StoredEvent {
            event_id: Uuid::new_v4(),
            stream_id,
            event_type: event_type.to_owned(),
            payload: serde_json::json!({ "amount": amount }),
            sequence_number,
            correlation_id: Uuid::nil(),
            causation_id: Uuid::nil(),
            occurred_at: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_reconstitute_is_deterministic() {
        // Arrange
        let id = Uuid::new_v4();
        let events = vec![
            stored(id, 1, "tally.added", 4),
            stored(id, 2, "tally.added", -1),
            stored(id, 3, "tally.added", 10),
        ];
        let fresh = || Tally {
            id,
            total: 0,
            version: 0,
        };

        // Act
        let first = reconstitute(fresh(), &events).unwrap();
        let second = reconstitute(fresh(), &events).unwrap();

        // Assert
        assert_eq!(first, second);
        assert_eq!(first.total, 13);
        assert_eq!(first.version, 3);
    }

    #[test]
    fn test_reconstitute_fails_on_unknown_event_type() {
        // Arrange
        let id = Uuid::new_v4();
        let events = vec![
            stored(id, 1, "tally.added", 4),
            stored(id, 2, "tally.renamed", 0),
        ];
        let initial = Tally {
            id,
            total: 0,
            version: 0,
        };

        // Act
        let result = reconstitute(initial, &events);

        // Assert
        match result {
            Err(DomainError::Schema(msg)) => assert!(msg.contains("tally.renamed")),
            other => panic!("expected Schema, got {other:?}"),
        }
    }
}
