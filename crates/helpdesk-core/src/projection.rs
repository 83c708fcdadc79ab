//! Inline read-model projection.
//!
//! A projection folds a stream into a query document. Stores run every
//! registered projection inside the append unit of work, so a successful
//! append is immediately visible through [`ReadModelStore`].

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::error::DomainError;
use crate::repository::StoredEvent;

/// A typed projection from events to a query document.
pub trait ReadModelProjector: Send + Sync {
    /// The document this projection maintains, one per stream.
    type Document: Serialize + DeserializeOwned + Send + Sync;

    /// Storage name of the projection (table key / document collection).
    const NAME: &'static str;

    /// Applies one event to the current document.
    ///
    /// `document` is `None` until the stream's first event creates it.
    /// Events the projection has no interest in must return the document
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Schema` if an event of a known type has a payload
    /// the projection cannot decode.
    fn apply(
        &self,
        document: Option<Self::Document>,
        event: &StoredEvent,
    ) -> Result<Option<Self::Document>, DomainError>;
}

/// Object-safe projection over JSON documents, used by the stores.
///
/// Implemented for every [`ReadModelProjector`].
pub trait InlineProjection: Send + Sync {
    /// Storage name of the projection.
    fn name(&self) -> &'static str;

    /// Applies `events` in order to `current`, returning the new document.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Schema` if the stored document or an event cannot
    /// be decoded.
    fn project(
        &self,
        current: Option<serde_json::Value>,
        events: &[StoredEvent],
    ) -> Result<Option<serde_json::Value>, DomainError>;
}

impl<P: ReadModelProjector> InlineProjection for P {
    fn name(&self) -> &'static str {
        P::NAME
    }

    fn project(
        &self,
        current: Option<serde_json::Value>,
        events: &[StoredEvent],
    ) -> Result<Option<serde_json::Value>, DomainError> {
        let mut document = current
            .map(serde_json::from_value::<P::Document>)
            .transpose()
            .map_err(|e| {
                DomainError::Schema(format!("stored {} document is unreadable: {e}", P::NAME))
            })?;
        for event in events {
            document = self.apply(document, event)?;
        }
        document
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| DomainError::Infrastructure(format!("{} serialization failed: {e}", P::NAME)))
    }
}

/// Rebuilds a document from scratch by replaying a whole stream.
///
/// # Errors
///
/// Propagates any error from [`ReadModelProjector::apply`].
pub fn replay<P: ReadModelProjector>(
    projector: &P,
    events: &[StoredEvent],
) -> Result<Option<P::Document>, DomainError> {
    events
        .iter()
        .try_fold(None, |document, event| projector.apply(document, event))
}

/// Read access to projected documents.
#[async_trait]
pub trait ReadModelStore: Send + Sync {
    /// Loads the raw document a projection maintains for a stream.
    async fn load_document(
        &self,
        projection: &str,
        stream_id: Uuid,
    ) -> Result<Option<serde_json::Value>, DomainError>;
}

/// Loads and decodes the document `P` maintains for `stream_id`.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if no document exists and
/// `DomainError::Schema` if it cannot be decoded.
pub async fn load_read_model<P: ReadModelProjector>(
    store: &dyn ReadModelStore,
    stream_id: Uuid,
) -> Result<P::Document, DomainError> {
    let raw = store
        .load_document(P::NAME, stream_id)
        .await?
        .ok_or(DomainError::AggregateNotFound(stream_id))?;
    serde_json::from_value(raw)
        .map_err(|e| DomainError::Schema(format!("stored {} document is unreadable: {e}", P::NAME)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct EventCount {
        seen: u32,
        last_sequence: i64,
    }

    struct EventCountProjection;

    impl ReadModelProjector for EventCountProjection {
        type Document = EventCount;
        const NAME: &'static str = "event_count";

        fn apply(
            &self,
            document: Option<EventCount>,
            event: &StoredEvent,
        ) -> Result<Option<EventCount>, DomainError> {
            if event.event_type == "ignored" {
                return Ok(document);
            }
            let mut doc = document.unwrap_or(EventCount {
                seen: 0,
                last_sequence: 0,
            });
            doc.seen += 1;
            doc.last_sequence = event.sequence_number;
            Ok(Some(doc))
        }
    }

    fn event(sequence_number: i64, event_type: &str) -> StoredEvent {
        StoredEvent {
            event_id: Uuid::new_v4(),
            stream_id: Uuid::nil(),
            event_type: event_type.to_owned(),
            payload: serde_json::json!({}),
            sequence_number,
            correlation_id: Uuid::nil(),
            causation_id: Uuid::nil(),
            occurred_at: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_incremental_projection_matches_replay() {
        // Arrange
        let projection = EventCountProjection;
        let events = vec![event(1, "a"), event(2, "ignored"), event(3, "b")];

        // Act
        let first = projection.project(None, &events[..1]).unwrap();
        let incremental = projection.project(first, &events[1..]).unwrap();
        let replayed = replay(&projection, &events).unwrap();

        // Assert
        let incremental: EventCount = serde_json::from_value(incremental.unwrap()).unwrap();
        assert_eq!(Some(incremental.clone()), replayed);
        assert_eq!(incremental.seen, 2);
        assert_eq!(incremental.last_sequence, 3);
    }

    #[test]
    fn test_project_rejects_unreadable_stored_document() {
        let projection = EventCountProjection;

        let result = projection.project(Some(serde_json::json!("garbage")), &[event(1, "a")]);

        assert!(matches!(result, Err(DomainError::Schema(_))));
    }
}
