//! In-memory event store.
//!
//! Used by tests, local tooling, and anything that wants the full append
//! semantics without a database. The whole unit of work runs under one write
//! lock: projections and cascades are computed first, and state is only
//! touched once every step has succeeded.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use tracing::{debug, instrument};
use uuid::Uuid;

use helpdesk_core::clock::{Clock, SystemClock};
use helpdesk_core::error::DomainError;
use helpdesk_core::outbox::{OutboxEntry, OutboxStatus, OutboxStore};
use helpdesk_core::pipeline::AppendPipeline;
use helpdesk_core::projection::ReadModelStore;
use helpdesk_core::repository::{EventRepository, StoredEvent, check_batch};

#[derive(Debug, Default)]
struct State {
    streams: HashMap<Uuid, Vec<StoredEvent>>,
    documents: HashMap<(String, Uuid), serde_json::Value>,
    outbox: Vec<OutboxEntry>,
    last_position: i64,
}

/// Event log, read-model store, and outbox store held in process memory.
#[derive(Clone)]
pub struct InMemoryEventStore {
    state: Arc<RwLock<State>>,
    pipeline: AppendPipeline,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for InMemoryEventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventStore")
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl InMemoryEventStore {
    /// Creates an empty store running `pipeline` on every append.
    #[must_use]
    pub fn new(pipeline: AppendPipeline) -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            pipeline,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock used to stamp outbox entries.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns a snapshot of every outbox entry in creation order.
    #[must_use]
    pub fn outbox_entries(&self) -> Vec<OutboxEntry> {
        self.state.read().outbox.clone()
    }

    /// Returns the current version of a stream (`0` if it does not exist).
    #[must_use]
    pub fn stream_version(&self, stream_id: Uuid) -> i64 {
        current_version(&self.state.read().streams, stream_id)
    }
}

fn current_version(streams: &HashMap<Uuid, Vec<StoredEvent>>, stream_id: Uuid) -> i64 {
    streams
        .get(&stream_id)
        .and_then(|events| events.last())
        .map_or(0, |e| e.sequence_number)
}

fn find_entry(outbox: &mut [OutboxEntry], id: Uuid) -> Result<&mut OutboxEntry, DomainError> {
    outbox
        .iter_mut()
        .find(|e| e.id == id)
        .ok_or_else(|| DomainError::Infrastructure(format!("outbox entry {id} not found")))
}

/// Returns `true` if `events` is already stored right after `expected_version`.
///
/// An append whose commit landed but whose caller saw an error is retried with
/// the same batch; the retry must succeed instead of reporting a conflict.
fn already_appended(
    stored: &[StoredEvent],
    expected_version: i64,
    events: &[StoredEvent],
) -> bool {
    let Ok(start) = usize::try_from(expected_version) else {
        return false;
    };
    stored.get(start..start + events.len()).is_some_and(|window| {
        window
            .iter()
            .zip(events)
            .all(|(stored, event)| stored.event_id == event.event_id)
    })
}

#[async_trait]
impl EventRepository for InMemoryEventStore {
    async fn load_events(&self, stream_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(self
            .state
            .read()
            .streams
            .get(&stream_id)
            .cloned()
            .unwrap_or_default())
    }

    #[instrument(skip(self, events), fields(event_count = events.len()))]
    async fn append_events(
        &self,
        stream_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<i64, DomainError> {
        check_batch(stream_id, expected_version, events)?;
        let appended = i64::try_from(events.len())
            .map_err(|e| DomainError::Validation(format!("batch too large: {e}")))?;
        let now = self.clock.now();

        let mut guard = self.state.write();
        let State {
            streams,
            documents,
            outbox,
            last_position,
        } = &mut *guard;

        let actual = current_version(streams, stream_id);
        if actual != expected_version {
            if !events.is_empty()
                && streams
                    .get(&stream_id)
                    .is_some_and(|stored| already_appended(stored, expected_version, events))
            {
                debug!(%stream_id, expected_version, "batch already appended");
                return Ok(expected_version + appended);
            }
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id: stream_id,
                expected: expected_version,
                actual,
            });
        }
        if events.is_empty() {
            return Ok(actual);
        }

        // Stage everything that can fail before mutating anything.
        let mut staged_documents = Vec::with_capacity(self.pipeline.projections().len());
        for projection in self.pipeline.projections() {
            let key = (projection.name().to_owned(), stream_id);
            let next = projection.project(documents.get(&key).cloned(), events)?;
            staged_documents.push((key, next));
        }
        let messages = self.pipeline.cascade(events)?;

        streams
            .entry(stream_id)
            .or_default()
            .extend_from_slice(events);
        for (key, document) in staged_documents {
            match document {
                Some(document) => {
                    documents.insert(key, document);
                }
                None => {
                    documents.remove(&key);
                }
            }
        }
        for message in messages {
            *last_position += 1;
            outbox.push(OutboxEntry::pending(message, *last_position, now));
        }

        let new_version = expected_version + appended;
        debug!(%stream_id, new_version, "appended events");
        Ok(new_version)
    }
}

#[async_trait]
impl ReadModelStore for InMemoryEventStore {
    async fn load_document(
        &self,
        projection: &str,
        stream_id: Uuid,
    ) -> Result<Option<serde_json::Value>, DomainError> {
        Ok(self
            .state
            .read()
            .documents
            .get(&(projection.to_owned(), stream_id))
            .cloned())
    }
}

#[async_trait]
impl OutboxStore for InMemoryEventStore {
    async fn claim_pending(
        &self,
        limit: usize,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<Vec<OutboxEntry>, DomainError> {
        let mut guard = self.state.write();
        let mut seen_keys = HashSet::new();
        let mut claimed = Vec::new();

        for entry in guard.outbox.iter_mut() {
            if claimed.len() >= limit {
                break;
            }
            if entry.status == OutboxStatus::Acknowledged {
                continue;
            }
            // Only the oldest unacknowledged entry of a key is eligible.
            if !seen_keys.insert(entry.ordering_key.clone()) {
                continue;
            }
            if entry.is_claimable(now, lease) {
                entry.status = OutboxStatus::Dispatching;
                entry.claimed_at = Some(now);
                entry.attempts += 1;
                claimed.push(entry.clone());
            }
        }
        Ok(claimed)
    }

    async fn acknowledge(&self, claim: &OutboxEntry) -> Result<bool, DomainError> {
        let mut guard = self.state.write();
        let entry = find_entry(&mut guard.outbox, claim.id)?;
        if !entry.is_held_by(claim) {
            return Ok(false);
        }
        entry.status = OutboxStatus::Acknowledged;
        Ok(true)
    }

    async fn release(&self, claim: &OutboxEntry, error: &str) -> Result<bool, DomainError> {
        let mut guard = self.state.write();
        let entry = find_entry(&mut guard.outbox, claim.id)?;
        if !entry.is_held_by(claim) {
            return Ok(false);
        }
        entry.status = OutboxStatus::Pending;
        entry.claimed_at = None;
        entry.last_error = Some(error.to_owned());
        Ok(true)
    }

    async fn pending_count(&self) -> Result<u64, DomainError> {
        let count = self
            .state
            .read()
            .outbox
            .iter()
            .filter(|e| e.status != OutboxStatus::Acknowledged)
            .count();
        u64::try_from(count).map_err(|e| DomainError::Infrastructure(e.to_string()))
    }
}
