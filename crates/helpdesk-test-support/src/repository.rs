//! Mock `EventRepository` implementations.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use helpdesk_core::error::DomainError;
use helpdesk_core::repository::{EventRepository, StoredEvent};
use uuid::Uuid;

use crate::clock::fixed_now;

/// Builds a `StoredEvent` with fresh IDs and the fixed test instant.
#[must_use]
pub fn stored_event(
    stream_id: Uuid,
    sequence_number: i64,
    event_type: &str,
    payload: serde_json::Value,
) -> StoredEvent {
    StoredEvent {
        event_id: Uuid::new_v4(),
        stream_id,
        event_type: event_type.to_owned(),
        payload,
        sequence_number,
        correlation_id: Uuid::new_v4(),
        causation_id: Uuid::new_v4(),
        occurred_at: fixed_now(),
    }
}

/// Every stream is empty; appends succeed without storing anything.
#[derive(Debug)]
pub struct EmptyEventRepository;

#[async_trait]
impl EventRepository for EmptyEventRepository {
    async fn load_events(&self, _stream_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(vec![])
    }

    async fn append_events(
        &self,
        _stream_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<i64, DomainError> {
        Ok(expected_version + i64::try_from(events.len()).unwrap_or(i64::MAX))
    }
}

/// Fails every call with a fatal infrastructure error.
#[derive(Debug)]
pub struct FailingEventRepository;

#[async_trait]
impl EventRepository for FailingEventRepository {
    async fn load_events(&self, _stream_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn append_events(
        &self,
        _stream_id: Uuid,
        _expected_version: i64,
        _events: &[StoredEvent],
    ) -> Result<i64, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }
}

/// Wraps a real repository and fails the first `failures` appends with a
/// transient error. Loads are always delegated.
pub struct FlakyEventRepository {
    inner: Arc<dyn EventRepository>,
    failures: AtomicUsize,
    append_attempts: AtomicUsize,
    after_commit: bool,
}

impl FlakyEventRepository {
    /// Fails the next `failures` appends before delegating to `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn EventRepository>, failures: usize) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(failures),
            append_attempts: AtomicUsize::new(0),
            after_commit: false,
        }
    }

    /// Delegates every append to `inner`, then reports the next `failures`
    /// successful ones as transient errors: the write landed, the caller
    /// never heard back.
    #[must_use]
    pub fn losing_commit_acks(inner: Arc<dyn EventRepository>, failures: usize) -> Self {
        Self {
            after_commit: true,
            ..Self::new(inner, failures)
        }
    }

    fn take_failure(&self) -> bool {
        self.failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Number of `append_events` calls seen so far, failed ones included.
    #[must_use]
    pub fn append_attempts(&self) -> usize {
        self.append_attempts.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for FlakyEventRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlakyEventRepository")
            .field("failures", &self.failures)
            .field("append_attempts", &self.append_attempts)
            .field("after_commit", &self.after_commit)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EventRepository for FlakyEventRepository {
    async fn load_events(&self, stream_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        self.inner.load_events(stream_id).await
    }

    async fn append_events(
        &self,
        stream_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<i64, DomainError> {
        self.append_attempts.fetch_add(1, Ordering::SeqCst);
        if self.after_commit {
            let version = self
                .inner
                .append_events(stream_id, expected_version, events)
                .await?;
            if self.take_failure() {
                return Err(DomainError::Transient(
                    "connection reset during commit".into(),
                ));
            }
            return Ok(version);
        }
        if self.take_failure() {
            return Err(DomainError::Transient("connection reset by peer".into()));
        }
        self.inner
            .append_events(stream_id, expected_version, events)
            .await
    }
}
