//! A `MessageHandler` that records deliveries.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use helpdesk_core::error::DomainError;
use helpdesk_core::outbox::{MessageHandler, OutboxEntry};

/// Records every successful delivery in order, and counts deliveries that
/// overlapped another in-flight delivery with the same ordering key.
///
/// Optionally sleeps before completing and fails the first few deliveries
/// with a transient error.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    delivered: Mutex<Vec<OutboxEntry>>,
    in_flight: Mutex<HashSet<String>>,
    overlaps: AtomicUsize,
    calls: AtomicUsize,
    failures: AtomicUsize,
    delay: Duration,
}

impl RecordingHandler {
    /// A handler that succeeds immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps for `delay` inside every delivery.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fails the first `failures` deliveries with `DomainError::Transient`.
    #[must_use]
    pub fn failing_first(self, failures: usize) -> Self {
        self.failures.store(failures, Ordering::SeqCst);
        self
    }

    /// Successfully delivered entries, in completion order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn delivered(&self) -> Vec<OutboxEntry> {
        self.delivered.lock().unwrap().clone()
    }

    /// Payloads of delivered entries with the given ordering key.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn delivered_payloads(&self, ordering_key: &str) -> Vec<serde_json::Value> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.ordering_key == ordering_key)
            .map(|e| e.payload.clone())
            .collect()
    }

    /// Number of times two deliveries for one key were in flight together.
    #[must_use]
    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    /// Total `handle` calls, failed ones included.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn handle(&self, entry: &OutboxEntry) -> Result<(), DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self
            .in_flight
            .lock()
            .unwrap()
            .insert(entry.ordering_key.clone())
        {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.in_flight.lock().unwrap().remove(&entry.ordering_key);

        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(DomainError::Transient("downstream unavailable".into()));
        }

        self.delivered.lock().unwrap().push(entry.clone());
        Ok(())
    }
}
