//! The relay loop.
//!
//! Each pass claims a batch (at most one entry per ordering key), delivers
//! the batch concurrently, and then acknowledges or releases every entry. A
//! pass always runs to completion; cancellation is only observed between
//! passes.

use std::sync::Arc;

use futures::future::join_all;
use helpdesk_core::clock::{Clock, SystemClock};
use helpdesk_core::error::DomainError;
use helpdesk_core::outbox::{OutboxEntry, OutboxStore};
use helpdesk_core::retry::RetryPolicy;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::registry::HandlerRegistry;

/// What one relay pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    /// Entries claimed from the store.
    pub claimed: usize,
    /// Entries delivered and acknowledged.
    pub acknowledged: usize,
    /// Entries returned to pending after a failed delivery.
    pub released: usize,
}

enum Outcome {
    Acknowledged,
    Released,
    /// Not settled: the store call failed, or the lease expired and another
    /// claim now owns the entry. Either way it will be delivered again.
    Unsettled,
}

/// Delivers outbox entries to registered handlers.
pub struct OutboxRelay {
    store: Arc<dyn OutboxStore>,
    registry: HandlerRegistry,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    config: RelayConfig,
    permits: Semaphore,
}

impl std::fmt::Debug for OutboxRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboxRelay")
            .field("registry", &self.registry)
            .field("retry", &self.retry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OutboxRelay {
    /// Creates a relay with the default retry schedule and the system clock.
    #[must_use]
    pub fn new(store: Arc<dyn OutboxStore>, registry: HandlerRegistry, config: RelayConfig) -> Self {
        Self {
            store,
            registry,
            retry: RetryPolicy::default(),
            clock: Arc::new(SystemClock),
            permits: Semaphore::new(config.max_in_flight.max(1)),
            config,
        }
    }

    /// Replaces the retry policy used for store calls and deliveries.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replaces the clock used to stamp claims.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Runs one claim-deliver-settle pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the claim itself fails after retries. Delivery
    /// failures are not errors; they show up as `released` in the report.
    pub async fn run_once(&self) -> Result<RelayReport, DomainError> {
        let lease = chrono::Duration::from_std(self.config.lease)
            .map_err(|e| DomainError::Infrastructure(format!("invalid relay lease: {e}")))?;
        let now = self.clock.now();
        let limit = self.config.max_in_flight.max(1);

        let batch = self
            .retry
            .run("outbox claim", || self.store.claim_pending(limit, now, lease))
            .await?;

        let mut report = RelayReport {
            claimed: batch.len(),
            ..RelayReport::default()
        };
        if batch.is_empty() {
            return Ok(report);
        }
        debug!(claimed = batch.len(), "claimed outbox batch");

        for outcome in join_all(batch.iter().map(|entry| self.dispatch(entry))).await {
            match outcome {
                Outcome::Acknowledged => report.acknowledged += 1,
                Outcome::Released => report.released += 1,
                Outcome::Unsettled => {}
            }
        }
        Ok(report)
    }

    /// Polls until `shutdown` is cancelled. Sleeps for the poll interval
    /// whenever a pass delivers nothing.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(destinations = ?self.registry.destinations(), "outbox relay started");

        while !shutdown.is_cancelled() {
            let idle = match self.run_once().await {
                Ok(report) => report.acknowledged == 0,
                Err(err) => {
                    error!(error = %err, "outbox relay pass failed");
                    true
                }
            };

            if idle {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    () = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
        }

        info!("outbox relay stopped");
    }

    /// Runs [`run`](Self::run) on a background task.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    async fn dispatch(&self, entry: &OutboxEntry) -> Outcome {
        // The semaphore is never closed.
        let Ok(_permit) = self.permits.acquire().await else {
            return Outcome::Unsettled;
        };

        match self.deliver(entry).await {
            Ok(()) => {
                match self
                    .retry
                    .run("outbox acknowledge", || self.store.acknowledge(entry))
                    .await
                {
                    Ok(true) => {
                        debug!(
                            entry_id = %entry.id,
                            destination = %entry.destination,
                            ordering_key = %entry.ordering_key,
                            "outbox entry delivered"
                        );
                        Outcome::Acknowledged
                    }
                    Ok(false) => {
                        warn!(entry_id = %entry.id, "claim lost before acknowledgement");
                        Outcome::Unsettled
                    }
                    Err(err) => {
                        error!(entry_id = %entry.id, error = %err, "failed to acknowledge delivered entry");
                        Outcome::Unsettled
                    }
                }
            }
            Err(err) => {
                warn!(
                    entry_id = %entry.id,
                    destination = %entry.destination,
                    attempts = entry.attempts,
                    error = %err,
                    "outbox delivery failed"
                );
                let reason = err.to_string();
                match self
                    .retry
                    .run("outbox release", || self.store.release(entry, &reason))
                    .await
                {
                    Ok(true) => Outcome::Released,
                    Ok(false) => {
                        warn!(entry_id = %entry.id, "claim lost before release");
                        Outcome::Unsettled
                    }
                    Err(err) => {
                        error!(entry_id = %entry.id, error = %err, "failed to release entry");
                        Outcome::Unsettled
                    }
                }
            }
        }
    }

    async fn deliver(&self, entry: &OutboxEntry) -> Result<(), DomainError> {
        let handler = self.registry.get(&entry.destination).ok_or_else(|| {
            DomainError::Infrastructure(format!(
                "no handler registered for destination {}",
                entry.destination
            ))
        })?;
        let timeout = self.config.dispatch_timeout;

        self.retry
            .run("outbox dispatch", || async move {
                tokio::time::timeout(timeout, handler.handle(entry))
                    .await
                    .unwrap_or_else(|_| {
                        Err(DomainError::Transient(format!(
                            "delivery timed out after {timeout:?}"
                        )))
                    })
            })
            .await
    }
}
