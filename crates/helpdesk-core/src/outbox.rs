//! Transactional outbox.
//!
//! Outbox entries are written by the store in the same unit of work as the
//! events whose cascade rules produced them. A relay later claims, delivers,
//! and acknowledges them.
//!
//! Entry lifecycle: `Pending -> Dispatching -> Acknowledged`, or
//! `Pending -> Dispatching -> Pending` when delivery fails. A `Dispatching`
//! entry whose lease expires is treated as pending again, which covers a
//! relay that crashed between delivery and acknowledgement.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cascade::OutgoingMessage;
use crate::error::DomainError;

/// Delivery state of an outbox entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    /// Waiting to be claimed by a relay.
    Pending,
    /// Claimed by a relay; delivery in progress.
    Dispatching,
    /// Delivered and confirmed. Terminal.
    Acknowledged,
}

impl OutboxStatus {
    /// Storage representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Dispatching => "dispatching",
            Self::Acknowledged => "acknowledged",
        }
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboxStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "dispatching" => Ok(Self::Dispatching),
            "acknowledged" => Ok(Self::Acknowledged),
            other => Err(DomainError::Schema(format!("unknown outbox status {other}"))),
        }
    }
}

/// A durable, queued message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    /// Unique entry identifier.
    pub id: Uuid,
    /// Store-assigned creation order.
    pub position: i64,
    /// Handler or transport destination name.
    pub destination: String,
    /// Message type name.
    pub message_type: String,
    /// Serialized command or message body.
    pub payload: serde_json::Value,
    /// Ordering group; one in-flight entry per key.
    pub ordering_key: String,
    /// Current delivery state.
    pub status: OutboxStatus,
    /// Number of times the entry has been claimed.
    pub attempts: i32,
    /// Correlation ID inherited from the triggering event.
    pub correlation_id: Uuid,
    /// The triggering event's ID.
    pub causation_id: Uuid,
    /// When the producing transaction wrote the entry.
    pub created_at: DateTime<Utc>,
    /// When the entry was last claimed.
    pub claimed_at: Option<DateTime<Utc>>,
    /// Error recorded by the last failed delivery.
    pub last_error: Option<String>,
}

impl OutboxEntry {
    /// Creates a pending entry from a cascade message.
    #[must_use]
    pub fn pending(message: OutgoingMessage, position: i64, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            position,
            destination: message.destination,
            message_type: message.message_type,
            payload: message.payload,
            ordering_key: message.ordering_key,
            status: OutboxStatus::Pending,
            attempts: 0,
            correlation_id: message.correlation_id,
            causation_id: message.causation_id,
            created_at,
            claimed_at: None,
            last_error: None,
        }
    }

    /// Returns `true` if a relay may claim this entry at `now`.
    #[must_use]
    pub fn is_claimable(&self, now: DateTime<Utc>, lease: Duration) -> bool {
        match self.status {
            OutboxStatus::Pending => true,
            OutboxStatus::Dispatching => self.claimed_at.is_none_or(|at| at + lease <= now),
            OutboxStatus::Acknowledged => false,
        }
    }

    /// Returns `true` if `claim` is the claim currently held on this entry.
    #[must_use]
    pub fn is_held_by(&self, claim: &OutboxEntry) -> bool {
        self.id == claim.id
            && self.status == OutboxStatus::Dispatching
            && self.claimed_at.is_some()
            && self.claimed_at == claim.claimed_at
    }
}

/// Storage operations the relay needs.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Claims up to `limit` entries, at most one per ordering key: the oldest
    /// unacknowledged entry of each key, provided it is claimable at `now`.
    /// Claimed entries move to `Dispatching` with `attempts` incremented.
    async fn claim_pending(
        &self,
        limit: usize,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<Vec<OutboxEntry>, DomainError>;

    /// Marks a delivered entry as `Acknowledged`.
    ///
    /// `entry` is the claimed copy returned by [`claim_pending`](Self::claim_pending).
    /// Returns `false` and changes nothing when that claim is no longer the
    /// current one, i.e. the lease expired and the entry was claimed again.
    async fn acknowledge(&self, entry: &OutboxEntry) -> Result<bool, DomainError>;

    /// Returns a claimed entry to `Pending` after a failed delivery.
    ///
    /// Same claim check as [`acknowledge`](Self::acknowledge).
    async fn release(&self, entry: &OutboxEntry, error: &str) -> Result<bool, DomainError>;

    /// Number of entries not yet acknowledged.
    async fn pending_count(&self) -> Result<u64, DomainError>;
}

/// Receives outbox entries for one destination.
///
/// Delivery is at-least-once, so handlers must tolerate seeing the same entry
/// more than once.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handles one entry. `Ok(())` acknowledges it.
    async fn handle(&self, entry: &OutboxEntry) -> Result<(), DomainError>;
}
