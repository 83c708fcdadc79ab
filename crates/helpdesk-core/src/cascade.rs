//! Event-to-command cascading.
//!
//! A cascade rule turns one newly appended event into at most one outgoing
//! message. Rules are plain function pointers registered in a table at
//! startup, so they cannot hold state or reach for I/O. The router runs
//! inside the append unit of work and hands its output to the outbox.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;
use crate::repository::StoredEvent;

/// A message produced by a cascade rule, waiting to be written to the outbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Handler or transport destination name.
    pub destination: String,
    /// Message type name, used by the receiving handler to decode `payload`.
    pub message_type: String,
    /// Serialized command or message body.
    pub payload: serde_json::Value,
    /// Entries sharing a key are dispatched one at a time in creation order.
    pub ordering_key: String,
    /// Correlation ID inherited from the triggering event.
    pub correlation_id: Uuid,
    /// The triggering event's ID.
    pub causation_id: Uuid,
}

impl OutgoingMessage {
    /// Builds a message caused by `trigger`, inheriting its correlation ID.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if `body` cannot be serialized.
    pub fn caused_by<T: Serialize>(
        trigger: &StoredEvent,
        destination: &str,
        message_type: &str,
        ordering_key: String,
        body: &T,
    ) -> Result<Self, DomainError> {
        let payload = serde_json::to_value(body).map_err(|e| {
            DomainError::Infrastructure(format!("{message_type} serialization failed: {e}"))
        })?;
        Ok(Self {
            destination: destination.to_owned(),
            message_type: message_type.to_owned(),
            payload,
            ordering_key,
            correlation_id: trigger.correlation_id,
            causation_id: trigger.event_id,
        })
    }
}

/// Signature of a cascade rule. `Ok(None)` means the rule matched the event
/// type but decided not to emit anything.
pub type CascadeFn = fn(&StoredEvent) -> Result<Option<OutgoingMessage>, DomainError>;

/// One row of the cascade table.
#[derive(Debug, Clone, Copy)]
pub struct CascadeRule {
    /// Rule name, for logs.
    pub name: &'static str,
    /// Event type the rule fires on.
    pub event_type: &'static str,
    /// The mapping itself.
    pub map: CascadeFn,
}

/// Evaluates every registered rule against appended events.
#[derive(Debug, Clone, Default)]
pub struct CascadeRouter {
    rules: Vec<CascadeRule>,
}

impl CascadeRouter {
    /// Creates a router over a fixed rule table.
    #[must_use]
    pub fn new(rules: Vec<CascadeRule>) -> Self {
        Self { rules }
    }

    /// Returns the registered rules.
    #[must_use]
    pub fn rules(&self) -> &[CascadeRule] {
        &self.rules
    }

    /// Runs every rule matching `event`'s type, in registration order.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a matching rule.
    pub fn on_event_appended(&self, event: &StoredEvent) -> Result<Vec<OutgoingMessage>, DomainError> {
        let mut messages = Vec::new();
        for rule in self.rules.iter().filter(|r| r.event_type == event.event_type) {
            if let Some(message) = (rule.map)(event)? {
                tracing::debug!(
                    rule = rule.name,
                    event_id = %event.event_id,
                    destination = %message.destination,
                    "cascade rule produced a message"
                );
                messages.push(message);
            }
        }
        Ok(messages)
    }

    /// Runs [`on_event_appended`](Self::on_event_appended) over a batch, in
    /// event order.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a matching rule.
    pub fn route(&self, events: &[StoredEvent]) -> Result<Vec<OutgoingMessage>, DomainError> {
        let mut messages = Vec::new();
        for event in events {
            messages.extend(self.on_event_appended(event)?);
        }
        Ok(messages)
    }
}
