//! Outbox message handlers for the incident context.

use std::sync::Arc;

use async_trait::async_trait;
use helpdesk_core::error::DomainError;
use helpdesk_core::outbox::{MessageHandler, OutboxEntry};
use tracing::{debug, instrument};

use super::command_handlers::{IncidentServices, handle_try_assign_priority};
use crate::domain::cascade::TRY_ASSIGN_PRIORITY_MESSAGE_TYPE;
use crate::domain::commands::TryAssignPriority;

/// Delivers queued `TryAssignPriority` commands to the command handler.
#[derive(Debug, Clone)]
pub struct TryAssignPriorityHandler {
    services: Arc<IncidentServices>,
}

impl TryAssignPriorityHandler {
    /// Creates a handler that runs commands against `services`.
    #[must_use]
    pub fn new(services: Arc<IncidentServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl MessageHandler for TryAssignPriorityHandler {
    #[instrument(skip_all, fields(entry_id = %entry.id, attempts = entry.attempts))]
    async fn handle(&self, entry: &OutboxEntry) -> Result<(), DomainError> {
        if entry.message_type != TRY_ASSIGN_PRIORITY_MESSAGE_TYPE {
            return Err(DomainError::Schema(format!(
                "expected {TRY_ASSIGN_PRIORITY_MESSAGE_TYPE}, got {}",
                entry.message_type
            )));
        }
        let mut command: TryAssignPriority = serde_json::from_value(entry.payload.clone())
            .map_err(|e| DomainError::Schema(format!("malformed TryAssignPriority: {e}")))?;
        command.correlation_id = entry.correlation_id;

        let result = handle_try_assign_priority(&command, &self.services).await?;
        debug!(
            incident_id = %result.incident_id,
            appended = result.stored_events.len(),
            "handled TryAssignPriority"
        );
        Ok(())
    }
}
