//! Cascade rules for the incident context.

use helpdesk_core::cascade::{CascadeRule, OutgoingMessage};
use helpdesk_core::error::DomainError;
use helpdesk_core::repository::StoredEvent;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::commands::TryAssignPriority;
use super::events::{
    INCIDENT_CATEGORISED_EVENT_TYPE, INCIDENT_PRIORITISED_EVENT_TYPE, IncidentCategorised,
    IncidentPrioritised, decode_payload,
};
use super::values::IncidentPriority;

/// Destination handled in-process by the `TryAssignPriority` handler.
pub const TRY_ASSIGN_PRIORITY_DESTINATION: &str = "incident.try_assign_priority";
/// Message type of a queued [`TryAssignPriority`].
pub const TRY_ASSIGN_PRIORITY_MESSAGE_TYPE: &str = "TryAssignPriority";
/// Destination published to the external notification transport.
pub const NOTIFICATIONS_DESTINATION: &str = "notifications";
/// Message type of a queued [`RingAllTheAlarms`].
pub const RING_ALL_THE_ALARMS_MESSAGE_TYPE: &str = "RingAllTheAlarms";

/// Notification that a critical incident needs attention now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingAllTheAlarms {
    /// The incident identifier.
    pub incident_id: Uuid,
}

/// The registered rule table, in evaluation order.
#[must_use]
pub fn cascade_rules() -> Vec<CascadeRule> {
    vec![
        CascadeRule {
            name: "assign_priority_on_categorisation",
            event_type: INCIDENT_CATEGORISED_EVENT_TYPE,
            map: assign_priority_on_categorisation,
        },
        CascadeRule {
            name: "ring_alarms_on_critical_priority",
            event_type: INCIDENT_PRIORITISED_EVENT_TYPE,
            map: ring_alarms_on_critical_priority,
        },
    ]
}

fn assign_priority_on_categorisation(
    event: &StoredEvent,
) -> Result<Option<OutgoingMessage>, DomainError> {
    let categorised: IncidentCategorised = decode_payload(event)?;
    let command = TryAssignPriority {
        correlation_id: event.correlation_id,
        incident_id: categorised.incident_id,
        triggered_by: event.event_id,
    };
    OutgoingMessage::caused_by(
        event,
        TRY_ASSIGN_PRIORITY_DESTINATION,
        TRY_ASSIGN_PRIORITY_MESSAGE_TYPE,
        categorised.incident_id.to_string(),
        &command,
    )
    .map(Some)
}

fn ring_alarms_on_critical_priority(
    event: &StoredEvent,
) -> Result<Option<OutgoingMessage>, DomainError> {
    let prioritised: IncidentPrioritised = decode_payload(event)?;
    if prioritised.priority != IncidentPriority::Critical {
        return Ok(None);
    }
    OutgoingMessage::caused_by(
        event,
        NOTIFICATIONS_DESTINATION,
        RING_ALL_THE_ALARMS_MESSAGE_TYPE,
        prioritised.incident_id.to_string(),
        &RingAllTheAlarms {
            incident_id: prioritised.incident_id,
        },
    )
    .map(Some)
}
