//! Domain events for the incident context.
//!
//! The stored payload of each event is the bare payload struct; the variant is
//! recovered from the envelope's `event_type`.

use helpdesk_core::error::DomainError;
use helpdesk_core::event::{DomainEvent, EventMetadata};
use helpdesk_core::repository::StoredEvent;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::values::{Contact, IncidentCategory, IncidentPriority, ResolutionType};

/// Event type for [`IncidentLogged`].
pub const INCIDENT_LOGGED_EVENT_TYPE: &str = "incident.logged";
/// Event type for [`IncidentCategorised`].
pub const INCIDENT_CATEGORISED_EVENT_TYPE: &str = "incident.categorised";
/// Event type for [`IncidentPrioritised`].
pub const INCIDENT_PRIORITISED_EVENT_TYPE: &str = "incident.prioritised";
/// Event type for [`AgentAssignedToIncident`].
pub const AGENT_ASSIGNED_EVENT_TYPE: &str = "incident.agent_assigned";
/// Event type for [`AgentRespondedToIncident`].
pub const AGENT_RESPONDED_EVENT_TYPE: &str = "incident.agent_responded";
/// Event type for [`CustomerRespondedToIncident`].
pub const CUSTOMER_RESPONDED_EVENT_TYPE: &str = "incident.customer_responded";
/// Event type for [`IncidentResolved`].
pub const INCIDENT_RESOLVED_EVENT_TYPE: &str = "incident.resolved";
/// Event type for [`ResolutionAcknowledgedByCustomer`].
pub const RESOLUTION_ACKNOWLEDGED_EVENT_TYPE: &str = "incident.resolution_acknowledged";
/// Event type for [`IncidentClosed`].
pub const INCIDENT_CLOSED_EVENT_TYPE: &str = "incident.closed";

/// Emitted when a customer contact opens a new incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentLogged {
    /// The incident identifier.
    pub incident_id: Uuid,
    /// The customer the incident belongs to.
    pub customer_id: Uuid,
    /// How the customer got in touch.
    pub contact: Contact,
    /// Free-text description of the problem.
    pub description: String,
    /// Who logged it.
    pub logged_by: Uuid,
}

/// Emitted when an incident is placed in a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentCategorised {
    /// The incident identifier.
    pub incident_id: Uuid,
    /// The new category.
    pub category: IncidentCategory,
    /// Who categorised it.
    pub categorised_by: Uuid,
}

/// Emitted when an incident's priority changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentPrioritised {
    /// The incident identifier.
    pub incident_id: Uuid,
    /// The new priority.
    pub priority: IncidentPriority,
    /// Who prioritised it; the system actor for automatic prioritisation.
    pub prioritised_by: Uuid,
}

/// Emitted when an agent takes an incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentAssignedToIncident {
    /// The incident identifier.
    pub incident_id: Uuid,
    /// The assigned agent.
    pub agent_id: Uuid,
}

/// Emitted when an agent adds a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRespondedToIncident {
    /// The incident identifier.
    pub incident_id: Uuid,
    /// The responding agent.
    pub agent_id: Uuid,
    /// Response text.
    pub content: String,
    /// Internal notes are hidden from the customer.
    pub visible_to_customer: bool,
}

/// Emitted when the customer adds a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRespondedToIncident {
    /// The incident identifier.
    pub incident_id: Uuid,
    /// The responding customer.
    pub customer_id: Uuid,
    /// Response text.
    pub content: String,
}

/// Emitted when an agent resolves an incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentResolved {
    /// The incident identifier.
    pub incident_id: Uuid,
    /// Kind of resolution.
    pub resolution: ResolutionType,
    /// Who resolved it.
    pub resolved_by: Uuid,
}

/// Emitted when the customer accepts a resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionAcknowledgedByCustomer {
    /// The incident identifier.
    pub incident_id: Uuid,
    /// Who acknowledged it.
    pub acknowledged_by: Uuid,
}

/// Emitted when an incident is closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentClosed {
    /// The incident identifier.
    pub incident_id: Uuid,
    /// Who closed it.
    pub closed_by: Uuid,
}

/// Event payload variants for the incident context.
///
/// Serializes as the bare payload of the active variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum IncidentEventKind {
    /// A new incident was logged.
    IncidentLogged(IncidentLogged),
    /// The incident was categorised.
    IncidentCategorised(IncidentCategorised),
    /// The incident was prioritised.
    IncidentPrioritised(IncidentPrioritised),
    /// An agent was assigned.
    AgentAssignedToIncident(AgentAssignedToIncident),
    /// An agent responded.
    AgentRespondedToIncident(AgentRespondedToIncident),
    /// The customer responded.
    CustomerRespondedToIncident(CustomerRespondedToIncident),
    /// The incident was resolved.
    IncidentResolved(IncidentResolved),
    /// The customer acknowledged the resolution.
    ResolutionAcknowledgedByCustomer(ResolutionAcknowledgedByCustomer),
    /// The incident was closed.
    IncidentClosed(IncidentClosed),
}

impl IncidentEventKind {
    /// The wire name of this variant.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::IncidentLogged(_) => INCIDENT_LOGGED_EVENT_TYPE,
            Self::IncidentCategorised(_) => INCIDENT_CATEGORISED_EVENT_TYPE,
            Self::IncidentPrioritised(_) => INCIDENT_PRIORITISED_EVENT_TYPE,
            Self::AgentAssignedToIncident(_) => AGENT_ASSIGNED_EVENT_TYPE,
            Self::AgentRespondedToIncident(_) => AGENT_RESPONDED_EVENT_TYPE,
            Self::CustomerRespondedToIncident(_) => CUSTOMER_RESPONDED_EVENT_TYPE,
            Self::IncidentResolved(_) => INCIDENT_RESOLVED_EVENT_TYPE,
            Self::ResolutionAcknowledgedByCustomer(_) => RESOLUTION_ACKNOWLEDGED_EVENT_TYPE,
            Self::IncidentClosed(_) => INCIDENT_CLOSED_EVENT_TYPE,
        }
    }

    /// Decodes a stored payload. Returns `Ok(None)` for event types outside
    /// the incident catalog.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Schema` if the payload of a known event type is
    /// malformed.
    pub fn decode(stored: &StoredEvent) -> Result<Option<Self>, DomainError> {
        let kind = match stored.event_type.as_str() {
            INCIDENT_LOGGED_EVENT_TYPE => Self::IncidentLogged(decode_payload(stored)?),
            INCIDENT_CATEGORISED_EVENT_TYPE => Self::IncidentCategorised(decode_payload(stored)?),
            INCIDENT_PRIORITISED_EVENT_TYPE => Self::IncidentPrioritised(decode_payload(stored)?),
            AGENT_ASSIGNED_EVENT_TYPE => Self::AgentAssignedToIncident(decode_payload(stored)?),
            AGENT_RESPONDED_EVENT_TYPE => Self::AgentRespondedToIncident(decode_payload(stored)?),
            CUSTOMER_RESPONDED_EVENT_TYPE => Self::CustomerRespondedToIncident(decode_payload(stored)?),
            INCIDENT_RESOLVED_EVENT_TYPE => Self::IncidentResolved(decode_payload(stored)?),
            RESOLUTION_ACKNOWLEDGED_EVENT_TYPE => {
                Self::ResolutionAcknowledgedByCustomer(decode_payload(stored)?)
            }
            INCIDENT_CLOSED_EVENT_TYPE => Self::IncidentClosed(decode_payload(stored)?),
            _ => return Ok(None),
        };
        Ok(Some(kind))
    }
}

/// Decodes the payload of a stored event as `T`.
pub(crate) fn decode_payload<T: DeserializeOwned>(stored: &StoredEvent) -> Result<T, DomainError> {
    serde_json::from_value(stored.payload.clone()).map_err(|e| {
        DomainError::Schema(format!(
            "malformed {} payload in event {}: {e}",
            stored.event_type, stored.event_id
        ))
    })
}

/// Domain event envelope for the incident context.
#[derive(Debug, Clone)]
pub struct IncidentEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: IncidentEventKind,
}

impl DomainEvent for IncidentEvent {
    fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    fn to_payload(&self) -> serde_json::Value {
        // Serialization of derived Serialize types to Value is infallible.
        serde_json::to_value(&self.kind).expect("IncidentEventKind serialization is infallible")
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn from_stored(stored: &StoredEvent) -> Result<Self, DomainError> {
        let kind = IncidentEventKind::decode(stored)?.ok_or_else(|| {
            DomainError::Schema(format!(
                "unknown event type {} in stream {}",
                stored.event_type, stored.stream_id
            ))
        })?;
        Ok(Self {
            metadata: EventMetadata::from_stored(stored),
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helpdesk_test_support::stored_event;

    #[test]
    fn test_payload_is_the_bare_variant_struct() {
        // Arrange
        let id = Uuid::new_v4();
        let by = Uuid::new_v4();
        let kind = IncidentEventKind::IncidentCategorised(IncidentCategorised {
            incident_id: id,
            category: IncidentCategory::Database,
            categorised_by: by,
        });

        // Act
        let value = serde_json::to_value(&kind).unwrap();

        // Assert
        assert_eq!(
            value,
            serde_json::json!({
                "incident_id": id,
                "category": "Database",
                "categorised_by": by,
            })
        );
    }

    #[test]
    fn test_from_stored_routes_on_event_type() {
        let id = Uuid::new_v4();
        let stored = stored_event(
            id,
            1,
            INCIDENT_CLOSED_EVENT_TYPE,
            serde_json::json!({ "incident_id": id, "closed_by": id }),
        );

        let event = IncidentEvent::from_stored(&stored).unwrap();

        assert_eq!(event.event_type(), INCIDENT_CLOSED_EVENT_TYPE);
        assert_eq!(event.metadata.sequence_number, 1);
        assert_eq!(event.to_stored(), stored);
    }

    #[test]
    fn test_unknown_event_type_is_a_schema_error() {
        let id = Uuid::new_v4();
        let stored = stored_event(id, 1, "incident.escalated", serde_json::json!({}));

        assert!(IncidentEventKind::decode(&stored).unwrap().is_none());
        assert!(matches!(
            IncidentEvent::from_stored(&stored),
            Err(DomainError::Schema(_))
        ));
    }

    #[test]
    fn test_malformed_known_payload_is_a_schema_error() {
        let id = Uuid::new_v4();
        let stored = stored_event(
            id,
            1,
            INCIDENT_PRIORITISED_EVENT_TYPE,
            serde_json::json!({ "incident_id": id, "priority": "Whenever" }),
        );

        let result = IncidentEventKind::decode(&stored);

        assert!(matches!(result, Err(DomainError::Schema(_))));
    }
}
