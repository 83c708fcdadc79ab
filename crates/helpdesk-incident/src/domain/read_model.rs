//! `incident_details` read model, maintained inline on every append.

use helpdesk_core::error::DomainError;
use helpdesk_core::projection::ReadModelProjector;
use helpdesk_core::repository::StoredEvent;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::IncidentEventKind;
use super::values::{IncidentCategory, IncidentPriority, IncidentStatus};

/// Who wrote a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteType {
    /// An agent response.
    FromAgent,
    /// A customer response.
    FromCustomer,
}

/// One response on the incident timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentNote {
    /// Author kind.
    pub note_type: NoteType,
    /// Author identifier.
    pub from: Uuid,
    /// Note text.
    pub content: String,
    /// Whether the customer may see it.
    pub visible_to_customer: bool,
}

/// Query-side view of one incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentDetails {
    /// The incident identifier.
    pub id: Uuid,
    /// The customer it belongs to.
    pub customer_id: Uuid,
    /// Lifecycle status.
    pub status: IncidentStatus,
    /// Current category.
    pub category: Option<IncidentCategory>,
    /// Current priority.
    pub priority: Option<IncidentPriority>,
    /// Assigned agent.
    pub agent_id: Option<Uuid>,
    /// Agent and customer responses, oldest first.
    pub notes: Vec<IncidentNote>,
    /// Sequence number of the last event folded in.
    pub version: i64,
}

/// Folds incident events into [`IncidentDetails`].
#[derive(Debug, Clone, Copy, Default)]
pub struct IncidentDetailsProjection;

impl ReadModelProjector for IncidentDetailsProjection {
    type Document = IncidentDetails;
    const NAME: &'static str = "incident_details";

    fn apply(
        &self,
        document: Option<IncidentDetails>,
        event: &StoredEvent,
    ) -> Result<Option<IncidentDetails>, DomainError> {
        let Some(kind) = IncidentEventKind::decode(event)? else {
            return Ok(document);
        };

        if let IncidentEventKind::IncidentLogged(logged) = &kind {
            return Ok(Some(IncidentDetails {
                id: logged.incident_id,
                customer_id: logged.customer_id,
                status: IncidentStatus::Open,
                category: None,
                priority: None,
                agent_id: None,
                notes: Vec::new(),
                version: event.sequence_number,
            }));
        }

        let mut details = document.ok_or_else(|| {
            DomainError::Schema(format!(
                "{} event {} precedes incident.logged in stream {}",
                event.event_type, event.event_id, event.stream_id
            ))
        })?;

        match kind {
            IncidentEventKind::IncidentLogged(_) => {}
            IncidentEventKind::IncidentCategorised(payload) => {
                details.category = Some(payload.category);
            }
            IncidentEventKind::IncidentPrioritised(payload) => {
                details.priority = Some(payload.priority);
            }
            IncidentEventKind::AgentAssignedToIncident(payload) => {
                details.agent_id = Some(payload.agent_id);
            }
            IncidentEventKind::AgentRespondedToIncident(payload) => {
                details.notes.push(IncidentNote {
                    note_type: NoteType::FromAgent,
                    from: payload.agent_id,
                    content: payload.content,
                    visible_to_customer: payload.visible_to_customer,
                });
            }
            IncidentEventKind::CustomerRespondedToIncident(payload) => {
                details.notes.push(IncidentNote {
                    note_type: NoteType::FromCustomer,
                    from: payload.customer_id,
                    content: payload.content,
                    visible_to_customer: true,
                });
            }
            IncidentEventKind::IncidentResolved(_) => {
                details.status = IncidentStatus::Resolved;
            }
            IncidentEventKind::ResolutionAcknowledgedByCustomer(_) => {
                details.status = IncidentStatus::ResolutionAcknowledgedByCustomer;
            }
            IncidentEventKind::IncidentClosed(_) => {
                details.status = IncidentStatus::Closed;
            }
        }
        details.version = event.sequence_number;
        Ok(Some(details))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helpdesk_core::projection::replay;
    use helpdesk_test_support::stored_event;

    use crate::domain::events::{
        AGENT_RESPONDED_EVENT_TYPE, CUSTOMER_RESPONDED_EVENT_TYPE, INCIDENT_CATEGORISED_EVENT_TYPE,
        INCIDENT_LOGGED_EVENT_TYPE,
    };

    fn logged(id: Uuid, customer_id: Uuid) -> StoredEvent {
        stored_event(
            id,
            1,
            INCIDENT_LOGGED_EVENT_TYPE,
            serde_json::json!({
                "incident_id": id,
                "customer_id": customer_id,
                "contact": { "channel": "Email", "email_address": "c1@example.com" },
                "description": "cannot log in",
                "logged_by": customer_id,
            }),
        )
    }

    #[test]
    fn test_logged_creates_open_uncategorised_document() {
        // Arrange
        let id = Uuid::new_v4();
        let customer = Uuid::new_v4();

        // Act
        let details = IncidentDetailsProjection
            .apply(None, &logged(id, customer))
            .unwrap()
            .unwrap();

        // Assert
        assert_eq!(details.customer_id, customer);
        assert_eq!(details.status, IncidentStatus::Open);
        assert_eq!(details.category, None);
        assert_eq!(details.version, 1);
    }

    #[test]
    fn test_responses_become_notes_in_order() {
        // Arrange
        let id = Uuid::new_v4();
        let customer = Uuid::new_v4();
        let agent = Uuid::new_v4();
        let events = vec![
            logged(id, customer),
            stored_event(
                id,
                2,
                AGENT_RESPONDED_EVENT_TYPE,
                serde_json::json!({
                    "incident_id": id,
                    "agent_id": agent,
                    "content": "checking logs",
                    "visible_to_customer": false,
                }),
            ),
            stored_event(
                id,
                3,
                CUSTOMER_RESPONDED_EVENT_TYPE,
                serde_json::json!({
                    "incident_id": id,
                    "customer_id": customer,
                    "content": "still broken",
                }),
            ),
        ];

        // Act
        let details = replay(&IncidentDetailsProjection, &events).unwrap().unwrap();

        // Assert
        assert_eq!(details.version, 3);
        assert_eq!(details.notes.len(), 2);
        assert_eq!(details.notes[0].note_type, NoteType::FromAgent);
        assert!(!details.notes[0].visible_to_customer);
        assert_eq!(details.notes[1].from, customer);
        assert_eq!(details.notes[1].content, "still broken");
    }

    #[test]
    fn test_foreign_event_type_leaves_document_unchanged() {
        let id = Uuid::new_v4();
        let before = IncidentDetailsProjection
            .apply(None, &logged(id, Uuid::new_v4()))
            .unwrap();

        let after = IncidentDetailsProjection
            .apply(
                before.clone(),
                &stored_event(id, 2, "billing.invoiced", serde_json::json!({})),
            )
            .unwrap();

        assert_eq!(after, before);
    }

    #[test]
    fn test_event_before_logged_is_a_schema_error() {
        let id = Uuid::new_v4();
        let event = stored_event(
            id,
            1,
            INCIDENT_CATEGORISED_EVENT_TYPE,
            serde_json::json!({
                "incident_id": id,
                "category": "Software",
                "categorised_by": id,
            }),
        );

        let result = IncidentDetailsProjection.apply(None, &event);

        assert!(matches!(result, Err(DomainError::Schema(_))));
    }
}
