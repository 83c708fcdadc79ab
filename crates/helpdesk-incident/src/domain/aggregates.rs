//! Aggregate root for the incident context.

use helpdesk_core::aggregate::AggregateRoot;
use helpdesk_core::clock::Clock;
use helpdesk_core::command::SystemActor;
use helpdesk_core::error::DomainError;
use helpdesk_core::event::EventMetadata;
use uuid::Uuid;

use super::commands::Causation;
use super::events::{
    AgentAssignedToIncident, AgentRespondedToIncident, CustomerRespondedToIncident,
    IncidentCategorised, IncidentClosed, IncidentEvent, IncidentEventKind, IncidentLogged,
    IncidentPrioritised, IncidentResolved, ResolutionAcknowledgedByCustomer,
};
use super::values::{Contact, IncidentCategory, IncidentPriority, IncidentStatus, ResolutionType};

/// The aggregate root for a support incident.
#[derive(Debug)]
pub struct Incident {
    /// Aggregate identifier.
    pub id: Uuid,
    /// Sequence number of the last applied event; 0 for a new stream.
    pub(crate) version: i64,
    customer_id: Option<Uuid>,
    contact: Option<Contact>,
    category: Option<IncidentCategory>,
    priority: Option<IncidentPriority>,
    agent_id: Option<Uuid>,
    status: IncidentStatus,
    has_outstanding_response_to_customer: bool,
    /// Uncommitted events pending persistence.
    uncommitted_events: Vec<IncidentEvent>,
}

impl Incident {
    /// Creates an empty incident for stream `id`.
    #[must_use]
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            version: 0,
            customer_id: None,
            contact: None,
            category: None,
            priority: None,
            agent_id: None,
            status: IncidentStatus::Open,
            has_outstanding_response_to_customer: false,
            uncommitted_events: Vec::new(),
        }
    }

    /// The customer the incident belongs to, once logged.
    #[must_use]
    pub fn customer_id(&self) -> Option<Uuid> {
        self.customer_id
    }

    /// Contact details, once logged.
    #[must_use]
    pub fn contact(&self) -> Option<&Contact> {
        self.contact.as_ref()
    }

    /// Current category.
    #[must_use]
    pub fn category(&self) -> Option<IncidentCategory> {
        self.category
    }

    /// Current priority.
    #[must_use]
    pub fn priority(&self) -> Option<IncidentPriority> {
        self.priority
    }

    /// Assigned agent.
    #[must_use]
    pub fn agent_id(&self) -> Option<Uuid> {
        self.agent_id
    }

    /// Lifecycle status.
    #[must_use]
    pub fn status(&self) -> IncidentStatus {
        self.status
    }

    /// `true` while a customer response is waiting for an agent reply.
    #[must_use]
    pub fn has_outstanding_response_to_customer(&self) -> bool {
        self.has_outstanding_response_to_customer
    }

    #[allow(clippy::cast_possible_wrap)]
    fn next_sequence_number(&self) -> i64 {
        self.version + self.uncommitted_events.len() as i64 + 1
    }

    fn record(&mut self, kind: IncidentEventKind, causation: Causation, clock: &dyn Clock) {
        // TODO: event_id uses Uuid::new_v4(); thread an id generator through
        // alongside the clock so decisions are reproducible in tests.
        let event = IncidentEvent {
            metadata: EventMetadata {
                event_id: Uuid::new_v4(),
                event_type: kind.event_type().to_owned(),
                aggregate_id: self.id,
                sequence_number: self.next_sequence_number(),
                correlation_id: causation.correlation_id,
                causation_id: causation.causation_id,
                occurred_at: clock.now(),
            },
            kind,
        };
        self.uncommitted_events.push(event);
    }

    fn ensure_not_closed(&self) -> Result<(), DomainError> {
        if self.status == IncidentStatus::Closed {
            return Err(DomainError::Validation("incident is already closed".into()));
        }
        Ok(())
    }

    /// Logs the incident, producing `IncidentLogged`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the stream already has events or
    /// the description is blank.
    pub fn log(
        &mut self,
        customer_id: Uuid,
        contact: Contact,
        description: String,
        logged_by: Uuid,
        causation: Causation,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if self.version != 0 {
            return Err(DomainError::Validation(format!(
                "incident {} has already been logged",
                self.id
            )));
        }
        if description.trim().is_empty() {
            return Err(DomainError::Validation(
                "incident description must not be empty".into(),
            ));
        }
        self.record(
            IncidentEventKind::IncidentLogged(IncidentLogged {
                incident_id: self.id,
                customer_id,
                contact,
                description,
                logged_by,
            }),
            causation,
            clock,
        );
        Ok(())
    }

    /// Categorises the incident. An unchanged category produces no event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the incident is closed.
    pub fn categorise(
        &mut self,
        category: IncidentCategory,
        categorised_by: Uuid,
        causation: Causation,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_not_closed()?;
        if self.category == Some(category) {
            return Ok(());
        }
        self.record(
            IncidentEventKind::IncidentCategorised(IncidentCategorised {
                incident_id: self.id,
                category,
                categorised_by,
            }),
            causation,
            clock,
        );
        Ok(())
    }

    /// Prioritises the incident. An unchanged priority produces no event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the incident is closed.
    pub fn prioritise(
        &mut self,
        priority: IncidentPriority,
        prioritised_by: Uuid,
        causation: Causation,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_not_closed()?;
        if self.priority == Some(priority) {
            return Ok(());
        }
        self.record(
            IncidentEventKind::IncidentPrioritised(IncidentPrioritised {
                incident_id: self.id,
                priority,
                prioritised_by,
            }),
            causation,
            clock,
        );
        Ok(())
    }

    /// Applies the priority implied by the current category, acting as the
    /// system. Produces nothing when the incident is closed, uncategorised,
    /// or already at that priority, so a redelivered request is harmless.
    pub fn try_assign_priority(
        &mut self,
        system: SystemActor,
        causation: Causation,
        clock: &dyn Clock,
    ) {
        if self.status == IncidentStatus::Closed {
            return;
        }
        let Some(priority) = self.category.map(IncidentCategory::default_priority) else {
            return;
        };
        if self.priority == Some(priority) {
            return;
        }
        self.record(
            IncidentEventKind::IncidentPrioritised(IncidentPrioritised {
                incident_id: self.id,
                priority,
                prioritised_by: system.id(),
            }),
            causation,
            clock,
        );
    }

    /// Assigns an agent. Re-assigning the current agent produces no event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the incident is closed.
    pub fn assign_agent(
        &mut self,
        agent_id: Uuid,
        causation: Causation,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_not_closed()?;
        if self.agent_id == Some(agent_id) {
            return Ok(());
        }
        self.record(
            IncidentEventKind::AgentAssignedToIncident(AgentAssignedToIncident {
                incident_id: self.id,
                agent_id,
            }),
            causation,
            clock,
        );
        Ok(())
    }

    /// Records an agent response.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the incident is closed.
    pub fn record_agent_response(
        &mut self,
        agent_id: Uuid,
        content: String,
        visible_to_customer: bool,
        causation: Causation,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_not_closed()?;
        self.record(
            IncidentEventKind::AgentRespondedToIncident(AgentRespondedToIncident {
                incident_id: self.id,
                agent_id,
                content,
                visible_to_customer,
            }),
            causation,
            clock,
        );
        Ok(())
    }

    /// Records a customer response.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the incident is closed or the
    /// response comes from someone other than the incident's customer.
    pub fn record_customer_response(
        &mut self,
        customer_id: Uuid,
        content: String,
        causation: Causation,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_not_closed()?;
        if self.customer_id != Some(customer_id) {
            return Err(DomainError::Validation(format!(
                "customer {customer_id} does not own incident {}",
                self.id
            )));
        }
        self.record(
            IncidentEventKind::CustomerRespondedToIncident(CustomerRespondedToIncident {
                incident_id: self.id,
                customer_id,
                content,
            }),
            causation,
            clock,
        );
        Ok(())
    }

    /// Resolves the incident.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the incident is closed or has
    /// already been resolved.
    pub fn resolve(
        &mut self,
        resolution: ResolutionType,
        resolved_by: Uuid,
        causation: Causation,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_not_closed()?;
        if self.status != IncidentStatus::Open {
            return Err(DomainError::Validation("incident is already resolved".into()));
        }
        self.record(
            IncidentEventKind::IncidentResolved(IncidentResolved {
                incident_id: self.id,
                resolution,
                resolved_by,
            }),
            causation,
            clock,
        );
        Ok(())
    }

    /// Records the customer's acceptance of the resolution.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` unless the incident is `Resolved`.
    pub fn acknowledge_resolution(
        &mut self,
        acknowledged_by: Uuid,
        causation: Causation,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_not_closed()?;
        if self.status != IncidentStatus::Resolved {
            return Err(DomainError::Validation(
                "only resolved incidents can be acknowledged".into(),
            ));
        }
        self.record(
            IncidentEventKind::ResolutionAcknowledgedByCustomer(
                ResolutionAcknowledgedByCustomer {
                    incident_id: self.id,
                    acknowledged_by,
                },
            ),
            causation,
            clock,
        );
        Ok(())
    }

    /// Closes the incident.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the incident is already closed,
    /// the customer has not acknowledged the resolution, or a customer
    /// response is still waiting for an agent reply.
    pub fn close(
        &mut self,
        closed_by: Uuid,
        causation: Causation,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_not_closed()?;
        if self.status != IncidentStatus::ResolutionAcknowledgedByCustomer {
            return Err(DomainError::Validation(
                "only incidents whose resolution the customer acknowledged can be closed".into(),
            ));
        }
        if self.has_outstanding_response_to_customer {
            return Err(DomainError::Validation(
                "cannot close an incident with an outstanding response to the customer".into(),
            ));
        }
        self.record(
            IncidentEventKind::IncidentClosed(IncidentClosed {
                incident_id: self.id,
                closed_by,
            }),
            causation,
            clock,
        );
        Ok(())
    }
}

impl AggregateRoot for Incident {
    type Event = IncidentEvent;

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        match &event.kind {
            IncidentEventKind::IncidentLogged(payload) => {
                self.customer_id = Some(payload.customer_id);
                self.contact = Some(payload.contact.clone());
                self.status = IncidentStatus::Open;
            }
            IncidentEventKind::IncidentCategorised(payload) => {
                self.category = Some(payload.category);
            }
            IncidentEventKind::IncidentPrioritised(payload) => {
                self.priority = Some(payload.priority);
            }
            IncidentEventKind::AgentAssignedToIncident(payload) => {
                self.agent_id = Some(payload.agent_id);
            }
            IncidentEventKind::AgentRespondedToIncident(_) => {
                self.has_outstanding_response_to_customer = false;
            }
            IncidentEventKind::CustomerRespondedToIncident(_) => {
                self.has_outstanding_response_to_customer = true;
            }
            IncidentEventKind::IncidentResolved(_) => {
                self.status = IncidentStatus::Resolved;
            }
            IncidentEventKind::ResolutionAcknowledgedByCustomer(_) => {
                self.status = IncidentStatus::ResolutionAcknowledgedByCustomer;
            }
            IncidentEventKind::IncidentClosed(_) => {
                self.status = IncidentStatus::Closed;
            }
        }
        self.version = event.metadata.sequence_number;
    }

    fn uncommitted_events(&self) -> &[Self::Event] {
        &self.uncommitted_events
    }

    fn clear_uncommitted_events(&mut self) {
        self.uncommitted_events.clear();
    }
}
