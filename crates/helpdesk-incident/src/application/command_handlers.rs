//! Command handlers for the incident context.
//!
//! Every handler follows the same shape: load the stream, fold it into an
//! `Incident`, run one decision, and append whatever the decision produced.
//! Loads and appends go through the retry policy.

use std::sync::Arc;

use helpdesk_core::aggregate::{AggregateRoot, reconstitute};
use helpdesk_core::clock::Clock;
use helpdesk_core::command::{Command, SystemActor};
use helpdesk_core::error::DomainError;
use helpdesk_core::event::DomainEvent;
use helpdesk_core::repository::{EventRepository, StoredEvent};
use helpdesk_core::retry::RetryPolicy;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::domain::aggregates::Incident;
use crate::domain::commands::{
    AcknowledgeResolution, AssignAgentToIncident, CategoriseIncident, Causation, CloseIncident,
    LogIncident, PrioritiseIncident, RecordAgentResponse, RecordCustomerResponse, ResolveIncident,
    TryAssignPriority,
};

/// Collaborators every incident command handler needs.
#[derive(Clone)]
pub struct IncidentServices {
    /// Event log.
    pub events: Arc<dyn EventRepository>,
    /// Time source for event timestamps.
    pub clock: Arc<dyn Clock>,
    /// Retry schedule for loads and appends.
    pub retry: RetryPolicy,
    /// Identity used for system-initiated decisions.
    pub system_actor: SystemActor,
}

impl IncidentServices {
    /// Creates services with the default retry schedule.
    #[must_use]
    pub fn new(
        events: Arc<dyn EventRepository>,
        clock: Arc<dyn Clock>,
        system_actor: SystemActor,
    ) -> Self {
        Self {
            events,
            clock,
            retry: RetryPolicy::default(),
            system_actor,
        }
    }

    /// Replaces the retry schedule.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl std::fmt::Debug for IncidentServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncidentServices")
            .field("retry", &self.retry)
            .field("system_actor", &self.system_actor)
            .finish_non_exhaustive()
    }
}

/// Result of a successfully handled command.
#[derive(Debug)]
pub struct IncidentCommandResult {
    /// The incident affected by the command.
    pub incident_id: Uuid,
    /// Stream version after the command. Unchanged when nothing was emitted.
    pub version: i64,
    /// The events appended, possibly none.
    pub stored_events: Vec<StoredEvent>,
}

/// Loads, decides, persists.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for an empty stream and
/// `DomainError::ConcurrencyConflict` if the command's expected version does
/// not match the loaded one. Decision and store errors are propagated.
async fn execute<C, F>(
    services: &IncidentServices,
    incident_id: Uuid,
    command: &C,
    decide: F,
) -> Result<IncidentCommandResult, DomainError>
where
    C: Command,
    F: FnOnce(&mut Incident, Causation, &dyn Clock) -> Result<(), DomainError>,
{
    let existing = services
        .retry
        .run("load_events", || services.events.load_events(incident_id))
        .await?;
    if existing.is_empty() {
        return Err(DomainError::AggregateNotFound(incident_id));
    }
    let mut incident = reconstitute(Incident::new(incident_id), &existing)?;

    if let Some(expected) = command
        .expected_version()
        .filter(|expected| *expected != incident.version())
    {
        return Err(DomainError::ConcurrencyConflict {
            aggregate_id: incident_id,
            expected,
            actual: incident.version(),
        });
    }

    decide(&mut incident, Causation::of(command), services.clock.as_ref())?;
    persist(services, &incident).await
}

async fn persist(
    services: &IncidentServices,
    incident: &Incident,
) -> Result<IncidentCommandResult, DomainError> {
    let stored_events: Vec<StoredEvent> = incident
        .uncommitted_events()
        .iter()
        .map(DomainEvent::to_stored)
        .collect();

    if stored_events.is_empty() {
        debug!(incident_id = %incident.id, "decision produced no events");
        return Ok(IncidentCommandResult {
            incident_id: incident.id,
            version: incident.version(),
            stored_events,
        });
    }

    let version = services
        .retry
        .run("append_events", || {
            services
                .events
                .append_events(incident.id, incident.version(), &stored_events)
        })
        .await?;

    debug!(
        incident_id = %incident.id,
        version,
        appended = stored_events.len(),
        "appended incident events"
    );
    Ok(IncidentCommandResult {
        incident_id: incident.id,
        version,
        stored_events,
    })
}

/// Handles `LogIncident`: starts a new stream with `IncidentLogged`.
///
/// # Errors
///
/// Returns `DomainError::ConcurrencyConflict` if the stream already exists
/// and `DomainError::Validation` for a blank description.
#[instrument(skip_all, fields(incident_id = %command.incident_id))]
pub async fn handle_log_incident(
    command: &LogIncident,
    services: &IncidentServices,
) -> Result<IncidentCommandResult, DomainError> {
    let mut incident = Incident::new(command.incident_id);
    incident.log(
        command.customer_id,
        command.contact.clone(),
        command.description.clone(),
        command.logged_by,
        Causation::of(command),
        services.clock.as_ref(),
    )?;
    persist(services, &incident).await
}

/// Handles `CategoriseIncident`.
///
/// # Errors
///
/// Returns `DomainError` if loading, the decision, or appending fails.
#[instrument(skip_all, fields(incident_id = %command.incident_id))]
pub async fn handle_categorise_incident(
    command: &CategoriseIncident,
    services: &IncidentServices,
) -> Result<IncidentCommandResult, DomainError> {
    execute(services, command.incident_id, command, |incident, cause, clock| {
        incident.categorise(command.category, command.categorised_by, cause, clock)
    })
    .await
}

/// Handles `PrioritiseIncident`.
///
/// # Errors
///
/// Returns `DomainError` if loading, the decision, or appending fails.
#[instrument(skip_all, fields(incident_id = %command.incident_id))]
pub async fn handle_prioritise_incident(
    command: &PrioritiseIncident,
    services: &IncidentServices,
) -> Result<IncidentCommandResult, DomainError> {
    execute(services, command.incident_id, command, |incident, cause, clock| {
        incident.prioritise(command.priority, command.prioritised_by, cause, clock)
    })
    .await
}

/// Handles `AssignAgentToIncident`.
///
/// # Errors
///
/// Returns `DomainError` if loading, the decision, or appending fails.
#[instrument(skip_all, fields(incident_id = %command.incident_id))]
pub async fn handle_assign_agent(
    command: &AssignAgentToIncident,
    services: &IncidentServices,
) -> Result<IncidentCommandResult, DomainError> {
    execute(services, command.incident_id, command, |incident, cause, clock| {
        incident.assign_agent(command.agent_id, cause, clock)
    })
    .await
}

/// Handles `RecordAgentResponse`.
///
/// # Errors
///
/// Returns `DomainError` if loading, the decision, or appending fails.
#[instrument(skip_all, fields(incident_id = %command.incident_id))]
pub async fn handle_record_agent_response(
    command: &RecordAgentResponse,
    services: &IncidentServices,
) -> Result<IncidentCommandResult, DomainError> {
    execute(services, command.incident_id, command, |incident, cause, clock| {
        incident.record_agent_response(
            command.agent_id,
            command.content.clone(),
            command.visible_to_customer,
            cause,
            clock,
        )
    })
    .await
}

/// Handles `RecordCustomerResponse`.
///
/// # Errors
///
/// Returns `DomainError` if loading, the decision, or appending fails.
#[instrument(skip_all, fields(incident_id = %command.incident_id))]
pub async fn handle_record_customer_response(
    command: &RecordCustomerResponse,
    services: &IncidentServices,
) -> Result<IncidentCommandResult, DomainError> {
    execute(services, command.incident_id, command, |incident, cause, clock| {
        incident.record_customer_response(command.customer_id, command.content.clone(), cause, clock)
    })
    .await
}

/// Handles `ResolveIncident`.
///
/// # Errors
///
/// Returns `DomainError` if loading, the decision, or appending fails.
#[instrument(skip_all, fields(incident_id = %command.incident_id))]
pub async fn handle_resolve_incident(
    command: &ResolveIncident,
    services: &IncidentServices,
) -> Result<IncidentCommandResult, DomainError> {
    execute(services, command.incident_id, command, |incident, cause, clock| {
        incident.resolve(command.resolution, command.resolved_by, cause, clock)
    })
    .await
}

/// Handles `AcknowledgeResolution`.
///
/// # Errors
///
/// Returns `DomainError` if loading, the decision, or appending fails.
#[instrument(skip_all, fields(incident_id = %command.incident_id))]
pub async fn handle_acknowledge_resolution(
    command: &AcknowledgeResolution,
    services: &IncidentServices,
) -> Result<IncidentCommandResult, DomainError> {
    execute(services, command.incident_id, command, |incident, cause, clock| {
        incident.acknowledge_resolution(command.acknowledged_by, cause, clock)
    })
    .await
}

/// Handles `CloseIncident`.
///
/// # Errors
///
/// Returns `DomainError` if loading, the decision, or appending fails.
#[instrument(skip_all, fields(incident_id = %command.incident_id))]
pub async fn handle_close_incident(
    command: &CloseIncident,
    services: &IncidentServices,
) -> Result<IncidentCommandResult, DomainError> {
    execute(services, command.incident_id, command, |incident, cause, clock| {
        incident.close(command.closed_by, cause, clock)
    })
    .await
}

/// Handles the cascaded `TryAssignPriority` as the system actor.
///
/// # Errors
///
/// Returns `DomainError` if loading or appending fails. A concurrency
/// conflict means the stream moved on; redelivery re-decides against it.
#[instrument(skip_all, fields(incident_id = %command.incident_id, triggered_by = %command.triggered_by))]
pub async fn handle_try_assign_priority(
    command: &TryAssignPriority,
    services: &IncidentServices,
) -> Result<IncidentCommandResult, DomainError> {
    let system = services.system_actor;
    execute(services, command.incident_id, command, |incident, cause, clock| {
        incident.try_assign_priority(system, cause, clock);
        Ok(())
    })
    .await
}
