//! Query handlers for the incident context.

use helpdesk_core::error::DomainError;
use helpdesk_core::projection::{ReadModelStore, load_read_model, replay};
use helpdesk_core::repository::EventRepository;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::read_model::{IncidentDetails, IncidentDetailsProjection};

/// Reads the inline-maintained `incident_details` document.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the incident was never logged
/// and `DomainError::Schema` if the stored document cannot be decoded.
#[instrument(skip(store))]
pub async fn get_incident_details(
    incident_id: Uuid,
    store: &dyn ReadModelStore,
) -> Result<IncidentDetails, DomainError> {
    load_read_model::<IncidentDetailsProjection>(store, incident_id).await
}

/// Rebuilds `incident_details` from the event log, bypassing the stored
/// document. Agrees with [`get_incident_details`] after every append.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the stream is empty and
/// `DomainError::Schema` if an event cannot be projected.
#[instrument(skip(repo))]
pub async fn rebuild_incident_details(
    incident_id: Uuid,
    repo: &dyn EventRepository,
) -> Result<IncidentDetails, DomainError> {
    let events = repo.load_events(incident_id).await?;
    replay(&IncidentDetailsProjection, &events)?
        .ok_or(DomainError::AggregateNotFound(incident_id))
}
