//! Shared application state.

use std::sync::Arc;

use helpdesk_core::outbox::OutboxStore;
use helpdesk_core::projection::ReadModelStore;
use helpdesk_incident::application::command_handlers::IncidentServices;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Command-side collaborators.
    pub services: Arc<IncidentServices>,
    /// Read-model documents maintained inline by the event store.
    pub read_models: Arc<dyn ReadModelStore>,
    /// Outbox, for backlog reporting.
    pub outbox: Arc<dyn OutboxStore>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        services: Arc<IncidentServices>,
        read_models: Arc<dyn ReadModelStore>,
        outbox: Arc<dyn OutboxStore>,
    ) -> Self {
        Self {
            services,
            read_models,
            outbox,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}
