//! Helpdesk API: HTTP command intake, read-model queries, and the wiring
//! that hosts the outbox relay next to the server.

use std::sync::Arc;

use axum::Router;
use helpdesk_incident::application::command_handlers::IncidentServices;
use helpdesk_incident::application::message_handlers::TryAssignPriorityHandler;
use helpdesk_incident::domain::cascade::{NOTIFICATIONS_DESTINATION, TRY_ASSIGN_PRIORITY_DESTINATION};
use helpdesk_relay::{HandlerRegistry, Transport, TransportHandler};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

/// Builds the full application router.
pub fn app(state: state::AppState) -> Router {
    // TODO: restrict CORS to the agent console origin once it has a fixed host.
    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/incidents", routes::incidents::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Registers a handler for every destination the incident cascade rules
/// produce. Notifications leave the process through `transport`.
#[must_use]
pub fn relay_registry(
    services: Arc<IncidentServices>,
    transport: Arc<dyn Transport>,
) -> HandlerRegistry {
    HandlerRegistry::new()
        .with_handler(
            TRY_ASSIGN_PRIORITY_DESTINATION,
            Arc::new(TryAssignPriorityHandler::new(services)),
        )
        .with_handler(
            NOTIFICATIONS_DESTINATION,
            Arc::new(TransportHandler::new(NOTIFICATIONS_DESTINATION, transport)),
        )
}
