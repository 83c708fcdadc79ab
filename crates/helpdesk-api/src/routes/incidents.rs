//! Routes for the incident context.
//!
//! Commands are `POST`s that return the new stream version and the appended
//! event IDs. Every command except logging accepts an optional
//! `expected_version`; a stale one is rejected with 409.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{
    Json, Router,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use helpdesk_incident::application::command_handlers::{self, IncidentCommandResult};
use helpdesk_incident::application::query_handlers;
use helpdesk_incident::domain::commands;
use helpdesk_incident::domain::read_model::IncidentDetails;
use helpdesk_incident::domain::values::{
    Contact, IncidentCategory, IncidentPriority, ResolutionType,
};

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /.
#[derive(Debug, Deserialize)]
pub struct LogIncidentRequest {
    /// Client-chosen identifier; generated when absent.
    #[serde(default)]
    pub incident_id: Option<Uuid>,
    /// The customer reporting the problem.
    pub customer_id: Uuid,
    /// How the customer got in touch.
    pub contact: Contact,
    /// Problem description.
    pub description: String,
    /// Who is logging it.
    pub logged_by: Uuid,
}

/// Request body for POST /{id}/categorise.
#[derive(Debug, Deserialize)]
pub struct CategoriseRequest {
    /// Version the caller last saw; omit to skip the staleness check.
    pub expected_version: Option<i64>,
    /// The category to assign.
    pub category: IncidentCategory,
    /// Who is categorising the incident.
    pub categorised_by: Uuid,
}

/// Request body for POST /{id}/prioritise.
#[derive(Debug, Deserialize)]
pub struct PrioritiseRequest {
    /// Version the caller last saw; omit to skip the staleness check.
    pub expected_version: Option<i64>,
    /// The priority to assign.
    pub priority: IncidentPriority,
    /// Who is setting the priority.
    pub prioritised_by: Uuid,
}

/// Request body for POST /{id}/assign.
#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    /// Version the caller last saw; omit to skip the staleness check.
    pub expected_version: Option<i64>,
    /// The agent to assign.
    pub agent_id: Uuid,
}

/// Request body for POST /{id}/agent-response.
#[derive(Debug, Deserialize)]
pub struct AgentResponseRequest {
    /// Version the caller last saw; omit to skip the staleness check.
    pub expected_version: Option<i64>,
    /// The agent responding.
    pub agent_id: Uuid,
    /// The response text.
    pub content: String,
    /// Defaults to visible.
    #[serde(default = "visible")]
    pub visible_to_customer: bool,
}

fn visible() -> bool {
    true
}

/// Request body for POST /{id}/customer-response.
#[derive(Debug, Deserialize)]
pub struct CustomerResponseRequest {
    /// Version the caller last saw; omit to skip the staleness check.
    pub expected_version: Option<i64>,
    /// The customer responding; must be the one who logged the incident.
    pub customer_id: Uuid,
    /// The response text.
    pub content: String,
}

/// Request body for POST /{id}/resolve.
#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    /// Version the caller last saw; omit to skip the staleness check.
    pub expected_version: Option<i64>,
    /// How the incident was resolved.
    pub resolution: ResolutionType,
    /// Who is resolving the incident.
    pub resolved_by: Uuid,
}

/// Request body for POST /{id}/acknowledge.
#[derive(Debug, Deserialize)]
pub struct AcknowledgeRequest {
    /// Version the caller last saw; omit to skip the staleness check.
    pub expected_version: Option<i64>,
    /// Who is acknowledging the resolution.
    pub acknowledged_by: Uuid,
}

/// Request body for POST /{id}/close.
#[derive(Debug, Deserialize)]
pub struct CloseRequest {
    /// Version the caller last saw; omit to skip the staleness check.
    pub expected_version: Option<i64>,
    /// Who is closing the incident.
    pub closed_by: Uuid,
}

/// Response body returned after a command is successfully handled.
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    /// The incident the command targeted.
    pub incident_id: Uuid,
    /// Stream version after the command.
    pub version: i64,
    /// IDs of the events appended; empty when the command changed nothing.
    pub event_ids: Vec<Uuid>,
}

impl From<IncidentCommandResult> for CommandResponse {
    fn from(result: IncidentCommandResult) -> Self {
        Self {
            incident_id: result.incident_id,
            version: result.version,
            event_ids: result.stored_events.iter().map(|e| e.event_id).collect(),
        }
    }
}

/// POST /
#[instrument(skip(state, request), fields(customer_id = %request.customer_id))]
async fn log_incident(
    State(state): State<AppState>,
    Json(request): Json<LogIncidentRequest>,
) -> Result<(StatusCode, Json<CommandResponse>), ApiError> {
    let command = commands::LogIncident {
        correlation_id: Uuid::new_v4(),
        incident_id: request.incident_id.unwrap_or_else(Uuid::new_v4),
        customer_id: request.customer_id,
        contact: request.contact,
        description: request.description,
        logged_by: request.logged_by,
    };

    info!(correlation_id = %command.correlation_id, incident_id = %command.incident_id, "handling log_incident command");

    let result = command_handlers::handle_log_incident(&command, &state.services).await?;
    Ok((StatusCode::CREATED, Json(result.into())))
}

/// POST /{id}/categorise
#[instrument(skip(state, request))]
async fn categorise_incident(
    State(state): State<AppState>,
    Path(incident_id): Path<Uuid>,
    Json(request): Json<CategoriseRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::CategoriseIncident {
        correlation_id: Uuid::new_v4(),
        incident_id,
        expected_version: request.expected_version,
        category: request.category,
        categorised_by: request.categorised_by,
    };

    info!(correlation_id = %command.correlation_id, "handling categorise_incident command");

    let result = command_handlers::handle_categorise_incident(&command, &state.services).await?;
    Ok(Json(result.into()))
}

/// POST /{id}/prioritise
#[instrument(skip(state, request))]
async fn prioritise_incident(
    State(state): State<AppState>,
    Path(incident_id): Path<Uuid>,
    Json(request): Json<PrioritiseRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::PrioritiseIncident {
        correlation_id: Uuid::new_v4(),
        incident_id,
        expected_version: request.expected_version,
        priority: request.priority,
        prioritised_by: request.prioritised_by,
    };

    info!(correlation_id = %command.correlation_id, "handling prioritise_incident command");

    let result = command_handlers::handle_prioritise_incident(&command, &state.services).await?;
    Ok(Json(result.into()))
}

/// POST /{id}/assign
#[instrument(skip(state, request))]
async fn assign_agent(
    State(state): State<AppState>,
    Path(incident_id): Path<Uuid>,
    Json(request): Json<AssignRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::AssignAgentToIncident {
        correlation_id: Uuid::new_v4(),
        incident_id,
        expected_version: request.expected_version,
        agent_id: request.agent_id,
    };

    info!(correlation_id = %command.correlation_id, "handling assign_agent command");

    let result = command_handlers::handle_assign_agent(&command, &state.services).await?;
    Ok(Json(result.into()))
}

/// POST /{id}/agent-response
#[instrument(skip(state, request))]
async fn record_agent_response(
    State(state): State<AppState>,
    Path(incident_id): Path<Uuid>,
    Json(request): Json<AgentResponseRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::RecordAgentResponse {
        correlation_id: Uuid::new_v4(),
        incident_id,
        expected_version: request.expected_version,
        agent_id: request.agent_id,
        content: request.content,
        visible_to_customer: request.visible_to_customer,
    };

    info!(correlation_id = %command.correlation_id, "handling record_agent_response command");

    let result =
        command_handlers::handle_record_agent_response(&command, &state.services).await?;
    Ok(Json(result.into()))
}

/// POST /{id}/customer-response
#[instrument(skip(state, request))]
async fn record_customer_response(
    State(state): State<AppState>,
    Path(incident_id): Path<Uuid>,
    Json(request): Json<CustomerResponseRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::RecordCustomerResponse {
        correlation_id: Uuid::new_v4(),
        incident_id,
        expected_version: request.expected_version,
        customer_id: request.customer_id,
        content: request.content,
    };

    info!(correlation_id = %command.correlation_id, "handling record_customer_response command");

    let result =
        command_handlers::handle_record_customer_response(&command, &state.services).await?;
    Ok(Json(result.into()))
}

/// POST /{id}/resolve
#[instrument(skip(state, request))]
async fn resolve_incident(
    State(state): State<AppState>,
    Path(incident_id): Path<Uuid>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::ResolveIncident {
        correlation_id: Uuid::new_v4(),
        incident_id,
        expected_version: request.expected_version,
        resolution: request.resolution,
        resolved_by: request.resolved_by,
    };

    info!(correlation_id = %command.correlation_id, "handling resolve_incident command");

    let result = command_handlers::handle_resolve_incident(&command, &state.services).await?;
    Ok(Json(result.into()))
}

/// POST /{id}/acknowledge
#[instrument(skip(state, request))]
async fn acknowledge_resolution(
    State(state): State<AppState>,
    Path(incident_id): Path<Uuid>,
    Json(request): Json<AcknowledgeRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::AcknowledgeResolution {
        correlation_id: Uuid::new_v4(),
        incident_id,
        expected_version: request.expected_version,
        acknowledged_by: request.acknowledged_by,
    };

    info!(correlation_id = %command.correlation_id, "handling acknowledge_resolution command");

    let result =
        command_handlers::handle_acknowledge_resolution(&command, &state.services).await?;
    Ok(Json(result.into()))
}

/// POST /{id}/close
#[instrument(skip(state, request))]
async fn close_incident(
    State(state): State<AppState>,
    Path(incident_id): Path<Uuid>,
    Json(request): Json<CloseRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = commands::CloseIncident {
        correlation_id: Uuid::new_v4(),
        incident_id,
        expected_version: request.expected_version,
        closed_by: request.closed_by,
    };

    info!(correlation_id = %command.correlation_id, "handling close_incident command");

    let result = command_handlers::handle_close_incident(&command, &state.services).await?;
    Ok(Json(result.into()))
}

/// GET /{id}
#[instrument(skip(state))]
async fn get_incident(
    State(state): State<AppState>,
    Path(incident_id): Path<Uuid>,
) -> Result<Json<IncidentDetails>, ApiError> {
    let details =
        query_handlers::get_incident_details(incident_id, state.read_models.as_ref()).await?;
    Ok(Json(details))
}

/// Returns the router for the incident context.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(log_incident))
        .route("/{id}", get(get_incident))
        .route("/{id}/categorise", post(categorise_incident))
        .route("/{id}/prioritise", post(prioritise_incident))
        .route("/{id}/assign", post(assign_agent))
        .route("/{id}/agent-response", post(record_agent_response))
        .route("/{id}/customer-response", post(record_customer_response))
        .route("/{id}/resolve", post(resolve_incident))
        .route("/{id}/acknowledge", post(acknowledge_resolution))
        .route("/{id}/close", post(close_incident))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use helpdesk_core::command::SystemActor;
    use helpdesk_core::repository::EventRepository;
    use helpdesk_core::retry::RetryPolicy;
    use helpdesk_event_store::InMemoryEventStore;
    use helpdesk_incident::append_pipeline;
    use helpdesk_incident::application::command_handlers::IncidentServices;
    use helpdesk_test_support::{FailingEventRepository, FixedClock};
    use serde_json::Value;
    use tower::ServiceExt;

    fn app_state_with(events: Arc<dyn EventRepository>) -> AppState {
        let store = InMemoryEventStore::new(append_pipeline());
        let services = IncidentServices::new(
            events,
            Arc::new(FixedClock::default()),
            SystemActor(Uuid::new_v4()),
        )
        .with_retry(RetryPolicy::never());
        AppState::new(Arc::new(services), Arc::new(store.clone()), Arc::new(store))
    }

    fn failing_app_state() -> AppState {
        app_state_with(Arc::new(FailingEventRepository))
    }

    fn log_body() -> Value {
        serde_json::json!({
            "customer_id": Uuid::new_v4(),
            "contact": { "channel": "Email", "email_address": "ada@example.com" },
            "description": "printer on fire",
            "logged_by": Uuid::new_v4(),
        })
    }

    async fn post(app: Router, uri: &str, body: &Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_log_incident_returns_201_with_version_1() {
        // Arrange
        let store = InMemoryEventStore::new(append_pipeline());
        let app = router().with_state(app_state_with(Arc::new(store)));

        // Act
        let (status, json) = post(app, "/", &log_body()).await;

        // Assert
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["version"], 1);
        assert_eq!(json["event_ids"].as_array().unwrap().len(), 1);
        Uuid::parse_str(json["incident_id"].as_str().unwrap()).unwrap();
    }

    #[tokio::test]
    async fn test_log_incident_returns_422_for_unknown_channel() {
        let store = InMemoryEventStore::new(append_pipeline());
        let app = router().with_state(app_state_with(Arc::new(store)));
        let mut body = log_body();
        body["contact"]["channel"] = "Carrier pigeon".into();

        let (status, _) = post(app, "/", &body).await;

        // Axum returns 422 for deserialization failures.
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_command_on_missing_incident_returns_404() {
        let store = InMemoryEventStore::new(append_pipeline());
        let app = router().with_state(app_state_with(Arc::new(store)));

        let (status, json) = post(
            app,
            &format!("/{}/assign", Uuid::new_v4()),
            &serde_json::json!({ "agent_id": Uuid::new_v4() }),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "incident_not_found");
    }

    #[tokio::test]
    async fn test_log_incident_returns_500_when_repository_fails() {
        // Arrange
        let app = router().with_state(failing_app_state());

        // Act
        let (status, json) = post(app, "/", &log_body()).await;

        // Assert
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "infrastructure_error");
    }

    #[tokio::test]
    async fn test_get_unknown_incident_returns_404() {
        let app = router().with_state(failing_app_state());
        let request = Request::builder()
            .method("GET")
            .uri(format!("/{}", Uuid::new_v4()))
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
