//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use helpdesk_core::command::SystemActor;
use helpdesk_event_store::InMemoryEventStore;
use helpdesk_incident::append_pipeline;
use helpdesk_incident::application::command_handlers::IncidentServices;
use helpdesk_relay::{OutboxRelay, RelayConfig, TracingTransport};
use helpdesk_test_support::FixedClock;
use http_body_util::BodyExt;
use tower::ServiceExt;
use uuid::Uuid;

use helpdesk_api::state::AppState;

/// An in-memory deployment: one store behind both the HTTP app and the relay.
pub struct TestApp {
    pub store: InMemoryEventStore,
    pub services: Arc<IncidentServices>,
    pub system_actor: Uuid,
}

impl TestApp {
    pub fn new() -> Self {
        let store = InMemoryEventStore::new(append_pipeline());
        let system_actor = Uuid::new_v4();
        let services = Arc::new(IncidentServices::new(
            Arc::new(store.clone()),
            Arc::new(FixedClock::default()),
            SystemActor(system_actor),
        ));
        Self {
            store,
            services,
            system_actor,
        }
    }

    /// The full router, built the same way as `main.rs`.
    pub fn router(&self) -> Router {
        helpdesk_api::app(AppState::new(
            self.services.clone(),
            Arc::new(self.store.clone()),
            Arc::new(self.store.clone()),
        ))
    }

    /// A relay wired with the production handler registry.
    pub fn relay(&self) -> OutboxRelay {
        OutboxRelay::new(
            Arc::new(self.store.clone()),
            helpdesk_api::relay_registry(self.services.clone(), Arc::new(TracingTransport)),
            RelayConfig::default(),
        )
    }

    pub async fn post_json(&self, uri: &str, body: &serde_json::Value) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap();
        send(self.router(), request).await
    }

    pub async fn get_json(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        send(self.router(), request).await
    }

    /// Logs an incident for `customer_id` and returns its ID.
    pub async fn log_incident(&self, customer_id: Uuid) -> Uuid {
        let (status, json) = self
            .post_json(
                "/api/v1/incidents",
                &serde_json::json!({
                    "customer_id": customer_id,
                    "contact": { "channel": "Phone", "phone_number": "555-0100" },
                    "description": "cannot reach the database",
                    "logged_by": Uuid::new_v4(),
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        json["incident_id"].as_str().unwrap().parse().unwrap()
    }
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body_bytes).unwrap_or(serde_json::Value::Null);

    (status, json)
}
