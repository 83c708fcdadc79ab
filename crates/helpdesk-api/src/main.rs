//! Helpdesk API server entry point.
//!
//! Hosts the HTTP intake and the outbox relay in one process. Both stop on
//! Ctrl-C: the server drains open requests and the relay finishes its
//! current batch.

use std::sync::Arc;

use helpdesk_api::config::Config;
use helpdesk_api::error::AppError;
use helpdesk_api::state::AppState;
use helpdesk_core::clock::SystemClock;
use helpdesk_core::command::SystemActor;
use helpdesk_event_store::PgEventRepository;
use helpdesk_event_store::schema::MIGRATOR;
use helpdesk_incident::append_pipeline;
use helpdesk_incident::application::command_handlers::IncidentServices;
use helpdesk_relay::{OutboxRelay, TracingTransport};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting helpdesk API server");

    let config = Config::from_env()?;
    let addr = config.bind_addr()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    MIGRATOR.run(&pool).await?;

    let repository = Arc::new(PgEventRepository::new(pool, append_pipeline()));
    let services = Arc::new(IncidentServices::new(
        repository.clone(),
        Arc::new(SystemClock),
        SystemActor(config.system_actor_id),
    ));

    let shutdown = CancellationToken::new();
    let relay = Arc::new(OutboxRelay::new(
        repository.clone(),
        helpdesk_api::relay_registry(services.clone(), Arc::new(TracingTransport)),
        config.relay.clone(),
    ));
    let relay_task = relay.spawn(shutdown.clone());

    let app = helpdesk_api::app(AppState::new(services, repository.clone(), repository));

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Err(err) = relay_task.await {
        tracing::error!(error = %err, "outbox relay task failed");
    }

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        shutdown.cancelled().await;
        return;
    }
    tracing::info!("shutdown requested");
    shutdown.cancel();
}
