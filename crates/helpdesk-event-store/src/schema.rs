//! Event store database schema.
//!
//! Three tables: `domain_events` (the log, unique on stream and sequence
//! number), `read_models` (inline projection documents keyed by projection
//! name and stream), and `outbox_entries` (queued cascade messages ordered by
//! a `BIGSERIAL` position).

use sqlx::migrate::Migrator;

/// Migrations creating the event log, read model, and outbox tables.
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");
