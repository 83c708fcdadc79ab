//! Helpdesk event store: event log engines.
//!
//! Both engines implement the event log, the read-model store, and the outbox
//! store over the same append unit of work: events, inline projections, and
//! cascade outbox entries commit together.

pub mod memory;
pub mod pg_event_repository;
pub mod schema;

pub use memory::InMemoryEventStore;
pub use pg_event_repository::PgEventRepository;
