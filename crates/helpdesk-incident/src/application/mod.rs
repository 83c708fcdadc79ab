//! Application layer: command, query, and outbox message handlers.

pub mod command_handlers;
pub mod message_handlers;
pub mod query_handlers;
