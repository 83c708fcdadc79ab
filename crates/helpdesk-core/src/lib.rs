//! Helpdesk core: shared event-sourcing abstractions.
//!
//! This crate defines the traits and types every store, projection, and
//! bounded context depends on: the event envelope, the event log contract,
//! read-model projection, cascade rules, the outbox, and the retry policy.
//! It contains no database code.

pub mod aggregate;
pub mod cascade;
pub mod clock;
pub mod command;
pub mod error;
pub mod event;
pub mod outbox;
pub mod pipeline;
pub mod projection;
pub mod repository;
pub mod retry;
