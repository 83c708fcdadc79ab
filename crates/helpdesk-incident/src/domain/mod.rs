//! Domain layer: value types, events, commands, the aggregate, the read
//! model, and cascade rules.

pub mod aggregates;
pub mod cascade;
pub mod commands;
pub mod events;
pub mod read_model;
pub mod values;
