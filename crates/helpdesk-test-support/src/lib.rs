//! Shared test doubles for the helpdesk crates.

mod clock;
mod handler;
mod repository;

pub use clock::{FixedClock, fixed_now};
pub use handler::RecordingHandler;
pub use repository::{
    EmptyEventRepository, FailingEventRepository, FlakyEventRepository, stored_event,
};
