//! Helpdesk outbox relay.
//!
//! Drains committed outbox entries to their destination handlers. Entries
//! sharing an ordering key are delivered one at a time in creation order;
//! entries with different keys are delivered concurrently up to a bound.
//! Delivery is at-least-once.

pub mod config;
pub mod registry;
pub mod relay;
pub mod transport;

pub use config::RelayConfig;
pub use registry::HandlerRegistry;
pub use relay::{OutboxRelay, RelayReport};
pub use transport::{TracingTransport, Transport, TransportHandler};
