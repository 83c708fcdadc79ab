//! Destination to handler mapping.

use std::collections::HashMap;
use std::sync::Arc;

use helpdesk_core::outbox::MessageHandler;

/// Maps outbox destinations to their handlers. Built once at startup.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `destination`, replacing any previous one.
    #[must_use]
    pub fn with_handler(
        mut self,
        destination: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        self.handlers.insert(destination.into(), handler);
        self
    }

    /// Looks up the handler for `destination`.
    #[must_use]
    pub fn get(&self, destination: &str) -> Option<&Arc<dyn MessageHandler>> {
        self.handlers.get(destination)
    }

    /// Registered destinations, sorted.
    #[must_use]
    pub fn destinations(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("destinations", &self.destinations())
            .finish()
    }
}
