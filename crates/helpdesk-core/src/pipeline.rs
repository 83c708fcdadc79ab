//! Work a store performs inside the append unit of work.

use std::sync::Arc;

use crate::cascade::{CascadeRouter, OutgoingMessage};
use crate::error::DomainError;
use crate::projection::InlineProjection;
use crate::repository::StoredEvent;

/// Inline projections plus the cascade router, registered once at startup
/// and shared by every append.
#[derive(Clone, Default)]
pub struct AppendPipeline {
    projections: Vec<Arc<dyn InlineProjection>>,
    router: CascadeRouter,
}

impl AppendPipeline {
    /// Creates a pipeline.
    #[must_use]
    pub fn new(projections: Vec<Arc<dyn InlineProjection>>, router: CascadeRouter) -> Self {
        Self {
            projections,
            router,
        }
    }

    /// The inline projections, in registration order.
    #[must_use]
    pub fn projections(&self) -> &[Arc<dyn InlineProjection>] {
        &self.projections
    }

    /// Runs the cascade rules over a freshly appended batch.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a cascade rule.
    pub fn cascade(&self, events: &[StoredEvent]) -> Result<Vec<OutgoingMessage>, DomainError> {
        self.router.route(events)
    }
}

impl std::fmt::Debug for AppendPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppendPipeline")
            .field(
                "projections",
                &self.projections.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("router", &self.router)
            .finish()
    }
}
