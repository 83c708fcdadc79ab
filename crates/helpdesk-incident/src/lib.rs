//! Helpdesk support incident bounded context.
//!
//! An incident is logged by a customer contact, triaged (categorised,
//! prioritised, assigned), worked through agent and customer responses,
//! resolved, acknowledged by the customer, and finally closed.

use std::sync::Arc;

use helpdesk_core::cascade::CascadeRouter;
use helpdesk_core::pipeline::AppendPipeline;

pub mod application;
pub mod domain;

/// The append pipeline every incident store must run: the `incident_details`
/// inline projection and the incident cascade rules.
#[must_use]
pub fn append_pipeline() -> AppendPipeline {
    AppendPipeline::new(
        vec![Arc::new(domain::read_model::IncidentDetailsProjection)],
        CascadeRouter::new(domain::cascade::cascade_rules()),
    )
}
