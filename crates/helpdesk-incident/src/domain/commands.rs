//! Commands for the incident context.

use helpdesk_core::command::Command;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::values::{Contact, IncidentCategory, IncidentPriority, ResolutionType};

/// Correlation and causation IDs stamped on the events one command produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Causation {
    /// Correlation ID shared by everything downstream of the original request.
    pub correlation_id: Uuid,
    /// The command or event that directly caused the new events.
    pub causation_id: Uuid,
}

impl Causation {
    /// Reads both IDs off a command.
    #[must_use]
    pub fn of(command: &dyn Command) -> Self {
        Self {
            correlation_id: command.correlation_id(),
            causation_id: command.causation_id(),
        }
    }
}

/// Command to log a new incident.
#[derive(Debug, Clone)]
pub struct LogIncident {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The new incident's identifier.
    pub incident_id: Uuid,
    /// The customer reporting the problem.
    pub customer_id: Uuid,
    /// How the customer got in touch.
    pub contact: Contact,
    /// Problem description.
    pub description: String,
    /// Who is logging it.
    pub logged_by: Uuid,
}

/// Command to categorise an incident.
#[derive(Debug, Clone)]
pub struct CategoriseIncident {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The incident identifier.
    pub incident_id: Uuid,
    /// Version the caller decided against.
    pub expected_version: Option<i64>,
    /// The new category.
    pub category: IncidentCategory,
    /// Who is categorising it.
    pub categorised_by: Uuid,
}

/// Command to set an incident's priority by hand.
#[derive(Debug, Clone)]
pub struct PrioritiseIncident {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The incident identifier.
    pub incident_id: Uuid,
    /// Version the caller decided against.
    pub expected_version: Option<i64>,
    /// The new priority.
    pub priority: IncidentPriority,
    /// Who is prioritising it.
    pub prioritised_by: Uuid,
}

/// Command to assign an agent.
#[derive(Debug, Clone)]
pub struct AssignAgentToIncident {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The incident identifier.
    pub incident_id: Uuid,
    /// Version the caller decided against.
    pub expected_version: Option<i64>,
    /// The agent to assign.
    pub agent_id: Uuid,
}

/// Command to record an agent response.
#[derive(Debug, Clone)]
pub struct RecordAgentResponse {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The incident identifier.
    pub incident_id: Uuid,
    /// Version the caller decided against.
    pub expected_version: Option<i64>,
    /// The responding agent.
    pub agent_id: Uuid,
    /// Response text.
    pub content: String,
    /// Whether the customer may see it.
    pub visible_to_customer: bool,
}

/// Command to record a customer response.
#[derive(Debug, Clone)]
pub struct RecordCustomerResponse {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The incident identifier.
    pub incident_id: Uuid,
    /// Version the caller decided against.
    pub expected_version: Option<i64>,
    /// The responding customer.
    pub customer_id: Uuid,
    /// Response text.
    pub content: String,
}

/// Command to resolve an incident.
#[derive(Debug, Clone)]
pub struct ResolveIncident {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The incident identifier.
    pub incident_id: Uuid,
    /// Version the caller decided against.
    pub expected_version: Option<i64>,
    /// Kind of resolution.
    pub resolution: ResolutionType,
    /// Who is resolving it.
    pub resolved_by: Uuid,
}

/// Command recording that the customer accepted the resolution.
#[derive(Debug, Clone)]
pub struct AcknowledgeResolution {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The incident identifier.
    pub incident_id: Uuid,
    /// Version the caller decided against.
    pub expected_version: Option<i64>,
    /// Who is acknowledging.
    pub acknowledged_by: Uuid,
}

/// Command to close an incident.
#[derive(Debug, Clone)]
pub struct CloseIncident {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The incident identifier.
    pub incident_id: Uuid,
    /// Version the caller decided against.
    pub expected_version: Option<i64>,
    /// Who is closing it.
    pub closed_by: Uuid,
}

/// Cascaded command: derive the priority from the current category.
///
/// Issued through the outbox when an incident is categorised. Always handled
/// against the current version of the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TryAssignPriority {
    /// Correlation ID inherited from the triggering event.
    #[serde(skip)]
    pub correlation_id: Uuid,
    /// The incident identifier.
    pub incident_id: Uuid,
    /// ID of the `incident.categorised` event that triggered this command.
    pub triggered_by: Uuid,
}

impl Command for LogIncident {
    fn command_type(&self) -> &'static str {
        "incident.log"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn expected_version(&self) -> Option<i64> {
        Some(0)
    }
}

impl Command for TryAssignPriority {
    fn command_type(&self) -> &'static str {
        "incident.try_assign_priority"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn causation_id(&self) -> Uuid {
        self.triggered_by
    }
}

macro_rules! caller_command {
    ($command:ty, $name:literal) => {
        impl Command for $command {
            fn command_type(&self) -> &'static str {
                $name
            }

            fn correlation_id(&self) -> Uuid {
                self.correlation_id
            }

            fn expected_version(&self) -> Option<i64> {
                self.expected_version
            }
        }
    };
}

caller_command!(CategoriseIncident, "incident.categorise");
caller_command!(PrioritiseIncident, "incident.prioritise");
caller_command!(AssignAgentToIncident, "incident.assign_agent");
caller_command!(RecordAgentResponse, "incident.record_agent_response");
caller_command!(RecordCustomerResponse, "incident.record_customer_response");
caller_command!(ResolveIncident, "incident.resolve");
caller_command!(AcknowledgeResolution, "incident.acknowledge_resolution");
caller_command!(CloseIncident, "incident.close");
