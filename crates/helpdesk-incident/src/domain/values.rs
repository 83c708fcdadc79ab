//! Value types carried by incident events.

use serde::{Deserialize, Serialize};

/// How the customer got in touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactChannel {
    /// Email.
    Email,
    /// Telephone.
    Phone,
    /// Walked up to the desk.
    InPerson,
    /// Web form.
    GeneralWeb,
}

/// Contact details recorded when an incident is logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Channel the incident arrived through.
    pub channel: ContactChannel,
    /// Given name, if supplied.
    #[serde(default)]
    pub first_name: Option<String>,
    /// Family name, if supplied.
    #[serde(default)]
    pub last_name: Option<String>,
    /// Email address, if supplied.
    #[serde(default)]
    pub email_address: Option<String>,
    /// Phone number, if supplied.
    #[serde(default)]
    pub phone_number: Option<String>,
}

/// Area an incident belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncidentCategory {
    /// Application software.
    Software,
    /// Physical equipment.
    Hardware,
    /// Connectivity.
    Network,
    /// Data stores.
    Database,
}

impl IncidentCategory {
    /// The priority an incident in this category is given automatically.
    #[must_use]
    pub fn default_priority(self) -> IncidentPriority {
        match self {
            Self::Database => IncidentPriority::Critical,
            Self::Network => IncidentPriority::High,
            Self::Hardware => IncidentPriority::Medium,
            Self::Software => IncidentPriority::Low,
        }
    }
}

/// Urgency of an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncidentPriority {
    /// Drop everything.
    Critical,
    /// Next in line.
    High,
    /// Normal queue.
    Medium,
    /// When time allows.
    Low,
}

/// How an incident was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionType {
    /// A workaround is in place.
    Temporary,
    /// The root cause is fixed.
    Permanent,
    /// Nothing was wrong.
    NotAnIncident,
}

/// Lifecycle position of an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncidentStatus {
    /// Logged and being worked.
    Open,
    /// An agent resolved it; awaiting the customer.
    Resolved,
    /// The customer accepted the resolution.
    ResolutionAcknowledgedByCustomer,
    /// Terminal.
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_default_priority_table() {
        assert_eq!(
            IncidentCategory::Database.default_priority(),
            IncidentPriority::Critical
        );
        assert_eq!(
            IncidentCategory::Network.default_priority(),
            IncidentPriority::High
        );
        assert_eq!(
            IncidentCategory::Hardware.default_priority(),
            IncidentPriority::Medium
        );
        assert_eq!(
            IncidentCategory::Software.default_priority(),
            IncidentPriority::Low
        );
    }

    #[test]
    fn test_contact_accepts_missing_optional_fields() {
        let contact: Contact = serde_json::from_value(serde_json::json!({
            "channel": "Email",
            "email_address": "jo@example.com"
        }))
        .unwrap();

        assert_eq!(contact.channel, ContactChannel::Email);
        assert_eq!(contact.email_address.as_deref(), Some("jo@example.com"));
        assert!(contact.first_name.is_none());
    }
}
