//! Command abstractions.

use uuid::Uuid;

/// Trait that all commands implement.
pub trait Command: Send + Sync + std::fmt::Debug {
    /// The type name for this command (for logging/routing).
    fn command_type(&self) -> &'static str;

    /// Correlation ID to trace this command through the system.
    fn correlation_id(&self) -> Uuid;

    /// ID recorded as the causation of the events this command produces.
    ///
    /// Caller-issued commands are their own cause. Cascaded commands override
    /// this with the ID of the triggering event.
    fn causation_id(&self) -> Uuid {
        self.correlation_id()
    }

    /// The version of the target stream the caller decided against, if any.
    ///
    /// `None` means "whatever version is current when the command is handled",
    /// which is what system-initiated commands use.
    fn expected_version(&self) -> Option<i64> {
        None
    }
}

/// Identity the system acts under when it issues commands on its own behalf.
///
/// Injected at startup and threaded into decision functions; never a global.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemActor(pub Uuid);

impl SystemActor {
    /// Returns the actor identifier.
    #[must_use]
    pub fn id(self) -> Uuid {
        self.0
    }
}
