//! Error types shared across all craftfleet crates.

use crate::agent::AgentId;

/// Failures surfaced by the underlying session capability.
///
/// The protocol client is opaque, so its failures are carried as strings.
/// `GoalCancelled` is reported when a newer goal (or an explicit stop)
/// replaces the goal a caller was waiting on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("session closed")]
    Closed,

    #[error("goal cancelled")]
    GoalCancelled,

    #[error("goal failed: {0}")]
    GoalFailed(String),

    #[error("{0}")]
    Io(String),
}

/// Errors returned by fleet operations.
///
/// Every variant is recovered at the dispatcher boundary and reported to the
/// caller as a structured failure; none of them terminates the daemon.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FleetError {
    #[error("agent {0} is not available")]
    AgentUnavailable(AgentId),

    #[error("agent id {0} is already registered")]
    DuplicateId(AgentId),

    #[error("fleet is at capacity ({max} agents)")]
    CapacityExceeded { max: usize },

    #[error("target not found: {0}")]
    TargetNotFound(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("invalid server config: {0}")]
    ConfigInvalid(String),

    #[error("agent {0} not found")]
    NotFound(AgentId),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("fleet runtime is not running")]
    RuntimeClosed,
}

impl FleetError {
    /// Stable machine-readable code, carried in command results and API
    /// responses.
    pub fn code(&self) -> &'static str {
        match self {
            FleetError::AgentUnavailable(_) => "agent_unavailable",
            FleetError::DuplicateId(_) => "duplicate_id",
            FleetError::CapacityExceeded { .. } => "capacity_exceeded",
            FleetError::TargetNotFound(_) => "target_not_found",
            FleetError::UnknownCommand(_) => "unknown_command",
            FleetError::InvalidParams(_) => "invalid_params",
            FleetError::ConfigInvalid(_) => "config_invalid",
            FleetError::NotFound(_) => "not_found",
            FleetError::Session(_) => "session_error",
            FleetError::Persistence(_) => "persistence_error",
            FleetError::RuntimeClosed => "runtime_closed",
        }
    }

    /// Whether this failure came from the session capability and should be
    /// counted as an error. A goal replaced by a newer one is not.
    pub fn is_session_fault(&self) -> bool {
        matches!(self, FleetError::Session(e) if *e != SessionError::GoalCancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_snake_case() {
        assert_eq!(FleetError::AgentUnavailable(1).code(), "agent_unavailable");
        assert_eq!(FleetError::CapacityExceeded { max: 3 }.code(), "capacity_exceeded");
        assert_eq!(
            FleetError::Session(SessionError::Closed).code(),
            "session_error"
        );
    }

    #[test]
    fn cancelled_goal_is_not_a_session_fault() {
        assert!(!FleetError::Session(SessionError::GoalCancelled).is_session_fault());
        assert!(FleetError::Session(SessionError::Io("broken pipe".into())).is_session_fault());
        assert!(!FleetError::TargetNotFound("Ghost".into()).is_session_fault());
    }

    #[test]
    fn session_error_converts_into_fleet_error() {
        let err: FleetError = SessionError::Closed.into();
        assert_eq!(err.to_string(), "session error: session closed");
    }
}
