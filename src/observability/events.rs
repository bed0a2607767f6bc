//! Observable events for userbase
//!
//! Events are explicit and typed.

use std::fmt;

use super::logger::Severity;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Boot & Lifecycle
    BootStart,
    BootComplete,
    ShutdownStart,
    ShutdownComplete,
    ConfigLoaded,
    StoreOpened,
    /// Server bound and accepting requests
    Serving,

    // Record writes
    UserCreated,
    /// Create rejected by the existence check
    UserCreateConflict,
    /// Create rejected by the unique constraint after passing the check
    UserCreateRaceLost,
    UserUpdated,
    UserDeleted,
    /// Payload failed field validation
    ValidationRejected,

    // Transactions
    TxRollback,
    TxCommitFailed,
    OperationCancelled,
    StoreFailure,

    // HTTP
    RequestComplete,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::BootStart => "USERBASE_STARTUP_BEGIN",
            Event::BootComplete => "USERBASE_STARTUP_COMPLETE",
            Event::ShutdownStart => "SHUTDOWN_START",
            Event::ShutdownComplete => "SHUTDOWN_COMPLETE",
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::StoreOpened => "STORE_OPENED",
            Event::Serving => "USERBASE_SERVING",

            Event::UserCreated => "USER_CREATED",
            Event::UserCreateConflict => "USER_CREATE_CONFLICT",
            Event::UserCreateRaceLost => "USER_CREATE_RACE_LOST",
            Event::UserUpdated => "USER_UPDATED",
            Event::UserDeleted => "USER_DELETED",
            Event::ValidationRejected => "VALIDATION_REJECTED",

            Event::TxRollback => "TX_ROLLBACK",
            Event::TxCommitFailed => "TX_COMMIT_FAILED",
            Event::OperationCancelled => "OPERATION_CANCELLED",
            Event::StoreFailure => "STORE_FAILURE",

            Event::RequestComplete => "REQUEST_COMPLETE",
        }
    }

    /// Default severity for this event
    pub fn severity(&self) -> Severity {
        match self {
            Event::TxRollback | Event::RequestComplete => Severity::Trace,
            Event::UserCreateConflict
            | Event::UserCreateRaceLost
            | Event::ValidationRejected
            | Event::OperationCancelled => Severity::Warn,
            Event::TxCommitFailed | Event::StoreFailure => Severity::Error,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_are_upper_snake_case() {
        let events = [
            Event::BootStart,
            Event::BootComplete,
            Event::ShutdownStart,
            Event::ShutdownComplete,
            Event::ConfigLoaded,
            Event::StoreOpened,
            Event::Serving,
            Event::UserCreated,
            Event::UserCreateConflict,
            Event::UserCreateRaceLost,
            Event::UserUpdated,
            Event::UserDeleted,
            Event::ValidationRejected,
            Event::TxRollback,
            Event::TxCommitFailed,
            Event::OperationCancelled,
            Event::StoreFailure,
            Event::RequestComplete,
        ];

        for event in events {
            let s = event.as_str();
            assert!(!s.is_empty());
            assert!(s.chars().all(|c| c.is_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_event_severities() {
        assert_eq!(Event::UserCreated.severity(), Severity::Info);
        assert_eq!(Event::UserCreateRaceLost.severity(), Severity::Warn);
        assert_eq!(Event::StoreFailure.severity(), Severity::Error);
        assert_eq!(Event::TxRollback.severity(), Severity::Trace);
    }

    #[test]
    fn test_event_display() {
        assert_eq!(format!("{}", Event::UserCreated), "USER_CREATED");
    }
}
