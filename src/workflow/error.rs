use thiserror::Error;

use crate::core::schedule::ScheduleId;
use crate::host::HostError;
use crate::service::{detail_suffix, ServiceError};

pub const DAEMON_DOWN_MESSAGE: &str = "Daemon not running. Start the later daemon and try again.";

/// Errors surfaced by the workflow controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    /// The service rejected the request.
    #[error("service returned {status}{}", detail_suffix(.message))]
    Service { status: u16, message: String },

    /// The service could not be reached.
    #[error("service unreachable: {0}")]
    Transport(String),

    /// The service answered with something unreadable.
    #[error("unexpected response from service: {0}")]
    InvalidResponse(String),

    /// The caller asked for something the current state does not allow.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// The schedule is not in the local list.
    #[error("schedule {0} not found")]
    NotFound(ScheduleId),

    /// Writes are disabled until a health check succeeds.
    #[error("service unavailable; writes are disabled until a health check succeeds")]
    Unavailable,

    #[error("host error: {0}")]
    Host(String),
}

impl WorkflowError {
    /// Whether this failure means the daemon is down.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Unavailable)
    }

    /// Text to show the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Service { status, message } if message.is_empty() => format!("Failed: {}", status),
            Self::Service { status, message } => format!("Failed: {} {}", status, message),
            Self::InvalidResponse(detail) => format!("Failed: {}", detail),
            Self::Transport(_) | Self::Unavailable => DAEMON_DOWN_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

impl From<ServiceError> for WorkflowError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Status { status, message } => Self::Service { status, message },
            ServiceError::Transport(detail) => Self::Transport(detail),
            ServiceError::Decode(detail) => Self::InvalidResponse(detail),
        }
    }
}

impl From<HostError> for WorkflowError {
    fn from(e: HostError) -> Self {
        Self::Host(e.to_string())
    }
}
