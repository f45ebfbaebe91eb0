use chrono::NaiveDateTime;

use crate::core::schedule::{format_local_timestamp, ScheduleId, ScheduleRecord};

/// The single drafting mode the controller is in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EditingContext {
    /// Nothing drafted; the live host page is the target.
    #[default]
    Idle,
    ComposingNew {
        target_url: String,
        target_title: Option<String>,
    },
    Rescheduling {
        schedule_id: ScheduleId,
        original_timestamp: NaiveDateTime,
    },
}

impl EditingContext {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ComposingNew { .. } => "composing",
            Self::Rescheduling { .. } => "rescheduling",
        }
    }

    pub fn rescheduling_id(&self) -> Option<&ScheduleId> {
        match self {
            Self::Rescheduling { schedule_id, .. } => Some(schedule_id),
            _ => None,
        }
    }
}

/// What the controller last learned about the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ServiceAvailability {
    #[default]
    Unknown,
    Available,
    /// A transport failure was seen; writes wait for a good health check.
    Unavailable,
}

impl ServiceAvailability {
    pub fn allows_writes(&self) -> bool {
        !matches!(self, Self::Unavailable)
    }
}

/// Outcome of a successful controller operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowEvent {
    Scheduled(ScheduleRecord),
    Rescheduled {
        id: ScheduleId,
        scheduled_at: NaiveDateTime,
    },
    Deleted(ScheduleId),
    Refreshed {
        count: usize,
    },
    Opened(ScheduleId),
}

impl WorkflowEvent {
    /// Short confirmation text for the host to flash.
    pub fn status_message(&self) -> String {
        match self {
            Self::Scheduled(_) => "Scheduled!".to_string(),
            Self::Rescheduled { .. } => "Rescheduled!".to_string(),
            Self::Deleted(_) => "Deleted.".to_string(),
            Self::Refreshed { count: 0 } => "No links scheduled".to_string(),
            Self::Refreshed { count: 1 } => "1 link scheduled".to_string(),
            Self::Refreshed { count } => format!("{} links scheduled", count),
            Self::Opened(_) => "Opened.".to_string(),
        }
    }

    /// One line for the log.
    pub fn describe(&self) -> String {
        match self {
            Self::Scheduled(record) => format!(
                "scheduled {} for {}",
                record.id,
                format_local_timestamp(&record.scheduled_at)
            ),
            Self::Rescheduled { id, scheduled_at } => {
                format!("rescheduled {} to {}", id, format_local_timestamp(scheduled_at))
            }
            Self::Deleted(id) => format!("deleted {}", id),
            Self::Refreshed { count } => format!("refreshed {} record(s)", count),
            Self::Opened(id) => format!("opened {}", id),
        }
    }
}
