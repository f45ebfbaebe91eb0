pub mod http;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::schedule::{ScheduleId, ScheduleRecord};

/// Failures reported by a scheduling service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The service answered with a non-success status.
    #[error("service returned {status}{}", detail_suffix(.message))]
    Status { status: u16, message: String },

    /// The service could not be reached, or did not answer in time.
    #[error("service unreachable: {0}")]
    Transport(String),

    /// The service answered, but not with anything we understand.
    #[error("unexpected response from service: {0}")]
    Decode(String),
}

pub(crate) fn detail_suffix(message: &str) -> String {
    if message.is_empty() {
        String::new()
    } else {
        format!(": {}", message)
    }
}

/// Body of the schedule listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleList {
    pub schedules: Vec<ScheduleRecord>,
    #[serde(default)]
    pub total: Option<usize>,
}

/// Body of the health endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub uptime_seconds: Option<f64>,
    #[serde(default)]
    pub pending_count: Option<u64>,
}

/// Operations the workflow controller needs from the scheduling service.
#[async_trait]
pub trait ScheduleService: Send + Sync {
    async fn create_schedule(
        &self,
        url: &str,
        scheduled_at: NaiveDateTime,
        title: Option<&str>,
    ) -> Result<ScheduleRecord, ServiceError>;

    /// Pending schedules, optionally limited to one local date.
    async fn get_schedules(&self, date: Option<NaiveDate>) -> Result<ScheduleList, ServiceError>;

    /// Move a schedule. Returns the updated record when the service echoes one.
    async fn update_schedule(
        &self,
        id: &ScheduleId,
        scheduled_at: NaiveDateTime,
    ) -> Result<Option<ScheduleRecord>, ServiceError>;

    /// Delete a schedule. A schedule that is already gone counts as deleted.
    async fn delete_schedule(&self, id: &ScheduleId) -> Result<(), ServiceError>;

    /// Whether the service is up. Never fails; unreachable means `false`.
    async fn check_health(&self) -> bool;
}
