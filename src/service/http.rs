use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use reqwest::{Client, Response, StatusCode, Url};
use serde::Serialize;

use super::{HealthReport, ScheduleList, ScheduleService, ServiceError};
use crate::config::LaterConfig;
use crate::core::schedule::{format_local_timestamp, ScheduleId, ScheduleRecord, DATE_FORMAT, PENDING_STATUS};

#[derive(Serialize)]
struct CreateBody<'a> {
    url: &'a str,
    scheduled_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
}

#[derive(Serialize)]
struct UpdateBody {
    scheduled_at: String,
}

/// Client for the later daemon's REST API.
#[derive(Clone)]
pub struct HttpScheduleClient {
    base: Url,
    http: Client,
}

impl HttpScheduleClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ServiceError> {
        let base = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| ServiceError::Transport(format!("Invalid API base {}: {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(ServiceError::Transport(format!("Invalid API base {}", base_url)));
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { base, http })
    }

    pub fn from_config(config: &LaterConfig) -> Result<Self, ServiceError> {
        Self::new(&config.api_base, config.request_timeout())
    }

    /// Fetch the daemon's health body (version, uptime, pending count).
    pub async fn health_report(&self) -> Result<HealthReport, ServiceError> {
        let resp = self
            .http
            .get(self.endpoint(&["health"]))
            .send()
            .await
            .map_err(|e| ServiceError::Transport(format!("GET /health failed: {}", e)))?;
        let resp = expect_success(resp).await?;
        resp.json::<HealthReport>()
            .await
            .map_err(|e| ServiceError::Decode(format!("Failed to parse health response: {}", e)))
    }

    /// Base URL plus `segments`, each percent-encoded as a single path segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

#[async_trait]
impl ScheduleService for HttpScheduleClient {
    async fn create_schedule(
        &self,
        url: &str,
        scheduled_at: NaiveDateTime,
        title: Option<&str>,
    ) -> Result<ScheduleRecord, ServiceError> {
        let body = CreateBody {
            url,
            scheduled_at: format_local_timestamp(&scheduled_at),
            title,
        };
        log::debug!("POST /schedules {} at {}", url, body.scheduled_at);

        let resp = self
            .http
            .post(self.endpoint(&["schedules"]))
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::Transport(format!("POST /schedules failed: {}", e)))?;
        let resp = expect_success(resp).await?;

        resp.json::<ScheduleRecord>()
            .await
            .map_err(|e| ServiceError::Decode(format!("Failed to parse created schedule: {}", e)))
    }

    async fn get_schedules(&self, date: Option<NaiveDate>) -> Result<ScheduleList, ServiceError> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(date) = date {
            query.push(("date", date.format(DATE_FORMAT).to_string()));
        }
        query.push(("status", PENDING_STATUS.to_string()));
        log::debug!("GET /schedules {:?}", query);

        let resp = self
            .http
            .get(self.endpoint(&["schedules"]))
            .query(&query)
            .send()
            .await
            .map_err(|e| ServiceError::Transport(format!("GET /schedules failed: {}", e)))?;
        let resp = expect_success(resp).await?;

        let mut list = resp
            .json::<ScheduleList>()
            .await
            .map_err(|e| ServiceError::Decode(format!("Failed to parse schedule list: {}", e)))?;

        let before = list.schedules.len();
        list.schedules.retain(ScheduleRecord::is_pending);
        if list.schedules.len() != before {
            log::debug!(
                "Ignoring {} non-pending schedule(s) in listing",
                before - list.schedules.len()
            );
        }
        Ok(list)
    }

    async fn update_schedule(
        &self,
        id: &ScheduleId,
        scheduled_at: NaiveDateTime,
    ) -> Result<Option<ScheduleRecord>, ServiceError> {
        let body = UpdateBody {
            scheduled_at: format_local_timestamp(&scheduled_at),
        };
        log::debug!("PATCH /schedules/{} to {}", id, body.scheduled_at);

        let resp = self
            .http
            .patch(self.endpoint(&["schedules", id.as_str()]))
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::Transport(format!("PATCH /schedules/{} failed: {}", id, e)))?;
        let resp = expect_success(resp).await?;

        let text = resp
            .text()
            .await
            .map_err(|e| ServiceError::Decode(format!("Failed to read update response: {}", e)))?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        // The daemon acknowledges with {"status": "updated"} rather than the record.
        match serde_json::from_str::<ScheduleRecord>(&text) {
            Ok(record) => Ok(Some(record)),
            Err(_) => {
                log::debug!("Update of {} acknowledged without a record: {}", id, text.trim());
                Ok(None)
            }
        }
    }

    async fn delete_schedule(&self, id: &ScheduleId) -> Result<(), ServiceError> {
        log::debug!("DELETE /schedules/{}", id);
        let resp = self
            .http
            .delete(self.endpoint(&["schedules", id.as_str()]))
            .send()
            .await
            .map_err(|e| ServiceError::Transport(format!("DELETE /schedules/{} failed: {}", id, e)))?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                log::debug!("Schedule {} was already gone", id);
                Ok(())
            }
            _ => expect_success(resp).await.map(|_| ()),
        }
    }

    async fn check_health(&self) -> bool {
        match self.http.get(self.endpoint(&["health"])).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                log::debug!("Health check failed: {}", e);
                false
            }
        }
    }
}

async fn expect_success(resp: Response) -> Result<Response, ServiceError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    Err(ServiceError::Status {
        status: status.as_u16(),
        message: error_detail(&text),
    })
}

/// Pull a readable message out of an error body (`{"detail": ...}` or plain text).
fn error_detail(body: &str) -> String {
    let body = body.trim();
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(detail) = value["detail"].as_str() {
            return detail.to_string();
        }
    }
    body.chars().take(200).collect()
}
