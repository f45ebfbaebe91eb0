use std::fmt;

use chrono::{NaiveDateTime, Timelike};
use reqwest::Url;
use serde::{Deserialize, Deserializer, Serialize};

/// Wire format for schedule times: local wall clock, minute precision, no offset.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Wire format for the `date` filter of the schedule listing.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub const PENDING_STATUS: &str = "pending";

/// Identifier assigned by the scheduling service. Opaque to the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ScheduleId(String);

impl ScheduleId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScheduleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ScheduleId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl<'de> Deserialize<'de> for ScheduleId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // The daemon hands out UUID strings, but numeric ids are accepted too.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(u64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(s) => Self(s),
            RawId::Number(n) => Self(n.to_string()),
        })
    }
}

/// One pending schedule as known to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    pub id: ScheduleId,
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(with = "local_timestamp")]
    pub scheduled_at: NaiveDateTime,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opened_at: Option<String>,
}

fn default_status() -> String {
    PENDING_STATUS.to_string()
}

impl ScheduleRecord {
    pub fn new(
        id: impl Into<ScheduleId>,
        url: impl Into<String>,
        title: Option<String>,
        scheduled_at: NaiveDateTime,
    ) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            title,
            scheduled_at,
            status: default_status(),
            created_at: None,
            opened_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == PENDING_STATUS
    }

    /// Title for display: the stored title, else the url's hostname, else the raw url.
    pub fn display_title(&self) -> String {
        match self.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => hostname(&self.url).unwrap_or_else(|| self.url.clone()),
        }
    }

    pub fn display_time(&self) -> String {
        self.scheduled_at.format("%H:%M").to_string()
    }
}

/// Facts about the page the host currently shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo {
    pub url: String,
    pub title: Option<String>,
}

impl PageInfo {
    pub fn new(url: impl Into<String>, title: Option<String>) -> Self {
        Self {
            url: url.into(),
            title,
        }
    }

    pub fn display_title(&self) -> &str {
        match self.title.as_deref() {
            Some(title) if !title.trim().is_empty() => title,
            _ => "Untitled",
        }
    }
}

pub fn hostname(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}

pub fn format_local_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Drop seconds and fractions, matching what goes over the wire.
pub fn truncate_to_minute(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

/// Parse a local timestamp. `YYYY-MM-DDTHH:MM` is the canonical form; the
/// daemon echoes seconds (and sometimes fractions), so those are accepted too.
pub fn parse_local_timestamp(input: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    let input = input.trim();
    NaiveDateTime::parse_from_str(input, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S"))
}

pub(crate) mod local_timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_local_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_local_timestamp(&raw).map_err(|e| {
            serde::de::Error::custom(format!("invalid scheduled_at '{}': {}", raw, e))
        })
    }
}
