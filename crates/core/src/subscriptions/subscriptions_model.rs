//! Webhook subscription domain models.
//!
//! Subscriptions are scoped to the API client, not to any user: the remote
//! side identifies them by (client, data_type, event_type) and notifies us for
//! every user that granted this client access.

use std::fmt;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Event kinds a subscription can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Create,
    Update,
    Delete,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Create => "create",
            EventType::Update => "update",
            EventType::Delete => "delete",
        }
    }

    /// Create and update events point at a document worth fetching.
    pub fn carries_document(&self) -> bool {
        matches!(self, EventType::Create | EventType::Update)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A subscription as reported by the remote webhook API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subscription {
    pub id: String,
    #[serde(default)]
    pub callback_url: String,
    pub data_type: String,
    pub event_type: String,
    /// Only meaningful in the creation response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_token: Option<String>,
    #[serde(default, deserialize_with = "deserialize_remote_time")]
    pub expiration_time: Option<DateTime<Utc>>,
}

impl Subscription {
    pub fn matches(&self, data_type: &str, event_type: &str) -> bool {
        self.data_type == data_type && self.event_type == event_type
    }

    /// Time left before expiry; `None` when the remote gave no expiration.
    pub fn remaining_lifetime(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expiration_time.map(|expiry| expiry - now)
    }

    pub fn label(&self) -> String {
        format!("{}/{}", self.data_type, self.event_type)
    }
}

/// Accepts RFC 3339 as well as the zone-less `YYYY-MM-DDTHH:MM:SS[.f]` form
/// the webhook API sometimes returns; the latter is taken as UTC.
pub fn parse_remote_time(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn deserialize_remote_time<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_remote_time(s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("unparseable time {s:?}"))),
    }
}
