//! Vendor document types returned by the `/usercollection` endpoints.
//!
//! Only the fields that feed metrics are modelled; everything else in the
//! payload is ignored by serde.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer};

use crate::errors::Error;
use crate::subscriptions::EventType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentType {
    DailyReadiness,
    DailyActivity,
    DailySleep,
    Sleep,
    Heartrate,
    DailySpo2,
    DailyStress,
    DailyResilience,
}

impl DocumentType {
    /// Searched on every resync pass, in this order.
    pub const SEARCHABLE: [DocumentType; 8] = [
        DocumentType::DailyReadiness,
        DocumentType::DailyActivity,
        DocumentType::DailySleep,
        DocumentType::Sleep,
        DocumentType::Heartrate,
        DocumentType::DailySpo2,
        DocumentType::DailyStress,
        DocumentType::DailyResilience,
    ];

    /// Types we keep webhook subscriptions for and can fetch by object id.
    pub const NOTIFIED: [DocumentType; 4] = [
        DocumentType::DailyActivity,
        DocumentType::DailyReadiness,
        DocumentType::DailySleep,
        DocumentType::Sleep,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::DailyReadiness => "daily_readiness",
            DocumentType::DailyActivity => "daily_activity",
            DocumentType::DailySleep => "daily_sleep",
            DocumentType::Sleep => "sleep",
            DocumentType::Heartrate => "heartrate",
            DocumentType::DailySpo2 => "daily_spo2",
            DocumentType::DailyStress => "daily_stress",
            DocumentType::DailyResilience => "daily_resilience",
        }
    }

    /// First component of every metric name emitted for this type.
    pub fn metric_prefix(&self) -> &'static str {
        match self {
            DocumentType::DailyReadiness => "readiness",
            DocumentType::DailyActivity => "activity",
            DocumentType::DailySleep | DocumentType::Sleep => "sleep",
            DocumentType::Heartrate => "hr",
            DocumentType::DailySpo2 => "spo2",
            DocumentType::DailyStress => "stress",
            DocumentType::DailyResilience => "resilience",
        }
    }

    pub fn is_notified(&self) -> bool {
        Self::NOTIFIED.contains(self)
    }

    /// Every (data_type, event_type) pair that needs a live subscription.
    pub fn required_subscriptions() -> Vec<(DocumentType, EventType)> {
        Self::NOTIFIED
            .iter()
            .flat_map(|dt| [(*dt, EventType::Create), (*dt, EventType::Update)])
            .collect()
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::SEARCHABLE
            .iter()
            .copied()
            .find(|dt| dt.as_str() == s)
            .ok_or_else(|| Error::Protocol(format!("unhandled document type: {s}")))
    }
}

/// Envelope of every search endpoint.
#[derive(Debug, Deserialize)]
pub struct SearchResponse<D> {
    #[serde(default = "Vec::new")]
    pub data: Vec<D>,
    #[serde(default)]
    pub next_token: Option<String>,
}

pub type Contributors = BTreeMap<String, Option<f64>>;

/// A sampled series embedded in a daily document.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct IntervalMetric {
    /// Seconds between samples.
    #[serde(default)]
    pub interval: f64,
    /// `null` marks a missing sample.
    #[serde(default)]
    pub items: Vec<Option<f64>>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DailyReadiness {
    pub id: String,
    #[serde(default)]
    pub contributors: Contributors,
    pub score: Option<f64>,
    pub temperature_deviation: Option<f64>,
    pub temperature_trend_deviation: Option<f64>,
    pub day: Option<NaiveDate>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DailyActivity {
    pub id: String,
    #[serde(default)]
    pub contributors: Contributors,
    pub score: Option<f64>,
    pub active_calories: Option<f64>,
    pub average_met_minutes: Option<f64>,
    pub equivalent_walking_distance: Option<f64>,
    pub high_activity_met_minutes: Option<f64>,
    pub high_activity_time: Option<f64>,
    pub inactivity_alerts: Option<f64>,
    pub low_activity_met_minutes: Option<f64>,
    pub low_activity_time: Option<f64>,
    pub medium_activity_met_minutes: Option<f64>,
    pub medium_activity_time: Option<f64>,
    pub met: Option<IntervalMetric>,
    pub meters_to_target: Option<f64>,
    pub non_wear_time: Option<f64>,
    pub resting_time: Option<f64>,
    pub sedentary_met_minutes: Option<f64>,
    pub sedentary_time: Option<f64>,
    pub steps: Option<f64>,
    pub target_calories: Option<f64>,
    pub target_meters: Option<f64>,
    pub total_calories: Option<f64>,
    pub day: Option<NaiveDate>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DailySleep {
    pub id: String,
    #[serde(default)]
    pub contributors: Contributors,
    pub score: Option<f64>,
    pub day: Option<NaiveDate>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// One sleep period. Its metrics are stamped at `bedtime_end`.
#[derive(Debug, Clone, Deserialize)]
pub struct SleepPeriod {
    pub id: String,
    pub average_breath: Option<f64>,
    pub average_heart_rate: Option<f64>,
    pub average_hrv: Option<f64>,
    pub awake_time: Option<f64>,
    pub bedtime_end: Option<DateTime<Utc>>,
    pub bedtime_start: Option<DateTime<Utc>>,
    pub day: Option<NaiveDate>,
    pub deep_sleep_duration: Option<f64>,
    pub efficiency: Option<f64>,
    pub heart_rate: Option<IntervalMetric>,
    pub hrv: Option<IntervalMetric>,
    pub latency: Option<f64>,
    pub light_sleep_duration: Option<f64>,
    pub lowest_heart_rate: Option<f64>,
    #[serde(default)]
    pub movement_30_sec: Option<String>,
    pub period: Option<f64>,
    pub readiness_score_delta: Option<f64>,
    pub rem_sleep_duration: Option<f64>,
    pub restless_periods: Option<f64>,
    #[serde(default)]
    pub sleep_phase_5_min: Option<String>,
    pub sleep_score_delta: Option<f64>,
    pub time_in_bed: Option<f64>,
    pub total_sleep_duration: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeartrateSample {
    pub bpm: Option<f64>,
    #[serde(default)]
    pub source: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Spo2Percentage {
    pub average: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DailySpo2 {
    pub id: String,
    pub day: Option<NaiveDate>,
    #[serde(default)]
    pub spo2_percentage: Option<Spo2Percentage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DailyStress {
    pub id: String,
    pub day: Option<NaiveDate>,
    pub stress_high: Option<f64>,
    pub recovery_high: Option<f64>,
    #[serde(default)]
    pub day_summary: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DailyResilience {
    pub id: String,
    pub day: Option<NaiveDate>,
    #[serde(default)]
    pub contributors: Contributors,
    #[serde(default, deserialize_with = "deserialize_resilience_level")]
    pub level: Option<u8>,
}

/// Maps the resilience level word to 1 (limited) .. 5 (exceptional).
pub fn resilience_level(word: &str) -> Option<u8> {
    match word {
        "limited" => Some(1),
        "adequate" => Some(2),
        "solid" => Some(3),
        "strong" => Some(4),
        "exceptional" => Some(5),
        _ => None,
    }
}

fn deserialize_resilience_level<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(word) => resilience_level(&word)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown resilience level {word}"))),
    }
}
