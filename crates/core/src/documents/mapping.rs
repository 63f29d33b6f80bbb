//! Explicit field-to-metric tables for every document type.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use log::{debug, warn};
use serde::de::DeserializeOwned;

use super::documents_model::{
    Contributors, DailyActivity, DailyReadiness, DailyResilience, DailySleep, DailySpo2,
    DailyStress, DocumentType, HeartrateSample, IntervalMetric, SearchResponse, SleepPeriod,
};
use crate::errors::Result;
use crate::observations::Observation;

/// Result of mapping one search page.
#[derive(Debug, Default)]
pub struct MappedPage {
    pub documents: usize,
    pub observations: Vec<Observation>,
    pub next_token: Option<String>,
}

/// Collects the observations of one document.
struct Emitter<'a> {
    username: &'a str,
    prefix: &'static str,
    at: DateTime<Utc>,
    out: Vec<Observation>,
}

impl<'a> Emitter<'a> {
    fn new(username: &'a str, doc_type: DocumentType, at: DateTime<Utc>) -> Self {
        Self {
            username,
            prefix: doc_type.metric_prefix(),
            at,
            out: Vec::new(),
        }
    }

    fn value_at(&mut self, field: &str, value: f64, at: DateTime<Utc>) {
        self.out.push(Observation::new(
            at,
            self.username,
            format!("{}.{}", self.prefix, field),
            value,
        ));
    }

    fn values(&mut self, fields: &[(&str, Option<f64>)]) {
        for (field, value) in fields {
            if let Some(v) = value {
                self.value_at(field, *v, self.at);
            }
        }
    }

    fn contributors(&mut self, contributors: &Contributors) {
        for (key, value) in contributors {
            if let Some(v) = value {
                self.value_at(&format!("contrib.{}", key.to_lowercase()), *v, self.at);
            }
        }
    }

    /// Missing and zero samples are skipped; zero is never a valid heart
    /// rate, hrv or met reading. A series whose sample times fall outside
    /// the representable range is dropped whole.
    fn interval(&mut self, field: &str, metric: Option<&IntervalMetric>) {
        let Some(metric) = metric else { return };
        let Some(start) = metric.timestamp else { return };
        let step_ms = (metric.interval * 1000.0).round();
        if !step_ms.is_finite() {
            warn!(
                "{}: dropping {field} series with interval {}",
                self.username, metric.interval
            );
            return;
        }
        let mut samples = Vec::with_capacity(metric.items.len());
        for (i, sample) in metric.items.iter().enumerate() {
            let Some(v) = sample.filter(|v| *v > 0.0) else {
                continue;
            };
            let at = (step_ms as i64)
                .checked_mul(i as i64)
                .and_then(Duration::try_milliseconds)
                .and_then(|offset| start.checked_add_signed(offset));
            match at {
                Some(at) => samples.push((at, v)),
                None => {
                    warn!(
                        "{}: dropping {field} series with interval {}, sample {i} is out of range",
                        self.username, metric.interval
                    );
                    return;
                }
            }
        }
        for (at, v) in samples {
            self.value_at(field, v, at);
        }
    }

    /// Expands a digit string sampled every `step_secs`, ending at the
    /// document timestamp.
    fn digits(&mut self, field: &str, series: Option<&str>, step_secs: i64) {
        let Some(series) = series else { return };
        let len = series.chars().count() as i64;
        let Some(start) = offset_secs(self.at, step_secs, -len) else {
            warn!("{}: dropping {field} series of {len} samples", self.username);
            return;
        };
        for (i, ch) in series.chars().enumerate() {
            let Some(d) = ch.to_digit(10) else { continue };
            // Every sample lies between `start` and `self.at`.
            if let Some(at) = offset_secs(start, step_secs, i as i64) {
                self.value_at(field, f64::from(d), at);
            }
        }
    }

    fn finish(self) -> Vec<Observation> {
        self.out
    }
}

/// `at + step_secs * n`, or None when it does not fit.
fn offset_secs(at: DateTime<Utc>, step_secs: i64, n: i64) -> Option<DateTime<Utc>> {
    step_secs
        .checked_mul(n)
        .and_then(Duration::try_seconds)
        .and_then(|offset| at.checked_add_signed(offset))
}

fn day_start(day: Option<NaiveDate>) -> Option<DateTime<Utc>> {
    day.and_then(|d| d.and_hms_opt(0, 0, 0)).map(|dt| dt.and_utc())
}

fn readiness(doc: &DailyReadiness, username: &str) -> Option<Vec<Observation>> {
    let at = doc.timestamp.or_else(|| day_start(doc.day))?;
    let mut e = Emitter::new(username, DocumentType::DailyReadiness, at);
    e.values(&[
        ("score", doc.score),
        ("temperature_deviation", doc.temperature_deviation),
        ("temperature_trend_deviation", doc.temperature_trend_deviation),
    ]);
    e.contributors(&doc.contributors);
    Some(e.finish())
}

fn activity(doc: &DailyActivity, username: &str) -> Option<Vec<Observation>> {
    let at = doc.timestamp.or_else(|| day_start(doc.day))?;
    let mut e = Emitter::new(username, DocumentType::DailyActivity, at);
    e.values(&[
        ("score", doc.score),
        ("active_calories", doc.active_calories),
        ("average_met_minutes", doc.average_met_minutes),
        ("equivalent_walking_distance", doc.equivalent_walking_distance),
        ("high_activity_met_minutes", doc.high_activity_met_minutes),
        ("high_activity_time", doc.high_activity_time),
        ("inactivity_alerts", doc.inactivity_alerts),
        ("low_activity_met_minutes", doc.low_activity_met_minutes),
        ("low_activity_time", doc.low_activity_time),
        ("medium_activity_met_minutes", doc.medium_activity_met_minutes),
        ("medium_activity_time", doc.medium_activity_time),
        ("meters_to_target", doc.meters_to_target),
        ("non_wear_time", doc.non_wear_time),
        ("resting_time", doc.resting_time),
        ("sedentary_met_minutes", doc.sedentary_met_minutes),
        ("sedentary_time", doc.sedentary_time),
        ("steps", doc.steps),
        ("target_calories", doc.target_calories),
        ("target_meters", doc.target_meters),
        ("total_calories", doc.total_calories),
    ]);
    e.contributors(&doc.contributors);
    e.interval("met", doc.met.as_ref());
    Some(e.finish())
}

fn daily_sleep(doc: &DailySleep, username: &str) -> Option<Vec<Observation>> {
    let at = doc.timestamp.or_else(|| day_start(doc.day))?;
    let mut e = Emitter::new(username, DocumentType::DailySleep, at);
    e.values(&[("score", doc.score)]);
    e.contributors(&doc.contributors);
    Some(e.finish())
}

fn sleep_period(doc: &SleepPeriod, username: &str) -> Option<Vec<Observation>> {
    let at = doc.bedtime_end?;
    let mut e = Emitter::new(username, DocumentType::Sleep, at);
    e.values(&[
        ("average_breath", doc.average_breath),
        ("average_heart_rate", doc.average_heart_rate),
        ("average_hrv", doc.average_hrv),
        ("awake_time", doc.awake_time),
        ("deep_sleep_duration", doc.deep_sleep_duration),
        ("efficiency", doc.efficiency),
        ("latency", doc.latency),
        ("light_sleep_duration", doc.light_sleep_duration),
        ("lowest_heart_rate", doc.lowest_heart_rate),
        ("period", doc.period),
        ("readiness_score_delta", doc.readiness_score_delta),
        ("rem_sleep_duration", doc.rem_sleep_duration),
        ("restless_periods", doc.restless_periods),
        ("sleep_score_delta", doc.sleep_score_delta),
        ("time_in_bed", doc.time_in_bed),
        ("total_sleep_duration", doc.total_sleep_duration),
    ]);
    e.interval("heart_rate", doc.heart_rate.as_ref());
    e.interval("hrv", doc.hrv.as_ref());
    e.digits("movement_30_sec", doc.movement_30_sec.as_deref(), 30);
    e.digits("sleep_phase_5_min", doc.sleep_phase_5_min.as_deref(), 300);
    Some(e.finish())
}

fn heartrate(doc: &HeartrateSample, username: &str) -> Option<Vec<Observation>> {
    let mut e = Emitter::new(username, DocumentType::Heartrate, doc.timestamp?);
    e.values(&[("bpm", doc.bpm)]);
    Some(e.finish())
}

fn spo2(doc: &DailySpo2, username: &str) -> Option<Vec<Observation>> {
    let mut e = Emitter::new(username, DocumentType::DailySpo2, day_start(doc.day)?);
    let average = doc.spo2_percentage.as_ref().and_then(|p| p.average);
    e.values(&[("average", average)]);
    Some(e.finish())
}

fn stress(doc: &DailyStress, username: &str) -> Option<Vec<Observation>> {
    let mut e = Emitter::new(username, DocumentType::DailyStress, day_start(doc.day)?);
    e.values(&[
        ("stress_high", doc.stress_high),
        ("recovery_high", doc.recovery_high),
    ]);
    Some(e.finish())
}

fn resilience(doc: &DailyResilience, username: &str) -> Option<Vec<Observation>> {
    let mut e = Emitter::new(
        username,
        DocumentType::DailyResilience,
        day_start(doc.day)?,
    );
    e.values(&[("level", doc.level.map(f64::from))]);
    e.contributors(&doc.contributors);
    Some(e.finish())
}

fn map_page<D, F>(body: &[u8], username: &str, map: F) -> Result<MappedPage>
where
    D: DeserializeOwned,
    F: Fn(&D, &str) -> Option<Vec<Observation>>,
{
    let page: SearchResponse<D> = serde_json::from_slice(body)?;
    let mut observations = Vec::new();
    for doc in &page.data {
        match map(doc, username) {
            Some(obs) => observations.extend(obs),
            None => debug!("skipping document without timestamp for {username}"),
        }
    }
    Ok(MappedPage {
        documents: page.data.len(),
        observations,
        next_token: page.next_token.filter(|t| !t.is_empty()),
    })
}

fn map_single<D, F>(body: &[u8], username: &str, map: F) -> Result<Vec<Observation>>
where
    D: DeserializeOwned,
    F: Fn(&D, &str) -> Option<Vec<Observation>>,
{
    let doc: D = serde_json::from_slice(body)?;
    Ok(map(&doc, username).unwrap_or_default())
}

/// Maps one page of a search response for `doc_type`.
pub fn map_search_page(doc_type: DocumentType, body: &[u8], username: &str) -> Result<MappedPage> {
    match doc_type {
        DocumentType::DailyReadiness => map_page(body, username, readiness),
        DocumentType::DailyActivity => map_page(body, username, activity),
        DocumentType::DailySleep => map_page(body, username, daily_sleep),
        DocumentType::Sleep => map_page(body, username, sleep_period),
        DocumentType::Heartrate => map_page(body, username, heartrate),
        DocumentType::DailySpo2 => map_page(body, username, spo2),
        DocumentType::DailyStress => map_page(body, username, stress),
        DocumentType::DailyResilience => map_page(body, username, resilience),
    }
}

/// Maps a single document fetched by object id.
pub fn map_document(doc_type: DocumentType, body: &[u8], username: &str) -> Result<Vec<Observation>> {
    match doc_type {
        DocumentType::DailyReadiness => map_single(body, username, readiness),
        DocumentType::DailyActivity => map_single(body, username, activity),
        DocumentType::DailySleep => map_single(body, username, daily_sleep),
        DocumentType::Sleep => map_single(body, username, sleep_period),
        DocumentType::Heartrate => map_single(body, username, heartrate),
        DocumentType::DailySpo2 => map_single(body, username, spo2),
        DocumentType::DailyStress => map_single(body, username, stress),
        DocumentType::DailyResilience => map_single(body, username, resilience),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fields(obs: &[Observation]) -> Vec<&str> {
        obs.iter().map(|o| o.field.as_str()).collect()
    }

    #[test]
    fn readiness_maps_scores_and_contributors() {
        let body = br#"{"data":[{"id":"r1","score":81,"temperature_deviation":-0.1,
            "temperature_trend_deviation":null,"day":"2024-01-02",
            "timestamp":"2024-01-02T00:00:00+00:00",
            "contributors":{"HRV_Balance":75,"sleep_balance":null}}],"next_token":null}"#;
        let page = map_search_page(DocumentType::DailyReadiness, body, "alice").unwrap();
        assert_eq!(page.documents, 1);
        assert!(page.next_token.is_none());
        assert_eq!(
            fields(&page.observations),
            vec![
                "readiness.score",
                "readiness.temperature_deviation",
                "readiness.contrib.hrv_balance"
            ]
        );
        assert_eq!(page.observations[0].value, 81.0);
        assert_eq!(page.observations[0].username, "alice");
    }

    #[test]
    fn activity_met_series_skips_nulls_and_zeros() {
        let body = br#"{"id":"a1","steps":1000,"timestamp":"2024-01-02T04:00:00+00:00",
            "met":{"interval":60.0,"items":[1.5,null,0.0,2.0],
                   "timestamp":"2024-01-02T04:00:00.000+00:00"}}"#;
        let obs = map_document(DocumentType::DailyActivity, body, "bob").unwrap();
        let met: Vec<&Observation> = obs.iter().filter(|o| o.field == "activity.met").collect();
        assert_eq!(met.len(), 2);
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 4, 0, 0).unwrap();
        assert_eq!(met[0].timestamp, start);
        assert_eq!(met[1].timestamp, start + Duration::minutes(3));
        assert!(obs.iter().any(|o| o.field == "activity.steps" && o.value == 1000.0));
    }

    #[test]
    fn sleep_period_expands_phase_strings_back_from_bedtime_end() {
        let body = br#"{"id":"s1","efficiency":90,
            "bedtime_start":"2024-01-01T23:00:00+00:00",
            "bedtime_end":"2024-01-02T07:00:00+00:00",
            "sleep_phase_5_min":"412","movement_30_sec":"1"}"#;
        let obs = map_document(DocumentType::Sleep, body, "carol").unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 2, 7, 0, 0).unwrap();

        let phases: Vec<&Observation> = obs
            .iter()
            .filter(|o| o.field == "sleep.sleep_phase_5_min")
            .collect();
        assert_eq!(phases.len(), 3);
        assert_eq!(phases[0].value, 4.0);
        assert_eq!(phases[0].timestamp, end - Duration::minutes(15));
        assert_eq!(phases[2].timestamp, end - Duration::minutes(5));

        let movement: Vec<&Observation> = obs
            .iter()
            .filter(|o| o.field == "sleep.movement_30_sec")
            .collect();
        assert_eq!(movement[0].timestamp, end - Duration::seconds(30));
        assert!(obs.iter().any(|o| o.field == "sleep.efficiency"));
    }

    #[test]
    fn heartrate_search_page_carries_next_token() {
        let body = br#"{"data":[
            {"bpm":61,"source":"awake","timestamp":"2024-01-02T10:00:00+00:00"},
            {"bpm":62,"source":"awake","timestamp":"2024-01-02T10:05:00+00:00"}],
            "next_token":"abc"}"#;
        let page = map_search_page(DocumentType::Heartrate, body, "dave").unwrap();
        assert_eq!(page.documents, 2);
        assert_eq!(page.next_token.as_deref(), Some("abc"));
        assert_eq!(fields(&page.observations), vec!["hr.bpm", "hr.bpm"]);
    }

    #[test]
    fn day_only_documents_use_midnight_utc() {
        let body = br#"{"data":[{"id":"x","day":"2024-02-03","spo2_percentage":{"average":97.5}}]}"#;
        let page = map_search_page(DocumentType::DailySpo2, body, "erin").unwrap();
        assert_eq!(page.observations.len(), 1);
        assert_eq!(page.observations[0].field, "spo2.average");
        assert_eq!(
            page.observations[0].timestamp,
            Utc.with_ymd_and_hms(2024, 2, 3, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn resilience_level_becomes_numeric() {
        let body = br#"{"data":[{"id":"x","day":"2024-02-03","level":"solid",
            "contributors":{"sleep_recovery":61.2}}]}"#;
        let page = map_search_page(DocumentType::DailyResilience, body, "finn").unwrap();
        assert_eq!(
            fields(&page.observations),
            vec!["resilience.level", "resilience.contrib.sleep_recovery"]
        );
        assert_eq!(page.observations[0].value, 3.0);
    }

    #[test]
    fn out_of_range_met_interval_drops_only_that_series() {
        let body = br#"{"id":"a1","steps":1000,"timestamp":"2024-01-02T04:00:00+00:00",
            "met":{"interval":1e18,"items":[1.0,1.0,1.0],
                   "timestamp":"2024-01-02T04:00:00.000+00:00"}}"#;
        let obs = map_document(DocumentType::DailyActivity, body, "bob").unwrap();
        assert!(obs.iter().all(|o| o.field != "activity.met"));
        assert!(obs.iter().any(|o| o.field == "activity.steps"));

        let body = br#"{"id":"a2","timestamp":"2024-01-02T04:00:00+00:00",
            "met":{"interval":-1e300,"items":[1.0,1.0],
                   "timestamp":"2024-01-02T04:00:00.000+00:00"}}"#;
        let obs = map_document(DocumentType::DailyActivity, body, "bob").unwrap();
        assert!(obs.iter().all(|o| o.field != "activity.met"));
    }

    #[test]
    fn digit_series_starting_before_the_earliest_time_is_dropped() {
        let mut e = Emitter::new("carol", DocumentType::Sleep, DateTime::<Utc>::MIN_UTC);
        e.digits("sleep_phase_5_min", Some("4444"), 300);
        assert!(e.finish().is_empty());
    }

    #[test]
    fn unparseable_body_is_a_protocol_error() {
        let err = map_search_page(DocumentType::DailySleep, b"<html>", "gus").unwrap_err();
        assert!(!err.is_fatal());
    }
}
