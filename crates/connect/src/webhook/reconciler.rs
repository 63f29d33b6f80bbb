//! Mark-and-sweep reconciliation of webhook subscriptions.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use log::{info, warn};
use ourabridge_core::documents::DocumentType;
use ourabridge_core::subscriptions::{Subscription, SubscriptionStore};

use super::client::WebhookApi;
use crate::error::Result;

/// Consecutive create/renew failures after which a pass gives up.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;

pub const DEFAULT_RENEW_THRESHOLD_SECS: i64 = 24 * 60 * 60;

/// What happens to a local record the remote list no longer contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SweepPolicy {
    /// Forget it locally.
    #[default]
    LocalOnly,
    /// Forget it locally and issue a remote DELETE as well.
    LocalAndRemote,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub remote: usize,
    pub swept: Vec<String>,
    pub created: Vec<String>,
    pub renewed: Vec<String>,
    pub healthy: usize,
    pub aborted: bool,
}

/// Blunt circuit breaker spanning one pass.
#[derive(Debug, Default)]
struct FailureCounter {
    consecutive: u32,
}

impl FailureCounter {
    fn success(&mut self) {
        self.consecutive = 0;
    }

    /// Records a failure; true once the pass should stop.
    fn failure(&mut self) -> bool {
        self.consecutive += 1;
        self.consecutive >= MAX_CONSECUTIVE_FAILURES
    }
}

pub struct SubscriptionReconciler<W> {
    api: W,
    store: Arc<SubscriptionStore>,
    renew_threshold: Duration,
    sweep: SweepPolicy,
}

impl<W: WebhookApi> SubscriptionReconciler<W> {
    pub fn new(api: W, store: Arc<SubscriptionStore>) -> Self {
        Self {
            api,
            store,
            renew_threshold: Duration::seconds(DEFAULT_RENEW_THRESHOLD_SECS),
            sweep: SweepPolicy::default(),
        }
    }

    pub fn with_renew_threshold(mut self, threshold: Duration) -> Self {
        self.renew_threshold = threshold;
        self
    }

    pub fn with_sweep_policy(mut self, sweep: SweepPolicy) -> Self {
        self.sweep = sweep;
        self
    }

    /// Runs one pass.
    ///
    /// A failed list call ends the pass before anything local is touched; a
    /// store failure ends it with that error.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let remote = self.api.list().await?;
        let mut report = ReconcileReport {
            remote: remote.len(),
            ..Default::default()
        };

        // Mark: the remote copy always wins.
        let mut seen = HashSet::with_capacity(remote.len());
        for sub in remote {
            seen.insert(sub.id.clone());
            self.store.replace(sub)?;
        }

        // Sweep.
        for stale in self.store.list().into_iter().filter(|s| !seen.contains(&s.id)) {
            self.store.delete(&stale.id)?;
            info!(
                "deleted forgotten subscription {} id={}",
                stale.label(),
                stale.id
            );
            if self.sweep == SweepPolicy::LocalAndRemote {
                if let Err(e) = self.api.delete(&stale.id).await {
                    warn!("remote delete of subscription {} failed: {e}", stale.id);
                }
            }
            report.swept.push(stale.id);
        }

        let mut failures = FailureCounter::default();
        let now = Utc::now();
        for (data_type, event_type) in DocumentType::required_subscriptions() {
            let label = format!("{data_type}/{event_type}");
            let outcome = match self.store.find(data_type.as_str(), event_type.as_str()) {
                None => match self.api.create(data_type, event_type).await {
                    Ok(created) => {
                        info!("created subscription {label} id={}", created.id);
                        report.created.push(created.id.clone());
                        Ok(created)
                    }
                    Err(e) => Err(e),
                },
                Some(sub) if self.needs_renewal(&sub, now) => {
                    match self.api.renew(&sub.id).await {
                        Ok(renewed) => {
                            info!(
                                "renewed subscription {label} until {}",
                                expiry_label(&renewed)
                            );
                            report.renewed.push(renewed.id.clone());
                            Ok(renewed)
                        }
                        Err(e) => Err(e),
                    }
                }
                Some(sub) => {
                    info!(
                        "subscription {label} is good until {}",
                        expiry_label(&sub)
                    );
                    report.healthy += 1;
                    continue;
                }
            };

            match outcome {
                Ok(sub) => {
                    failures.success();
                    self.store.replace(sub)?;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("webhook api call for {label} failed: {e}");
                    if failures.failure() {
                        warn!("too many webhook api failures, giving up for now");
                        report.aborted = true;
                        break;
                    }
                }
            }
        }
        Ok(report)
    }

    /// A record without an expiration is renewed.
    fn needs_renewal(&self, sub: &Subscription, now: chrono::DateTime<Utc>) -> bool {
        sub.remaining_lifetime(now)
            .map_or(true, |left| left < self.renew_threshold)
    }
}

fn expiry_label(sub: &Subscription) -> String {
    sub.expiration_time
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectError;
    use async_trait::async_trait;
    use ourabridge_core::subscriptions::EventType;
    use std::sync::Mutex;
    use tempfile::{tempdir, TempDir};

    #[derive(Default)]
    struct FakeState {
        remote: Vec<Subscription>,
        next_id: usize,
        create_attempts: usize,
        renews: usize,
        deletes: Vec<String>,
    }

    struct FakeWebhookApi {
        state: Mutex<FakeState>,
        fail_list: bool,
        fail_create: fn(usize) -> bool,
    }

    impl FakeWebhookApi {
        fn new(remote: Vec<Subscription>) -> Self {
            Self {
                state: Mutex::new(FakeState {
                    remote,
                    ..Default::default()
                }),
                fail_list: false,
                fail_create: |_| false,
            }
        }
    }

    #[async_trait]
    impl<'a> WebhookApi for &'a FakeWebhookApi {
        async fn list(&self) -> Result<Vec<Subscription>> {
            if self.fail_list {
                return Err(ConnectError::api(503, "unavailable"));
            }
            Ok(self.state.lock().unwrap().remote.clone())
        }

        async fn create(
            &self,
            data_type: DocumentType,
            event_type: EventType,
        ) -> Result<Subscription> {
            let mut state = self.state.lock().unwrap();
            state.create_attempts += 1;
            if (self.fail_create)(state.create_attempts) {
                return Err(ConnectError::api(500, "create failed"));
            }
            state.next_id += 1;
            let sub = sub(
                &format!("new-{}", state.next_id),
                data_type.as_str(),
                event_type.as_str(),
                30 * 24,
            );
            state.remote.push(sub.clone());
            Ok(sub)
        }

        async fn renew(&self, id: &str) -> Result<Subscription> {
            let mut state = self.state.lock().unwrap();
            state.renews += 1;
            let sub = state
                .remote
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or_else(|| ConnectError::api(404, "no such subscription"))?;
            sub.expiration_time = Some(Utc::now() + Duration::days(30));
            Ok(sub.clone())
        }

        async fn delete(&self, id: &str) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            state.remote.retain(|s| s.id != id);
            state.deletes.push(id.to_string());
            Ok(())
        }
    }

    fn sub(id: &str, data_type: &str, event_type: &str, hours_left: i64) -> Subscription {
        Subscription {
            id: id.into(),
            callback_url: "https://bridge.example/event".into(),
            data_type: data_type.into(),
            event_type: event_type.into(),
            verification_token: None,
            expiration_time: Some(Utc::now() + Duration::hours(hours_left)),
        }
    }

    fn all_required(hours_left: i64) -> Vec<Subscription> {
        DocumentType::required_subscriptions()
            .into_iter()
            .enumerate()
            .map(|(i, (dt, et))| sub(&format!("r{i}"), dt.as_str(), et.as_str(), hours_left))
            .collect()
    }

    fn store() -> (TempDir, Arc<SubscriptionStore>) {
        let dir = tempdir().unwrap();
        let store = SubscriptionStore::open(dir.path().join("subs.json")).unwrap();
        (dir, Arc::new(store))
    }

    fn ids(store: &SubscriptionStore) -> Vec<String> {
        let mut ids: Vec<String> = store.list().into_iter().map(|s| s.id).collect();
        ids.sort();
        ids
    }

    #[tokio::test]
    async fn second_pass_against_unchanged_remote_is_a_no_op() {
        let (_dir, store) = store();
        let api = FakeWebhookApi::new(vec![]);
        let reconciler = SubscriptionReconciler::new(&api, store.clone());

        let first = reconciler.reconcile().await.unwrap();
        assert_eq!(first.created.len(), 8);
        let after_first = ids(&store);

        let second = reconciler.reconcile().await.unwrap();
        assert!(second.created.is_empty());
        assert!(second.renewed.is_empty());
        assert_eq!(second.healthy, 8);
        assert_eq!(ids(&store), after_first);
        assert_eq!(api.state.lock().unwrap().create_attempts, 8);
    }

    #[tokio::test]
    async fn records_unknown_to_remote_are_swept_locally_only() {
        let (_dir, store) = store();
        store.replace(sub("x", "sleep", "create", 500)).unwrap();
        store.replace(sub("y", "sleep", "update", 500)).unwrap();
        let api = FakeWebhookApi::new(vec![sub("x", "sleep", "create", 500)]);

        let report = SubscriptionReconciler::new(&api, store.clone())
            .reconcile()
            .await
            .unwrap();

        assert_eq!(report.swept, vec!["y".to_string()]);
        let ids = ids(&store);
        assert!(ids.contains(&"x".to_string()));
        assert!(!ids.contains(&"y".to_string()));
        assert!(api.state.lock().unwrap().deletes.is_empty());
    }

    #[tokio::test]
    async fn remote_sweep_policy_also_deletes_remotely() {
        let (_dir, store) = store();
        store.replace(sub("y", "workout", "create", 500)).unwrap();
        let api = FakeWebhookApi::new(all_required(500));

        SubscriptionReconciler::new(&api, store.clone())
            .with_sweep_policy(SweepPolicy::LocalAndRemote)
            .reconcile()
            .await
            .unwrap();

        assert_eq!(api.state.lock().unwrap().deletes, vec!["y".to_string()]);
        assert_eq!(store.len(), 8);
    }

    #[tokio::test]
    async fn remote_copy_overwrites_local_record_with_same_id() {
        let (_dir, store) = store();
        store.replace(sub("r0", "daily_activity", "create", 1)).unwrap();
        let api = FakeWebhookApi::new(all_required(500));

        let report = SubscriptionReconciler::new(&api, store.clone())
            .reconcile()
            .await
            .unwrap();

        assert!(report.renewed.is_empty());
        let left = store.find_by_id("r0").unwrap().remaining_lifetime(Utc::now());
        assert!(left.unwrap() > Duration::hours(400));
    }

    #[tokio::test]
    async fn short_dated_subscriptions_are_renewed() {
        let (_dir, store) = store();
        let mut remote = all_required(500);
        remote[0].expiration_time = Some(Utc::now() + Duration::hours(2));
        remote[1].expiration_time = None;
        let api = FakeWebhookApi::new(remote);

        let report = SubscriptionReconciler::new(&api, store.clone())
            .reconcile()
            .await
            .unwrap();

        assert_eq!(report.renewed, vec!["r0".to_string(), "r1".to_string()]);
        assert_eq!(report.healthy, 6);
        let renewed = store.find_by_id("r1").unwrap();
        assert!(renewed.remaining_lifetime(Utc::now()).unwrap() > Duration::days(29));
    }

    #[tokio::test]
    async fn renew_threshold_is_configurable() {
        let (_dir, store) = store();
        let api = FakeWebhookApi::new(all_required(5));

        let report = SubscriptionReconciler::new(&api, store.clone())
            .with_renew_threshold(Duration::hours(2))
            .reconcile()
            .await
            .unwrap();

        assert!(report.renewed.is_empty());
        assert_eq!(report.healthy, 8);
    }

    #[tokio::test]
    async fn three_consecutive_failures_abort_the_pass() {
        let (_dir, store) = store();
        let mut api = FakeWebhookApi::new(vec![]);
        api.fail_create = |_| true;

        let report = SubscriptionReconciler::new(&api, store.clone())
            .reconcile()
            .await
            .unwrap();

        assert!(report.aborted);
        assert_eq!(api.state.lock().unwrap().create_attempts, 3);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn a_success_resets_the_failure_count() {
        let (_dir, store) = store();
        let mut api = FakeWebhookApi::new(vec![]);
        api.fail_create = |attempt| attempt % 3 != 0;

        let report = SubscriptionReconciler::new(&api, store.clone())
            .reconcile()
            .await
            .unwrap();

        assert!(!report.aborted);
        assert_eq!(api.state.lock().unwrap().create_attempts, 8);
        assert_eq!(report.created.len(), 2);
    }

    #[tokio::test]
    async fn failed_listing_leaves_local_records_alone() {
        let (_dir, store) = store();
        store.replace(sub("x", "sleep", "create", 500)).unwrap();
        let mut api = FakeWebhookApi::new(vec![]);
        api.fail_list = true;

        let result = SubscriptionReconciler::new(&api, store.clone())
            .reconcile()
            .await;

        assert!(result.is_err());
        assert_eq!(ids(&store), vec!["x".to_string()]);
    }
}
