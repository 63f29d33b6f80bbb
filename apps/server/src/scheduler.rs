//! Background schedulers: the periodic resync of every user and the
//! subscription reconciliation task.

use std::sync::Arc;

use ourabridge_connect::{SubscriptionReconciler, WebhookApi};
use ourabridge_core::credentials::CredentialStore;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant};
use tracing::{debug, info, warn};

use crate::dispatcher::WorkQueue;
use crate::fatal::FatalReporter;

/// Enqueues a full resync for every known user once per `period`.
///
/// The first tick fires one period after start; startup enqueues everyone
/// separately.
pub fn start_poll_scheduler(
    queue: WorkQueue,
    store: Arc<CredentialStore>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("poll scheduler started ({}s interval)", period.as_secs());
        let mut ticker = interval_at(Instant::now() + period, period);
        loop {
            ticker.tick().await;
            match queue.enqueue_all(&store).await {
                Ok(count) => info!("scheduled resync queued for {count} user(s)"),
                Err(e) => {
                    warn!("poll scheduler stopping: {e}");
                    return;
                }
            }
        }
    })
}

/// Requests an out-of-band reconciliation pass. Requests made while one is
/// already pending collapse into it.
#[derive(Debug, Clone)]
pub struct ReconcileTrigger {
    tx: mpsc::Sender<()>,
}

impl ReconcileTrigger {
    pub fn new() -> (Self, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }

    pub fn trigger(&self) {
        if self.tx.try_send(()).is_err() {
            debug!("reconciliation already pending");
        }
    }
}

/// Runs the reconciler on every trigger and once per `period`. Exits when
/// every trigger is dropped or after a fatal error.
pub async fn run_reconciler<W: WebhookApi>(
    reconciler: SubscriptionReconciler<W>,
    mut triggers: mpsc::Receiver<()>,
    period: Duration,
    fatal: FatalReporter,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            trigger = triggers.recv() => {
                if trigger.is_none() {
                    break;
                }
            }
            _ = ticker.tick() => debug!("periodic reconciliation"),
        }
        match reconciler.reconcile().await {
            Ok(report) => info!(
                "subscriptions reconciled: {} remote, {} swept, {} created, {} renewed, {} healthy{}",
                report.remote,
                report.swept.len(),
                report.created.len(),
                report.renewed.len(),
                report.healthy,
                if report.aborted { " (aborted)" } else { "" }
            ),
            Err(e) if e.is_fatal() => {
                fatal.report(e);
                return;
            }
            Err(e) => warn!("subscription reconciliation failed: {e}"),
        }
    }
    info!("reconciler exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ourabridge_connect::{ConnectError, Result as ConnectResult};
    use ourabridge_core::documents::DocumentType;
    use ourabridge_core::subscriptions::{EventType, Subscription, SubscriptionStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Default)]
    struct CountingApi {
        lists: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl WebhookApi for CountingApi {
        async fn list(&self) -> ConnectResult<Vec<Subscription>> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            Err(ConnectError::api(503, "unavailable"))
        }

        async fn create(&self, _: DocumentType, _: EventType) -> ConnectResult<Subscription> {
            Err(ConnectError::api(503, "unavailable"))
        }

        async fn renew(&self, _: &str) -> ConnectResult<Subscription> {
            Err(ConnectError::api(503, "unavailable"))
        }

        async fn delete(&self, _: &str) -> ConnectResult<()> {
            Ok(())
        }
    }

    #[test]
    fn pending_triggers_coalesce() {
        let (trigger, mut rx) = ReconcileTrigger::new();
        trigger.trigger();
        trigger.trigger();
        trigger.trigger();
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn reconciler_runs_per_trigger_and_survives_remote_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SubscriptionStore::open(dir.path().join("subs.json")).unwrap());
        let api = CountingApi::default();
        let (trigger, rx) = ReconcileTrigger::new();
        let (fatal, mut fatal_rx) = FatalReporter::channel();
        let task = tokio::spawn(run_reconciler(
            SubscriptionReconciler::new(api.clone(), store),
            rx,
            Duration::from_secs(3600),
            fatal,
        ));

        trigger.trigger();
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.trigger();
        drop(trigger);
        task.await.unwrap();

        assert_eq!(api.lists.load(Ordering::SeqCst), 2);
        assert!(fatal_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn poll_scheduler_waits_one_period_before_enqueueing() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CredentialStore::open(dir.path().join("creds.json")).unwrap());
        let mut cred = ourabridge_core::credentials::Credential::placeholder("alice");
        cred.oauth_token = Some(ourabridge_core::credentials::OAuthToken {
            access_token: "tok-alice".into(),
            token_type: "Bearer".into(),
            refresh_token: None,
            expiry: None,
        });
        store.upsert("alice", cred).unwrap();
        let (queue, mut rx) = WorkQueue::new(3);
        let handle = start_poll_scheduler(queue, store, Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(rx.try_recv().is_err());
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(rx.try_recv().unwrap().username(), "alice");
        handle.abort();
    }
}
