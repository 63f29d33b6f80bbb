//! Operator signal: SIGHUP resyncs everyone, reconciles subscriptions and
//! reopens the sink outputs.

use std::sync::Arc;

use ourabridge_core::credentials::CredentialStore;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::dispatcher::WorkQueue;
use crate::scheduler::ReconcileTrigger;

/// What a reload request does, independent of how it arrives.
#[derive(Clone)]
pub struct ReloadHandles {
    pub queue: WorkQueue,
    pub store: Arc<CredentialStore>,
    pub reconcile: ReconcileTrigger,
    pub sink_reconnect: Arc<Notify>,
}

impl ReloadHandles {
    pub async fn reload(&self) -> anyhow::Result<()> {
        self.sink_reconnect.notify_one();
        self.reconcile.trigger();
        let count = self.queue.enqueue_all(&self.store).await?;
        info!("reload: resync queued for {count} user(s)");
        Ok(())
    }
}

#[cfg(unix)]
pub fn start_reload_listener(handles: ReloadHandles) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangups = signal(SignalKind::hangup())?;
    tokio::spawn(async move {
        while hangups.recv().await.is_some() {
            info!("received SIGHUP");
            if let Err(e) = handles.reload().await {
                warn!("reload listener stopping: {e}");
                return;
            }
        }
    });
    Ok(())
}

#[cfg(not(unix))]
pub fn start_reload_listener(_handles: ReloadHandles) -> anyhow::Result<()> {
    info!("reload signal is not supported on this platform");
    Ok(())
}
