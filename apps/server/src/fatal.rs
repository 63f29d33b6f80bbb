//! Process-wide channel for errors after which the server must stop.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::error;

#[derive(Debug, Clone)]
pub struct FatalReporter {
    tx: mpsc::UnboundedSender<anyhow::Error>,
}

impl FatalReporter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<anyhow::Error>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn report(&self, err: impl Into<anyhow::Error>) {
        let err = err.into();
        error!("fatal: {err:#}");
        if self.tx.send(err).is_err() {
            error!("fatal error channel is closed");
        }
    }

    /// Watches a long-running worker. A worker that panics or is cancelled
    /// is reported as fatal; a normal return is not.
    pub fn supervise(&self, name: &'static str, worker: JoinHandle<()>) -> JoinHandle<()> {
        let fatal = self.clone();
        tokio::spawn(async move {
            if let Err(e) = worker.await {
                fatal.report(anyhow::anyhow!("{name} task died: {e}"));
            }
        })
    }
}
