//! Single-consumer work queue for per-user resync passes.
//!
//! Any number of producers (startup, the poll timer, webhooks, SIGHUP, the
//! login flow) enqueue [`SyncRequest`]s; one consumer task drains them and runs
//! each to completion before taking the next, so at most one pass talks to
//! the remote API at a time and passes for the same user never overlap.
//! The queue is bounded and producers wait when it is full.

use std::sync::Arc;

use async_trait::async_trait;
use ourabridge_connect::{ConnectError, DocumentFetcher};
use ourabridge_core::credentials::CredentialStore;
use ourabridge_core::documents::DocumentType;
use ourabridge_core::Observation;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::fatal::FatalReporter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncRequest {
    /// Search every document type over the user's backfill window.
    FullResync(String),
    /// Fetch the one document a webhook pointed at.
    Document {
        username: String,
        data_type: DocumentType,
        object_id: String,
    },
}

impl SyncRequest {
    pub fn username(&self) -> &str {
        match self {
            SyncRequest::FullResync(username) => username,
            SyncRequest::Document { username, .. } => username,
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error("observation sink is closed")]
    SinkClosed,
}

impl SyncError {
    pub fn is_fatal(&self) -> bool {
        match self {
            SyncError::Connect(e) => e.is_fatal(),
            SyncError::SinkClosed => true,
        }
    }
}

/// Runs one request; returns the number of observations produced.
#[async_trait]
pub trait UserSync: Send + Sync {
    async fn sync(&self, request: &SyncRequest) -> Result<usize, SyncError>;
}

/// Producer side of the queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    tx: mpsc::Sender<SyncRequest>,
}

impl WorkQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<SyncRequest>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Waits for room in the queue. Fails only once the consumer is gone.
    pub async fn enqueue(&self, request: SyncRequest) -> anyhow::Result<()> {
        debug!("enqueueing {request:?}");
        self.tx
            .send(request)
            .await
            .map_err(|_| anyhow::anyhow!("work queue is closed"))
    }

    /// Enqueues a full resync for every user with a token.
    pub async fn enqueue_all(&self, store: &CredentialStore) -> anyhow::Result<usize> {
        let mut count = 0;
        for cred in store.snapshot() {
            if cred.oauth_token.is_none() {
                continue;
            }
            self.enqueue(SyncRequest::FullResync(cred.name)).await?;
            count += 1;
        }
        Ok(count)
    }
}

/// Fetches documents and forwards their observations to the sink channel.
pub struct FetchAndEmit {
    fetcher: Arc<DocumentFetcher>,
    sink: mpsc::Sender<Observation>,
}

impl FetchAndEmit {
    pub fn new(fetcher: Arc<DocumentFetcher>, sink: mpsc::Sender<Observation>) -> Self {
        Self { fetcher, sink }
    }

    async fn emit(&self, observations: Vec<Observation>) -> Result<usize, SyncError> {
        let count = observations.len();
        for obs in observations {
            self.sink.send(obs).await.map_err(|_| SyncError::SinkClosed)?;
        }
        Ok(count)
    }
}

#[async_trait]
impl UserSync for FetchAndEmit {
    async fn sync(&self, request: &SyncRequest) -> Result<usize, SyncError> {
        match request {
            SyncRequest::FullResync(username) => {
                let report = self.fetcher.resync(username).await?;
                if !report.failed_types.is_empty() {
                    warn!(
                        "{username}: {} document type(s) failed this pass",
                        report.failed_types.len()
                    );
                }
                self.emit(report.observations).await
            }
            SyncRequest::Document {
                username,
                data_type,
                object_id,
            } => {
                let observations = self
                    .fetcher
                    .fetch_document(username, *data_type, object_id)
                    .await?;
                self.emit(observations).await
            }
        }
    }
}

/// Consumer loop. Returns once every producer has been dropped and the
/// queue is drained, or after reporting a fatal error.
pub async fn run_dispatcher<S: UserSync>(
    mut rx: mpsc::Receiver<SyncRequest>,
    sync: S,
    store: Arc<CredentialStore>,
    fatal: FatalReporter,
) {
    info!("dispatcher started");
    while let Some(request) = rx.recv().await {
        let username = request.username().to_string();
        match sync.sync(&request).await {
            Ok(count) => {
                info!("{username}: pass complete, {count} observation(s)");
                if let Err(e) = store.touch(&username) {
                    if e.is_fatal() {
                        fatal.report(e);
                        return;
                    }
                    warn!("{username}: could not record poll time: {e}");
                }
            }
            Err(e) if e.is_fatal() => {
                fatal.report(e);
                return;
            }
            Err(e) => warn!("{username}: pass failed: {e}"),
        }
    }
    info!("work queue closed, dispatcher exiting");
}
