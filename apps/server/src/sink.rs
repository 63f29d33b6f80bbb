//! Observation sink: delivers rendered lines to a local append-only file
//! and/or a remote line-oriented TCP receiver.
//!
//! Outputs are reopened on a fixed timer, on explicit request, and right
//! after a local write failure. A remote write that fails or misses its
//! deadline only drops the remote output until the next reopen. A line that
//! reaches no output at all is a fatal error.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ourabridge_core::Observation;
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, info, warn};

use crate::fatal::FatalReporter;

pub type Output = Box<dyn AsyncWrite + Send + Unpin>;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const REMOTE_WRITE_TIMEOUT_SECS: u64 = 10;

/// Opens the sink's outputs. `Ok(None)` means the output is not configured.
#[async_trait]
pub trait OutputConnector: Send + Sync {
    async fn open_local(&self) -> io::Result<Option<Output>>;
    async fn open_remote(&self) -> io::Result<Option<Output>>;
}

/// Append-mode file plus plaintext TCP, as configured.
#[derive(Debug, Clone)]
pub struct FileAndTcpConnector {
    pub local_path: Option<PathBuf>,
    pub remote_addr: Option<String>,
}

#[async_trait]
impl OutputConnector for FileAndTcpConnector {
    async fn open_local(&self) -> io::Result<Option<Output>> {
        let Some(path) = &self.local_path else {
            return Ok(None);
        };
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Some(Box::new(file)))
    }

    async fn open_remote(&self) -> io::Result<Option<Output>> {
        let Some(addr) = &self.remote_addr else {
            return Ok(None);
        };
        let stream = tokio::time::timeout(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            TcpStream::connect(addr.as_str()),
        )
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;
        stream.set_nodelay(true)?;
        Ok(Some(Box::new(stream)))
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("no output accepted observation {0:?}")]
    Undeliverable(String),
}

async fn write_line(output: &mut Output, line: &[u8]) -> io::Result<()> {
    output.write_all(line).await?;
    output.flush().await
}

pub struct ObservationSink<C> {
    connector: C,
    prefix: String,
    local: Option<Output>,
    remote: Option<Output>,
    remote_write_timeout: Duration,
}

impl<C: OutputConnector> ObservationSink<C> {
    pub fn new(connector: C, prefix: impl Into<String>) -> Self {
        Self {
            connector,
            prefix: prefix.into(),
            local: None,
            remote: None,
            remote_write_timeout: Duration::from_secs(REMOTE_WRITE_TIMEOUT_SECS),
        }
    }

    /// A remote write that has not finished within `timeout` counts as failed.
    pub fn with_remote_write_timeout(mut self, timeout: Duration) -> Self {
        self.remote_write_timeout = timeout;
        self
    }

    pub fn is_connected(&self) -> (bool, bool) {
        (self.local.is_some(), self.remote.is_some())
    }

    /// Closes whatever is open and opens every configured output again.
    pub async fn reconnect(&mut self) {
        for mut output in [self.local.take(), self.remote.take()].into_iter().flatten() {
            if let Err(e) = output.shutdown().await {
                debug!("closing sink output: {e}");
            }
        }
        match self.connector.open_local().await {
            Ok(local) => self.local = local,
            Err(e) => error!("can't open local data log: {e}"),
        }
        match self.connector.open_remote().await {
            Ok(remote) => self.remote = remote,
            Err(e) => warn!("can't connect to remote receiver: {e}"),
        }
        info!(
            "sink outputs: local={} remote={}",
            self.local.is_some(),
            self.remote.is_some()
        );
    }

    /// Writes `line` to every open output; true when at least one took it.
    /// Returns whether the local output failed as the second value.
    async fn deliver(&mut self, line: &[u8]) -> (bool, bool) {
        let mut delivered = false;
        let mut local_failed = false;
        if let Some(local) = self.local.as_mut() {
            match write_line(local, line).await {
                Ok(()) => delivered = true,
                Err(e) => {
                    error!("write to local data log failed: {e}");
                    self.local = None;
                    local_failed = true;
                }
            }
        }
        let deadline = self.remote_write_timeout;
        if let Some(remote) = self.remote.as_mut() {
            let written = tokio::time::timeout(deadline, write_line(remote, line))
                .await
                .unwrap_or_else(|_| {
                    Err(io::Error::new(io::ErrorKind::TimedOut, "remote write timed out"))
                });
            match written {
                Ok(()) => delivered = true,
                Err(e) => {
                    warn!("write to remote receiver failed, dropping it until the next reconnect: {e}");
                    self.remote = None;
                }
            }
        }
        (delivered, local_failed)
    }

    /// Writes one observation.
    ///
    /// A local failure reopens the outputs at once; if the line had not
    /// reached any output it is written again to the fresh ones.
    pub async fn write(&mut self, obs: &Observation) -> Result<(), SinkError> {
        let line = obs.render_line(&self.prefix);
        let (mut delivered, local_failed) = self.deliver(line.as_bytes()).await;
        if local_failed {
            self.reconnect().await;
            if !delivered {
                delivered = self.deliver(line.as_bytes()).await.0;
            }
        }
        if delivered {
            Ok(())
        } else {
            Err(SinkError::Undeliverable(line.trim_end().to_string()))
        }
    }

    /// Consumes observations until the channel closes. Reports a line that
    /// reached no output as fatal and stops.
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<Observation>,
        reconnect: Arc<Notify>,
        period: Duration,
        fatal: FatalReporter,
    ) {
        self.reconnect().await;
        let mut timer = interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                obs = rx.recv() => match obs {
                    Some(obs) => {
                        if let Err(e) = self.write(&obs).await {
                            fatal.report(e);
                            return;
                        }
                    }
                    None => break,
                },
                _ = timer.tick() => {
                    debug!("periodic sink reconnect");
                    self.reconnect().await;
                }
                _ = reconnect.notified() => {
                    info!("sink reconnect requested");
                    self.reconnect().await;
                }
            }
        }
        for mut output in [self.local.take(), self.remote.take()].into_iter().flatten() {
            let _ = output.shutdown().await;
        }
        info!("observation channel closed, sink exiting");
    }
}
