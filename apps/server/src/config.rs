use std::{net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::{bail, Context};
use ourabridge_connect::SweepPolicy;

pub const DEFAULT_SCOPES: &str = "email personal daily heartrate workout spo2";

/// Process configuration, read once at startup and handed to every component.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    /// Public URL of this service; `/code` and `/event` hang off it.
    pub base_url: String,
    pub api_base_url: String,
    pub auth_url: String,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
    pub user_creds_file: PathBuf,
    pub subscriptions_file: PathBuf,
    pub local_data_log: Option<PathBuf>,
    pub graphite_server: Option<String>,
    pub graphite_prefix: String,
    pub request_timeout: Duration,
    pub subscription_timeout: Duration,
    pub poll_interval: Duration,
    pub reconcile_interval: Duration,
    pub renew_threshold: Duration,
    pub sink_reconnect_interval: Duration,
    pub queue_capacity: usize,
    pub sweep_policy: SweepPolicy,
    pub log_format: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| -> String {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let optional = |key: &str, default: &str| -> Option<String> {
            match lookup(key) {
                Some(v) => Some(v.trim().to_string()).filter(|v| !v.is_empty()),
                None => Some(default.to_string()).filter(|v| !v.is_empty()),
            }
        };
        let secs = |key: &str, default: u64| -> anyhow::Result<Duration> {
            let raw = var(key, &default.to_string());
            let value: u64 = raw
                .parse()
                .with_context(|| format!("invalid {key}: {raw}"))?;
            if value == 0 {
                bail!("{key} must be positive");
            }
            Ok(Duration::from_secs(value))
        };

        let listen_addr: SocketAddr = var("OB_LISTEN_ADDR", "127.0.0.1:8000")
            .parse()
            .context("invalid OB_LISTEN_ADDR")?;
        let client_id = lookup("OB_CLIENT_ID").unwrap_or_default();
        let client_secret = lookup("OB_CLIENT_SECRET").unwrap_or_default();
        if client_id.trim().is_empty() || client_secret.trim().is_empty() {
            bail!("OB_CLIENT_ID and OB_CLIENT_SECRET are required");
        }

        let local_data_log = optional("OB_LOCAL_DATA_LOG", "data.txt").map(PathBuf::from);
        let graphite_server = optional("OB_GRAPHITE_SERVER", "");
        if local_data_log.is_none() && graphite_server.is_none() {
            bail!("at least one of OB_LOCAL_DATA_LOG and OB_GRAPHITE_SERVER must be set");
        }

        let queue_capacity: usize = var("OB_QUEUE_CAPACITY", "3")
            .parse()
            .context("invalid OB_QUEUE_CAPACITY")?;
        if queue_capacity == 0 {
            bail!("OB_QUEUE_CAPACITY must be positive");
        }

        let sweep_policy = match var("OB_SUBSCRIPTION_REMOTE_DELETE", "false")
            .to_ascii_lowercase()
            .as_str()
        {
            "1" | "true" | "yes" => SweepPolicy::LocalAndRemote,
            "0" | "false" | "no" => SweepPolicy::LocalOnly,
            other => bail!("invalid OB_SUBSCRIPTION_REMOTE_DELETE: {other}"),
        };

        Ok(Self {
            listen_addr,
            base_url: var("OB_BASE_URL", "http://127.0.0.1:8000")
                .trim_end_matches('/')
                .to_string(),
            api_base_url: var("OB_API_BASE_URL", ourabridge_connect::DEFAULT_API_URL),
            auth_url: var("OB_AUTH_URL", "https://cloud.ouraring.com/oauth/authorize"),
            token_url: var("OB_TOKEN_URL", "https://api.ouraring.com/oauth/token"),
            client_id: client_id.trim().to_string(),
            client_secret: client_secret.trim().to_string(),
            scopes: var("OB_SCOPES", DEFAULT_SCOPES)
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            user_creds_file: var("OB_USER_CREDS_FILE", "user_creds.json").into(),
            subscriptions_file: var("OB_SUBSCRIPTIONS_FILE", "subscriptions.json").into(),
            local_data_log,
            graphite_server,
            graphite_prefix: lookup("OB_GRAPHITE_PREFIX").unwrap_or_else(|| "bio.".to_string()),
            request_timeout: secs("OB_TIMEOUT_SECS", 10)?,
            subscription_timeout: secs("OB_SUBSCRIPTION_TIMEOUT_SECS", 75)?,
            poll_interval: secs("OB_POLL_INTERVAL_SECS", 3600)?,
            reconcile_interval: secs("OB_RECONCILE_INTERVAL_SECS", 6 * 3600)?,
            renew_threshold: secs("OB_RENEW_THRESHOLD_SECS", 24 * 3600)?,
            sink_reconnect_interval: secs("OB_SINK_RECONNECT_SECS", 15 * 60)?,
            queue_capacity,
            sweep_policy,
            log_format: var("OB_LOG_FORMAT", "text"),
        })
    }

    pub fn redirect_url(&self) -> String {
        format!("{}/code", self.base_url)
    }

    pub fn callback_url(&self) -> String {
        format!("{}/event", self.base_url)
    }
}
