use std::sync::Arc;

use ourabridge_connect::{
    ApiClient, DocumentFetcher, OAuthClient, OAuthConfig, SubscriptionReconciler, Verifier,
    WebhookClient, WebhookConfig,
};
use ourabridge_core::credentials::CredentialStore;
use ourabridge_core::subscriptions::SubscriptionStore;
use ourabridge_core::Observation;
use tokio::sync::{mpsc, Notify};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::{
    config::Config,
    dispatcher::{run_dispatcher, FetchAndEmit, SyncRequest, WorkQueue},
    error::ApiError,
    fatal::FatalReporter,
    scheduler::{run_reconciler, start_poll_scheduler, ReconcileTrigger},
    signals::{start_reload_listener, ReloadHandles},
    sink::{FileAndTcpConnector, ObservationSink},
};

/// Observations buffered between the dispatcher and the sink.
const OBSERVATION_BUFFER: usize = 1024;

pub struct AppState {
    pub config: Config,
    pub credentials: Arc<CredentialStore>,
    pub subscriptions: Arc<SubscriptionStore>,
    pub verifier: Arc<Verifier>,
    pub oauth: OAuthClient,
    pub fetcher: Arc<DocumentFetcher>,
    pub queue: WorkQueue,
    pub fatal: FatalReporter,
}

impl AppState {
    /// Hands fatal errors to the fatal channel and returns the error unchanged
    /// for the HTTP response.
    pub fn escalate(&self, err: ApiError) -> ApiError {
        if err.is_fatal() {
            self.fatal.report(anyhow::anyhow!("{err}"));
        }
        err
    }
}

/// Long-running tasks built alongside the state, started once the HTTP
/// listener is accepting.
pub struct Workers {
    pub queue_rx: mpsc::Receiver<SyncRequest>,
    pub sync: FetchAndEmit,
    pub sink: ObservationSink<FileAndTcpConnector>,
    pub observations_rx: mpsc::Receiver<Observation>,
    pub sink_reconnect: Arc<Notify>,
    pub reconciler: SubscriptionReconciler<WebhookClient>,
    pub reconcile_trigger: ReconcileTrigger,
    pub reconcile_rx: mpsc::Receiver<()>,
}

impl Workers {
    /// Spawns the dispatcher, sink and reconciler, triggers the startup
    /// reconciliation, queues every known user and starts the schedulers.
    pub fn start(self, state: &Arc<AppState>) -> anyhow::Result<()> {
        let config = &state.config;
        let fatal = &state.fatal;
        fatal.supervise(
            "dispatcher",
            tokio::spawn(run_dispatcher(
                self.queue_rx,
                self.sync,
                state.credentials.clone(),
                fatal.clone(),
            )),
        );
        fatal.supervise(
            "sink",
            tokio::spawn(self.sink.run(
                self.observations_rx,
                self.sink_reconnect.clone(),
                config.sink_reconnect_interval,
                fatal.clone(),
            )),
        );
        fatal.supervise(
            "reconciler",
            tokio::spawn(run_reconciler(
                self.reconciler,
                self.reconcile_rx,
                config.reconcile_interval,
                fatal.clone(),
            )),
        );
        self.reconcile_trigger.trigger();

        let queue = state.queue.clone();
        let store = state.credentials.clone();
        tokio::spawn(async move {
            match queue.enqueue_all(&store).await {
                Ok(count) => tracing::info!("startup resync queued for {count} user(s)"),
                Err(e) => tracing::warn!("startup resync not queued: {e}"),
            }
        });
        start_poll_scheduler(
            state.queue.clone(),
            state.credentials.clone(),
            config.poll_interval,
        );
        start_reload_listener(ReloadHandles {
            queue: state.queue.clone(),
            store: state.credentials.clone(),
            reconcile: self.reconcile_trigger,
            sink_reconnect: self.sink_reconnect,
        })
    }
}

pub fn init_tracing(log_format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

pub fn build_app(
    config: &Config,
) -> anyhow::Result<(Arc<AppState>, Workers, mpsc::UnboundedReceiver<anyhow::Error>)> {
    let credentials = Arc::new(CredentialStore::open(&config.user_creds_file)?);
    let subscriptions = Arc::new(SubscriptionStore::open(&config.subscriptions_file)?);
    tracing::info!("{} subscription(s) on record", subscriptions.len());

    let oauth = OAuthClient::new(
        OAuthConfig {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            auth_url: config.auth_url.clone(),
            token_url: config.token_url.clone(),
            redirect_url: config.redirect_url(),
            scopes: config.scopes.clone(),
        },
        config.request_timeout,
    )?;
    let api = ApiClient::new(&config.api_base_url, config.request_timeout)?;
    let fetcher = Arc::new(DocumentFetcher::new(api, oauth.clone(), credentials.clone()));

    let verifier = Arc::new(Verifier::new());
    let webhooks = WebhookClient::new(
        WebhookConfig {
            api_base_url: config.api_base_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            callback_url: config.callback_url(),
            timeout: config.request_timeout,
            create_timeout: config.subscription_timeout,
        },
        verifier.clone(),
    )?;
    let renew_threshold = chrono::Duration::from_std(config.renew_threshold)?;
    let reconciler = SubscriptionReconciler::new(webhooks, subscriptions.clone())
        .with_renew_threshold(renew_threshold)
        .with_sweep_policy(config.sweep_policy);

    let (fatal, fatal_rx) = FatalReporter::channel();
    let (queue, queue_rx) = WorkQueue::new(config.queue_capacity);
    let (observations_tx, observations_rx) = mpsc::channel(OBSERVATION_BUFFER);
    let (reconcile_trigger, reconcile_rx) = ReconcileTrigger::new();
    let sink = ObservationSink::new(
        FileAndTcpConnector {
            local_path: config.local_data_log.clone(),
            remote_addr: config.graphite_server.clone(),
        },
        config.graphite_prefix.clone(),
    );

    let state = Arc::new(AppState {
        config: config.clone(),
        credentials,
        subscriptions,
        verifier,
        oauth,
        fetcher: fetcher.clone(),
        queue,
        fatal,
    });
    let workers = Workers {
        queue_rx,
        sync: FetchAndEmit::new(fetcher, observations_tx),
        sink,
        observations_rx,
        sink_reconnect: Arc::new(Notify::new()),
        reconciler,
        reconcile_trigger,
        reconcile_rx,
    };
    Ok((state, workers, fatal_rx))
}
