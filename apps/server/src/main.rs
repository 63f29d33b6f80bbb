use ourabridge_server::{api::app_router, build_app, config::Config, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config.log_format);
    let (state, workers, mut fatal_rx) = build_app(&config)?;

    // Subscription creation is verified through /event, so the listener has
    // to be accepting before the reconciler runs.
    tracing::info!("Listening on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    let router = app_router(state.clone());
    let server = tokio::spawn(async move { axum::serve(listener, router).await });

    workers.start(&state)?;

    tokio::select! {
        err = fatal_rx.recv() => match err {
            Some(err) => Err(err.context("fatal error, shutting down")),
            None => anyhow::bail!("fatal error channel closed"),
        },
        served = server => {
            served??;
            anyhow::bail!("HTTP server exited")
        }
    }
}
