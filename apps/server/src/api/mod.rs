use std::sync::Arc;

use axum::{http::StatusCode, Router};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::main_lib::AppState;

pub mod event;
pub mod login;
pub mod status;

/// The login exchange makes two remote calls back to back.
const HANDLER_TIMEOUT_FACTOR: u32 = 3;

/// `/event` carries no handler timeout: it waits for room in the work queue.
pub fn app_router(state: Arc<AppState>) -> Router {
    let timeout = state.config.request_timeout * HANDLER_TIMEOUT_FACTOR;
    let timed = Router::new()
        .merge(login::router())
        .merge(status::router())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            timeout,
        ));
    Router::new()
        .merge(event::router())
        .merge(timed)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
