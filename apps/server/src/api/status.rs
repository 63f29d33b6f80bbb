use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use ourabridge_core::credentials::censor_email;
use serde::Serialize;

use crate::main_lib::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    pub username: String,
    pub email: Option<String>,
    pub authorized: bool,
    pub token_expiry: Option<DateTime<Utc>>,
    pub last_poll: Option<DateTime<Utc>>,
}

/// One row per known user, sorted by name.
async fn list_users(State(state): State<Arc<AppState>>) -> Json<Vec<UserStatus>> {
    let mut rows: Vec<UserStatus> = state
        .credentials
        .snapshot()
        .into_iter()
        .map(|cred| UserStatus {
            email: cred.personal_info.email.as_deref().map(censor_email),
            authorized: cred.oauth_token.is_some(),
            token_expiry: cred.oauth_token.as_ref().and_then(|t| t.expiry),
            last_poll: cred.last_poll,
            username: cred.name,
        })
        .collect();
    rows.sort_by(|a, b| a.username.cmp(&b.username));
    Json(rows)
}

async fn healthz() -> &'static str {
    "ok"
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_users))
        .route("/users", get(list_users))
        .route("/healthz", get(healthz))
}
