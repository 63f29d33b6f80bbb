//! OAuth login: `/newlogin` claims a username and sends the browser to the
//! remote consent page, `/code` receives the grant.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{
        header::{COOKIE, SET_COOKIE},
        HeaderMap,
    },
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use ourabridge_connect::{random_token, RefreshingTokenSource};
use ourabridge_core::credentials::{normalize_username, validate_username};
use ourabridge_core::errors::Error as CoreError;
use serde::Deserialize;
use tracing::info;

use crate::{
    dispatcher::SyncRequest,
    error::{ApiError, ApiResult},
    main_lib::AppState,
};

pub const STATE_COOKIE_NAME: &str = "oauthstate";
const STATE_COOKIE_MAX_AGE_SECS: u64 = 30 * 60;

fn state_cookie(value: &str, max_age_seconds: u64) -> String {
    format!("{STATE_COOKIE_NAME}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_seconds}")
}

fn extract_cookie_value(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let raw = headers.get(COOKIE)?.to_str().ok()?;
    for part in raw.split(';') {
        let mut pieces = part.trim().splitn(2, '=');
        let key = pieces.next()?.trim();
        let value = pieces.next()?.trim();

        if key == cookie_name && !value.is_empty() {
            return Some(value.to_string());
        }
    }

    None
}

#[derive(Debug, Deserialize)]
struct NewLoginQuery {
    #[serde(default)]
    username: String,
}

async fn new_login(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NewLoginQuery>,
) -> ApiResult<Response> {
    let name = normalize_username(&query.username);
    validate_username(&name)?;
    match state.credentials.find(&name) {
        Some(cred) if cred.oauth_token.is_some() => return Err(CoreError::UsernameTaken.into()),
        Some(_) => info!("resuming login for {name}"),
        None => {
            state
                .credentials
                .claim(&name)
                .map_err(|e| state.escalate(e.into()))?;
        }
    }

    let oauth_state = format!("{name}:{}", random_token(16));
    let url = state.oauth.authorize_url(&oauth_state)?;
    Ok((
        [(SET_COOKIE, state_cookie(&oauth_state, STATE_COOKIE_MAX_AGE_SECS))],
        Redirect::to(&url),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct CodeQuery {
    #[serde(default)]
    state: String,
    #[serde(default)]
    code: String,
}

async fn oauth_code(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<CodeQuery>,
) -> ApiResult<Response> {
    let expected = extract_cookie_value(&headers, STATE_COOKIE_NAME);
    if query.state.is_empty() || expected.as_deref() != Some(query.state.as_str()) {
        return Err(ApiError::BadRequest("state nonce mismatch".into()));
    }
    let Some((name, _nonce)) = query.state.split_once(':') else {
        return Err(ApiError::BadRequest("state nonce mismatch".into()));
    };
    let mut cred = match state.credentials.find(name) {
        Some(cred) if cred.oauth_token.is_none() => cred,
        Some(_) => return Err(CoreError::UsernameTaken.into()),
        None => return Err(CoreError::UnknownUser(name.to_string()).into()),
    };
    if query.code.is_empty() {
        return Err(ApiError::BadRequest("missing authorization code".into()));
    }

    let token = state.oauth.exchange_code(&query.code).await?;
    let source = RefreshingTokenSource::new(state.oauth.clone(), token.clone());
    let personal_info = state.fetcher.api().personal_info(&source).await?;
    info!(
        "{name}: authorized as remote user {} with token {}",
        personal_info.id,
        token.censored()
    );
    cred.personal_info = personal_info;
    cred.oauth_token = Some(token);
    state
        .credentials
        .upsert(name, cred)
        .map_err(|e| state.escalate(e.into()))?;
    state
        .queue
        .enqueue(SyncRequest::FullResync(name.to_string()))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(([(SET_COOKIE, state_cookie("", 0))], Redirect::to("/")).into_response())
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/newlogin", get(new_login))
        .route("/code", get(oauth_code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn finds_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; oauthstate=alice:abc; other=1"),
        );
        assert_eq!(
            extract_cookie_value(&headers, STATE_COOKIE_NAME).as_deref(),
            Some("alice:abc")
        );
        assert_eq!(extract_cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn state_cookie_expires_after_half_an_hour() {
        let cookie = state_cookie("alice:abc", STATE_COOKIE_MAX_AGE_SECS);
        assert!(cookie.starts_with("oauthstate=alice:abc;"));
        assert!(cookie.ends_with("Max-Age=1800"));
    }
}
