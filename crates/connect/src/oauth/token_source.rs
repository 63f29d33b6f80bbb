//! Per-user access-token retrieval.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use log::debug;
use ourabridge_core::credentials::OAuthToken;
use tokio::sync::Mutex;

use super::client::OAuthClient;
use crate::error::{ConnectError, Result};

/// Tokens closer than this to expiry are refreshed before use.
pub const EXPIRY_LEEWAY_SECS: i64 = 30;

/// Yields a usable access token for every authenticated request.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<OAuthToken>;
}

/// Holds one user's grant and refreshes it transparently when it is about
/// to expire. The refreshed token is only visible to whoever wraps this
/// source; nothing here persists it.
pub struct RefreshingTokenSource {
    oauth: OAuthClient,
    current: Mutex<OAuthToken>,
}

impl RefreshingTokenSource {
    pub fn new(oauth: OAuthClient, token: OAuthToken) -> Self {
        Self {
            oauth,
            current: Mutex::new(token),
        }
    }
}

#[async_trait]
impl TokenSource for RefreshingTokenSource {
    async fn token(&self) -> Result<OAuthToken> {
        let mut current = self.current.lock().await;
        if !current.expires_within(Duration::seconds(EXPIRY_LEEWAY_SECS), Utc::now()) {
            return Ok(current.clone());
        }
        let refresh_token = current
            .refresh_token
            .clone()
            .ok_or_else(|| ConnectError::auth("access token expired and no refresh token"))?;
        debug!("[OAuth] access token {} is expiring, refreshing", current.censored());
        let fresh = self.oauth.refresh(&refresh_token).await?;
        *current = fresh.clone();
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::OAuthConfig;
    use axum::{routing::post, Form, Json, Router};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn token_server(calls: Arc<AtomicUsize>) -> String {
        let app = Router::new().route(
            "/oauth/token",
            post(move |Form(form): Form<HashMap<String, String>>| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(form.get("grant_type").map(String::as_str), Some("refresh_token"));
                    assert_eq!(form.get("refresh_token").map(String::as_str), Some("r1"));
                    assert_eq!(form.get("client_id").map(String::as_str), Some("cid"));
                    Json(serde_json::json!({
                        "access_token": "fresh-token",
                        "token_type": "bearer",
                        "expires_in": 3600
                    }))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/oauth/token")
    }

    fn oauth(token_url: String) -> OAuthClient {
        OAuthClient::new(
            OAuthConfig {
                client_id: "cid".into(),
                client_secret: "secret".into(),
                auth_url: "http://127.0.0.1:9/authorize".into(),
                token_url,
                redirect_url: "http://127.0.0.1:9/code".into(),
                scopes: vec![],
            },
            std::time::Duration::from_secs(5),
        )
        .unwrap()
    }

    fn token(access: &str, expires_in: i64, refresh: Option<&str>) -> OAuthToken {
        OAuthToken {
            access_token: access.into(),
            token_type: "Bearer".into(),
            refresh_token: refresh.map(str::to_string),
            expiry: Some(Utc::now() + Duration::seconds(expires_in)),
        }
    }

    #[tokio::test]
    async fn valid_token_is_returned_without_refresh() {
        let source = RefreshingTokenSource::new(
            oauth("http://127.0.0.1:9/unused".into()),
            token("still-good", 3600, Some("r1")),
        );
        assert_eq!(source.token().await.unwrap().access_token, "still-good");
    }

    #[tokio::test]
    async fn expiring_token_is_refreshed_once_and_keeps_refresh_token() {
        let calls = Arc::new(AtomicUsize::new(0));
        let url = token_server(calls.clone()).await;
        let source = RefreshingTokenSource::new(oauth(url), token("old-token", 10, Some("r1")));

        let first = source.token().await.unwrap();
        assert_eq!(first.access_token, "fresh-token");
        assert_eq!(first.refresh_token.as_deref(), Some("r1"));

        let second = source.token().await.unwrap();
        assert_eq!(second.access_token, "fresh-token");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_token_without_refresh_token_is_an_auth_error() {
        let source = RefreshingTokenSource::new(
            oauth("http://127.0.0.1:9/unused".into()),
            token("old-token", -60, None),
        );
        assert!(matches!(source.token().await, Err(ConnectError::Auth(_))));
    }
}
