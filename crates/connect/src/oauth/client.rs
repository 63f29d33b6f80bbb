//! Authorization-code and refresh-token grants against the remote OAuth server.

use std::time::Duration;

use chrono::Utc;
use log::{debug, info};
use ourabridge_core::credentials::OAuthToken;
use reqwest::Url;

use crate::error::{ConnectError, Result};
use crate::http::{build_client, parse_response};

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    /// Where the remote sends the user back, `<base_url>/code`.
    pub redirect_url: String,
    pub scopes: Vec<String>,
}

#[derive(Debug, serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_token(self) -> OAuthToken {
        OAuthToken {
            access_token: self.access_token,
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
            expiry: self
                .expires_in
                .filter(|secs| *secs > 0)
                .map(|secs| Utc::now() + chrono::Duration::seconds(secs)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OAuthClient {
    http: reqwest::Client,
    config: OAuthConfig,
}

impl OAuthClient {
    pub fn new(config: OAuthConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: build_client(timeout)?,
            config,
        })
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// URL the browser is redirected to. Asks for offline access so the grant
    /// comes with a refresh token.
    pub fn authorize_url(&self, state: &str) -> Result<String> {
        let mut url = Url::parse(&self.config.auth_url)
            .map_err(|e| ConnectError::invalid_request(format!("bad auth url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_url)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("state", state)
            .append_pair("access_type", "offline");
        Ok(url.into())
    }

    pub async fn exchange_code(&self, code: &str) -> Result<OAuthToken> {
        let token = self
            .token_request(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.redirect_url.as_str()),
            ])
            .await?;
        info!("[OAuth] exchanged authorization code, token {}", token.censored());
        Ok(token)
    }

    /// Refreshes a grant. The previous refresh token is kept when the server
    /// does not rotate it.
    pub async fn refresh(&self, refresh_token: &str) -> Result<OAuthToken> {
        let mut token = self
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .await?;
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.to_string());
        }
        debug!("[OAuth] refreshed access token {}", token.censored());
        Ok(token)
    }

    async fn token_request(&self, grant: &[(&str, &str)]) -> Result<OAuthToken> {
        let mut form: Vec<(&str, &str)> = grant.to_vec();
        form.push(("client_id", self.config.client_id.as_str()));
        form.push(("client_secret", self.config.client_secret.as_str()));

        let response = self
            .http
            .post(&self.config.token_url)
            .form(&form)
            .send()
            .await?;
        let body: TokenResponse = parse_response(response).await.map_err(|e| match e {
            ConnectError::Api { status, message } => {
                ConnectError::auth(format!("token endpoint returned {status}: {message}"))
            }
            other => other,
        })?;
        Ok(body.into_token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OAuthClient {
        OAuthClient::new(
            OAuthConfig {
                client_id: "cid".into(),
                client_secret: "secret".into(),
                auth_url: "https://auth.example/oauth/authorize".into(),
                token_url: "https://auth.example/oauth/token".into(),
                redirect_url: "https://bridge.example/code".into(),
                scopes: vec!["email".into(), "daily".into()],
            },
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn authorize_url_requests_offline_access() {
        let url = Url::parse(&client().authorize_url("alice:nonce").unwrap()).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("access_type".into(), "offline".into())));
        assert!(pairs.contains(&("state".into(), "alice:nonce".into())));
        assert!(pairs.contains(&("scope".into(), "email daily".into())));
        assert!(pairs.contains(&("redirect_uri".into(), "https://bridge.example/code".into())));
    }

    #[test]
    fn token_response_without_expiry_never_expires() {
        let token = TokenResponse {
            access_token: "abcdefgh".into(),
            token_type: None,
            refresh_token: Some(String::new()),
            expires_in: None,
        }
        .into_token();
        assert_eq!(token.token_type, "Bearer");
        assert!(token.refresh_token.is_none());
        assert!(token.expiry.is_none());
    }
}
