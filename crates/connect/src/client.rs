//! Bearer-authenticated client for the `/usercollection` API.

use std::time::Duration;

use log::debug;
use ourabridge_core::credentials::PersonalInfo;

use crate::error::Result;
use crate::http::{build_client, checked_body};
use crate::oauth::TokenSource;

/// Default base URL of the remote API.
pub const DEFAULT_API_URL: &str = "https://api.ouraring.com/v2";

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GETs `path` below the base URL and returns the raw body of a 2xx
    /// response. Every call asks `tokens` for the access token first.
    pub async fn get(
        &self,
        tokens: &dyn TokenSource,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<u8>> {
        let token = tokens.token().await?;
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        debug!("[Api] GET {url} {query:?}");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&token.access_token)
            .query(query)
            .send()
            .await?;
        checked_body(response).await
    }

    /// Fetches the user's profile. Doubles as the token check after login.
    pub async fn personal_info(&self, tokens: &dyn TokenSource) -> Result<PersonalInfo> {
        let body = self.get(tokens, "usercollection/personal_info", &[]).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
