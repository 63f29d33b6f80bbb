//! Client-credentialed calls to `/webhook/subscription`.
//!
//! These calls carry the API client's id and secret in custom headers instead
//! of a user's bearer token: subscriptions belong to the client, and the remote
//! notifies it for every user that granted it access.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use ourabridge_core::documents::DocumentType;
use ourabridge_core::subscriptions::{EventType, Subscription};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde::Serialize;

use super::verifier::Verifier;
use crate::error::{ConnectError, Result};
use crate::http::{build_client, checked_body, parse_response};

/// Subscription creation is slow; the remote verifies the callback before
/// answering.
pub const DEFAULT_CREATE_TIMEOUT_SECS: u64 = 75;

/// Remote operations the reconciler needs.
#[async_trait]
pub trait WebhookApi: Send + Sync {
    async fn list(&self) -> Result<Vec<Subscription>>;
    async fn create(&self, data_type: DocumentType, event_type: EventType) -> Result<Subscription>;
    async fn renew(&self, id: &str) -> Result<Subscription>;
    async fn delete(&self, id: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub api_base_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Public `/event` URL of this service.
    pub callback_url: String,
    pub timeout: Duration,
    pub create_timeout: Duration,
}

#[derive(Debug, Serialize)]
struct CreateRequest<'a> {
    callback_url: &'a str,
    verification_token: &'a str,
    event_type: &'a str,
    data_type: &'a str,
}

pub struct WebhookClient {
    client: reqwest::Client,
    base_url: String,
    headers: HeaderMap,
    callback_url: String,
    create_timeout: Duration,
    verifier: Arc<Verifier>,
}

impl WebhookClient {
    pub fn new(config: WebhookConfig, verifier: Arc<Verifier>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-client-id",
            HeaderValue::from_str(&config.client_id)
                .map_err(|e| ConnectError::invalid_request(format!("bad client id: {e}")))?,
        );
        let mut secret = HeaderValue::from_str(&config.client_secret)
            .map_err(|e| ConnectError::invalid_request(format!("bad client secret: {e}")))?;
        secret.set_sensitive(true);
        headers.insert("x-client-secret", secret);

        Ok(Self {
            client: build_client(config.timeout)?,
            base_url: format!(
                "{}/webhook/subscription",
                config.api_base_url.trim_end_matches('/')
            ),
            headers,
            callback_url: config.callback_url,
            create_timeout: config.create_timeout,
            verifier,
        })
    }

    fn request(&self, method: Method, suffix: &str) -> reqwest::RequestBuilder {
        let url = if suffix.is_empty() {
            self.base_url.clone()
        } else {
            format!("{}/{}", self.base_url, suffix)
        };
        debug!("[Webhook] {method} {url}");
        self.client.request(method, url).headers(self.headers.clone())
    }
}

#[async_trait]
impl WebhookApi for WebhookClient {
    async fn list(&self) -> Result<Vec<Subscription>> {
        let response = self.request(Method::GET, "").send().await?;
        parse_response(response).await
    }

    async fn create(&self, data_type: DocumentType, event_type: EventType) -> Result<Subscription> {
        let token = self.verifier.issue();
        let body = CreateRequest {
            callback_url: &self.callback_url,
            verification_token: &token,
            event_type: event_type.as_str(),
            data_type: data_type.as_str(),
        };
        let response = self
            .request(Method::POST, "")
            .timeout(self.create_timeout)
            .json(&body)
            .send()
            .await?;
        parse_response(response).await
    }

    async fn renew(&self, id: &str) -> Result<Subscription> {
        let response = self
            .request(Method::PUT, &format!("renew/{id}"))
            .send()
            .await?;
        parse_response(response).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let response = self.request(Method::DELETE, id).send().await?;
        checked_body(response).await?;
        Ok(())
    }
}
