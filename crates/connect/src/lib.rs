//! Ourabridge Connect - everything that talks to the remote wearable API.
//!
//! Covers the OAuth2 grants and token sources, the bearer-authenticated
//! document fetcher, and the client-credentialed webhook subscription API
//! together with its reconciler.

pub mod client;
pub mod error;
pub mod fetcher;
mod http;
pub mod oauth;
pub mod webhook;

// Re-export commonly used types
pub use client::{ApiClient, DEFAULT_API_URL};
pub use error::{ConnectError, Result};
pub use fetcher::{BackfillWindow, DocumentFetcher, ResyncReport};
pub use oauth::{
    OAuthClient, OAuthConfig, RefreshingTokenSource, TokenRefreshInterceptor, TokenSource,
};
pub use webhook::{
    random_token, ReconcileReport, SubscriptionReconciler, SweepPolicy, Verifier, WebhookApi,
    WebhookClient, WebhookConfig,
};
