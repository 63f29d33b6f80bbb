//! Webhook subscription management.

mod client;
mod reconciler;
mod verifier;

pub use client::{WebhookApi, WebhookClient, WebhookConfig, DEFAULT_CREATE_TIMEOUT_SECS};
pub use reconciler::{
    ReconcileReport, SubscriptionReconciler, SweepPolicy, DEFAULT_RENEW_THRESHOLD_SECS,
    MAX_CONSECUTIVE_FAILURES,
};
pub use verifier::{random_token, Verifier};
