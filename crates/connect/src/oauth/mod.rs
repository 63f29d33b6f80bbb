//! OAuth2 grants, token sources and rotation capture.

mod client;
mod interceptor;
mod token_source;

pub use client::{OAuthClient, OAuthConfig};
pub use interceptor::TokenRefreshInterceptor;
pub use token_source::{RefreshingTokenSource, TokenSource, EXPIRY_LEEWAY_SECS};
