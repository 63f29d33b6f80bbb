//! Captures silently rotated access tokens.

use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use ourabridge_core::credentials::{CredentialStore, OAuthToken};

use super::token_source::TokenSource;
use crate::error::Result;

/// Wraps a user's [`TokenSource`] and writes every new access token back to
/// the credential store before handing it out.
///
/// A refresh that happens inside the inner source is otherwise invisible and
/// would be lost on restart.
pub struct TokenRefreshInterceptor<S> {
    inner: S,
    store: Arc<CredentialStore>,
    username: String,
}

impl<S: TokenSource> TokenRefreshInterceptor<S> {
    pub fn new(inner: S, store: Arc<CredentialStore>, username: impl Into<String>) -> Self {
        Self {
            inner,
            store,
            username: username.into(),
        }
    }
}

#[async_trait]
impl<S: TokenSource> TokenSource for TokenRefreshInterceptor<S> {
    async fn token(&self) -> Result<OAuthToken> {
        let token = self.inner.token().await?;
        if self.store.update_token(&self.username, &token)? {
            info!(
                "[OAuth] captured rotated token for {}: {}",
                self.username,
                token.censored()
            );
        }
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectError;
    use ourabridge_core::credentials::Credential;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Hands out the queued tokens in order, then keeps returning the last.
    struct ScriptedSource {
        tokens: Mutex<Vec<Option<&'static str>>>,
    }

    impl ScriptedSource {
        fn new(tokens: Vec<Option<&'static str>>) -> Self {
            Self {
                tokens: Mutex::new(tokens),
            }
        }
    }

    #[async_trait]
    impl TokenSource for ScriptedSource {
        async fn token(&self) -> Result<OAuthToken> {
            let next = {
                let mut tokens = self.tokens.lock().unwrap();
                if tokens.len() > 1 {
                    tokens.remove(0)
                } else {
                    tokens[0]
                }
            };
            match next {
                Some(access) => Ok(token(access)),
                None => Err(ConnectError::auth("refresh rejected")),
            }
        }
    }

    fn token(access: &str) -> OAuthToken {
        OAuthToken {
            access_token: access.into(),
            token_type: "Bearer".into(),
            refresh_token: Some("refresh".into()),
            expiry: None,
        }
    }

    fn store_with_alice(dir: &std::path::Path) -> Arc<CredentialStore> {
        let store = CredentialStore::open(dir.join("creds.json")).unwrap();
        let mut alice = Credential::placeholder("alice");
        alice.oauth_token = Some(token("token-a"));
        store.upsert("alice", alice).unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn rotated_token_is_persisted_before_it_is_returned() {
        let dir = tempdir().unwrap();
        let store = store_with_alice(dir.path());
        let source = TokenRefreshInterceptor::new(
            ScriptedSource::new(vec![Some("token-a"), Some("token-b")]),
            store.clone(),
            "alice",
        );

        assert_eq!(source.token().await.unwrap().access_token, "token-a");
        let returned = source.token().await.unwrap();
        assert_eq!(returned.access_token, "token-b");

        let live = store.find("alice").unwrap();
        assert_eq!(live.oauth_token.unwrap().access_token, "token-b");

        let reopened = CredentialStore::open(dir.path().join("creds.json")).unwrap();
        let on_disk = reopened.find("alice").unwrap();
        assert_eq!(on_disk.oauth_token.unwrap().access_token, "token-b");
    }

    #[tokio::test]
    async fn inner_errors_propagate_and_leave_store_untouched() {
        let dir = tempdir().unwrap();
        let store = store_with_alice(dir.path());
        let source =
            TokenRefreshInterceptor::new(ScriptedSource::new(vec![None]), store.clone(), "alice");

        assert!(matches!(source.token().await, Err(ConnectError::Auth(_))));
        let live = store.find("alice").unwrap();
        assert_eq!(live.oauth_token.unwrap().access_token, "token-a");
    }

    #[tokio::test]
    async fn unknown_user_is_reported() {
        let dir = tempdir().unwrap();
        let store = store_with_alice(dir.path());
        let source = TokenRefreshInterceptor::new(
            ScriptedSource::new(vec![Some("token-z")]),
            store,
            "zed",
        );
        assert!(matches!(source.token().await, Err(ConnectError::Core(_))));
    }
}
