//! Verification token shared between the reconciler and the `/event` route.

use std::sync::{PoisonError, RwLock};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;

/// Random URL-safe token of `bytes` bytes of entropy.
pub fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// Holds the token sent with the most recent subscription-create call.
///
/// The remote side calls back with this token while the create call is
/// still outstanding, so it must be issued before the request goes out.
#[derive(Debug, Default)]
pub struct Verifier {
    current: RwLock<Option<String>>,
}

impl Verifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates and installs a fresh token, replacing the previous one.
    pub fn issue(&self) -> String {
        let token = random_token(18);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
        token
    }

    pub fn matches(&self, candidate: &str) -> bool {
        !candidate.is_empty()
            && self
                .current
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .as_deref()
                == Some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_matches_before_issue() {
        let v = Verifier::new();
        assert!(!v.matches(""));
        assert!(!v.matches("anything"));
    }

    #[test]
    fn only_latest_token_matches() {
        let v = Verifier::new();
        let first = v.issue();
        assert!(v.matches(&first));
        let second = v.issue();
        assert_ne!(first, second);
        assert!(!v.matches(&first));
        assert!(v.matches(&second));
    }

    #[test]
    fn random_tokens_are_url_safe() {
        let t = random_token(18);
        assert_eq!(t.len(), 24);
        assert!(t.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
