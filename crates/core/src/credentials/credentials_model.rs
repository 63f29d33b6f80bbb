//! Credential domain models.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

pub const MIN_USERNAME_LEN: usize = 3;
pub const MAX_USERNAME_LEN: usize = 12;

/// Stored OAuth grant and metadata for one user.
///
/// A record without an `oauth_token` is a claimed-but-unauthenticated
/// placeholder, created when the login flow starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Credential {
    pub name: String,
    #[serde(default)]
    pub personal_info: PersonalInfo,
    #[serde(default)]
    pub oauth_token: Option<OAuthToken>,
    #[serde(default)]
    pub last_poll: Option<DateTime<Utc>>,
}

impl Credential {
    /// Creates the placeholder record for a freshly claimed username.
    pub fn placeholder(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// True until the first successful poll has been recorded.
    pub fn is_new(&self) -> bool {
        self.last_poll.is_none()
    }

    pub fn censored_token(&self) -> String {
        self.oauth_token
            .as_ref()
            .map(OAuthToken::censored)
            .unwrap_or_else(|| "none".to_string())
    }
}

/// Snapshot of the remote `personal_info` document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PersonalInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub age: Option<i64>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub biological_sex: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl OAuthToken {
    /// First five characters of the access token, for logs.
    pub fn censored(&self) -> String {
        if self.access_token.len() >= 5 && self.access_token.is_char_boundary(5) {
            self.access_token[..5].to_string()
        } else {
            "none".to_string()
        }
    }

    /// A token without an expiry never expires.
    pub fn expires_within(&self, leeway: Duration, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|expiry| expiry - leeway <= now)
    }
}

/// Lower-cases and trims a username as typed into the login form.
pub fn normalize_username(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn validate_username(name: &str) -> Result<()> {
    let len = name.chars().count();
    if !(MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&len) {
        return Err(Error::InvalidUsername(format!(
            "username must have {MIN_USERNAME_LEN} to {MAX_USERNAME_LEN} characters"
        )));
    }
    if name.contains('.') {
        return Err(Error::InvalidUsername("username cannot contain .".into()));
    }
    Ok(())
}

/// Masks an email for display: `alice@example.com` becomes `a***e@example.com`.
pub fn censor_email(email: &str) -> String {
    let Some((local, domain)) = email.split_once('@') else {
        return "*****".to_string();
    };
    let mut chars = local.chars();
    match (chars.next(), chars.last()) {
        (Some(first), Some(last)) => format!("{first}***{last}@{domain}"),
        (Some(first), None) => format!("{first}***{first}@{domain}"),
        _ => "*****".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_length_bounds() {
        assert!(validate_username("al").is_err());
        assert!(validate_username("ali").is_ok());
        assert!(validate_username("abcdefghijkl").is_ok());
        assert!(validate_username("abcdefghijklm").is_err());
    }

    #[test]
    fn username_rejects_dots() {
        let err = validate_username("a.b.c").unwrap_err();
        assert_eq!(err.to_string(), "username cannot contain .");
    }

    #[test]
    fn normalize_lowercases() {
        assert_eq!(normalize_username("  Alice "), "alice");
    }

    #[test]
    fn censor_email_masks_local_part() {
        assert_eq!(censor_email("alice@example.com"), "a***e@example.com");
        assert_eq!(censor_email("a@example.com"), "a***a@example.com");
        assert_eq!(censor_email("not-an-email"), "*****");
    }

    #[test]
    fn censored_token_keeps_prefix() {
        let tok = OAuthToken {
            access_token: "abcdefgh".into(),
            token_type: "Bearer".into(),
            refresh_token: None,
            expiry: None,
        };
        assert_eq!(tok.censored(), "abcde");
        assert_eq!(Credential::placeholder("bob").censored_token(), "none");
    }

    #[test]
    fn expiry_leeway() {
        let now = Utc::now();
        let tok = OAuthToken {
            access_token: "abcdefgh".into(),
            token_type: "Bearer".into(),
            refresh_token: Some("r".into()),
            expiry: Some(now + Duration::seconds(20)),
        };
        assert!(tok.expires_within(Duration::seconds(30), now));
        assert!(!tok.expires_within(Duration::seconds(10), now));
    }

    #[test]
    fn placeholder_has_no_token_and_is_new() {
        let cred = Credential::placeholder("carol");
        assert_eq!(cred.name, "carol");
        assert!(cred.oauth_token.is_none());
        assert!(cred.is_new());
    }
}
