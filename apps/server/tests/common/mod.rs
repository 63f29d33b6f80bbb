#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;

use axum::body::{to_bytes, Body};
use axum::http::Response;
use ourabridge_server::config::Config;

/// Configuration with every file under `dir` and every remote URL under `remote`.
pub fn test_config(dir: &Path, remote: &str) -> Config {
    let vars: HashMap<&str, String> = HashMap::from([
        ("OB_CLIENT_ID", "cid".to_string()),
        ("OB_CLIENT_SECRET", "secret".to_string()),
        ("OB_API_BASE_URL", format!("{remote}/v2")),
        ("OB_AUTH_URL", format!("{remote}/authorize")),
        ("OB_TOKEN_URL", format!("{remote}/oauth/token")),
        (
            "OB_USER_CREDS_FILE",
            dir.join("creds.json").display().to_string(),
        ),
        (
            "OB_SUBSCRIPTIONS_FILE",
            dir.join("subs.json").display().to_string(),
        ),
        (
            "OB_LOCAL_DATA_LOG",
            dir.join("data.txt").display().to_string(),
        ),
        ("OB_TIMEOUT_SECS", "5".to_string()),
    ]);
    Config::from_vars(|key| vars.get(key).cloned()).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
