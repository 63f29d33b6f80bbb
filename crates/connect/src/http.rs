//! Response handling shared by every remote client.

use std::time::Duration;

use log::debug;
use serde::de::DeserializeOwned;

use crate::error::{ConnectError, Result};

#[derive(Debug, serde::Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Reads the body, turning a non-2xx status into [`ConnectError::Api`].
pub(crate) async fn checked_body(response: reqwest::Response) -> Result<Vec<u8>> {
    let status = response.status();
    let body = response.bytes().await?;

    if !status.is_success() {
        let text = String::from_utf8_lossy(&body);
        debug!("remote returned {status}: {text}");
        if let Ok(err) = serde_json::from_slice::<ApiErrorResponse>(&body) {
            if let Some(msg) = err
                .detail
                .or(err.message)
                .or(err.error_description)
                .or(err.error)
            {
                return Err(ConnectError::api(status.as_u16(), msg));
            }
        }
        return Err(ConnectError::api(
            status.as_u16(),
            text.chars().take(200).collect::<String>(),
        ));
    }

    Ok(body.to_vec())
}

pub(crate) async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let body = checked_body(response).await?;
    Ok(serde_json::from_slice(&body)?)
}
