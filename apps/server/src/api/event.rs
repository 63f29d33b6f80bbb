//! Webhook callback: subscription verification and event delivery.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use ourabridge_core::documents::DocumentType;
use ourabridge_core::subscriptions::EventType;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::{
    dispatcher::SyncRequest,
    error::{ApiError, ApiResult},
    main_lib::AppState,
};

#[derive(Debug, Deserialize)]
struct VerificationQuery {
    #[serde(default)]
    verification_token: String,
    #[serde(default)]
    challenge: String,
}

/// Notification body posted by the remote service.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub event_type: EventType,
    pub data_type: String,
    pub object_id: String,
    #[serde(default)]
    pub event_time: Option<String>,
    pub user_id: String,
}

/// Answers the challenge sent while a subscription is being created.
async fn verify_subscription(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VerificationQuery>,
) -> ApiResult<Json<Value>> {
    if !state.verifier.matches(&query.verification_token) {
        warn!("subscription verification with unknown token");
        return Err(ApiError::BadRequest("verification token mismatch".into()));
    }
    info!("answered subscription verification challenge");
    Ok(Json(json!({ "challenge": query.challenge })))
}

async fn receive_event(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult<&'static str> {
    let event: WebhookEvent = serde_json::from_slice(&body).map_err(|e| {
        warn!(
            "malformed webhook payload {:?}: {e}",
            String::from_utf8_lossy(&body)
        );
        ApiError::BadRequest(format!("malformed event: {e}"))
    })?;

    let Some(cred) = state.credentials.find_by_remote_id(&event.user_id) else {
        info!(
            "dropping {} {} event for unknown remote user {}",
            event.event_type, event.data_type, event.user_id
        );
        return Ok("ok");
    };
    let data_type = match DocumentType::from_str(&event.data_type) {
        Ok(data_type) if data_type.is_notified() => data_type,
        _ => {
            info!("{}: ignoring event for {}", cred.name, event.data_type);
            return Ok("ok");
        }
    };
    if !event.event_type.carries_document() {
        info!(
            "{}: ignoring {} event for {} {}",
            cred.name, event.event_type, data_type, event.object_id
        );
        return Ok("ok");
    }

    info!(
        "{}: {} {} {} at {}",
        cred.name,
        event.event_type,
        data_type,
        event.object_id,
        event.event_time.as_deref().unwrap_or("-")
    );
    let queue = state.queue.clone();
    let request = SyncRequest::Document {
        username: cred.name,
        data_type,
        object_id: event.object_id,
    };
    // Detached so the event still reaches the queue if this request is dropped.
    tokio::spawn(async move { queue.enqueue(request).await })
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok("ok")
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/event", get(verify_subscription).post(receive_event))
}
