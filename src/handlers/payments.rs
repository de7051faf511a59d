// src/handlers/payments.rs

use crate::{
    errors::{AppError, AppResult},
    models::ProviderWebhook,
    state::AppState,
};
use axum::{
    Json,
    extract::State,
    http::HeaderMap,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

const SIGNATURE_HEADER: &str = "x-intasend-signature";

/// IntaSend delivery webhook. The signature header must verify before the
/// payload is trusted; challenge payloads are echoed back for endpoint
/// registration. Settlement itself is idempotent, so the provider may retry
/// deliveries freely.
pub async fn provider_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ProviderWebhook>,
) -> AppResult<Json<Value>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::InvalidSignature)?;
    state.intasend.verify_webhook_signature(signature)?;

    if let Some(challenge) = &payload.challenge {
        info!("Answering webhook registration challenge");
        return Ok(Json(json!({ "challenge": challenge })));
    }

    state.reconcile.handle_webhook(payload).await?;
    Ok(Json(json!({ "status": "ok" })))
}

#[derive(Debug, Deserialize)]
pub struct StatusCheckRequest {
    pub tracking_id: String,
}

/// Manually trigger the status poll for one tracking reference, without
/// waiting for the scheduled safety-net check.
pub async fn trigger_status_check(
    State(state): State<AppState>,
    Json(body): Json<StatusCheckRequest>,
) -> AppResult<Json<Value>> {
    state.reconcile.reconcile_poll(&body.tracking_id).await?;
    Ok(Json(json!({ "status": "ok" })))
}
