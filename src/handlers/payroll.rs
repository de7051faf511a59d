// src/handlers/payroll.rs

use crate::{
    errors::AppResult,
    models::{DraftItemUpdate, PayrollRecord, SaveDraftRequest},
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, State},
};
use uuid::Uuid;

pub async fn save_draft(
    State(state): State<AppState>,
    Path(pay_period_id): Path<Uuid>,
    Json(body): Json<SaveDraftRequest>,
) -> AppResult<Json<Vec<PayrollRecord>>> {
    let records = state.ledger.save_draft(pay_period_id, body).await?;
    Ok(Json(records))
}

pub async fn list_records(
    State(state): State<AppState>,
    Path(pay_period_id): Path<Uuid>,
) -> AppResult<Json<Vec<PayrollRecord>>> {
    let records = state.ledger.list_records(pay_period_id).await?;
    Ok(Json(records))
}

pub async fn update_draft_item(
    State(state): State<AppState>,
    Path((pay_period_id, worker_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<DraftItemUpdate>,
) -> AppResult<Json<PayrollRecord>> {
    let record = state
        .ledger
        .update_draft_item(pay_period_id, worker_id, body)
        .await?;
    Ok(Json(record))
}
