// src/handlers/periods.rs

use crate::{
    errors::AppResult,
    models::{
        CreatePayPeriodRequest, FinalizeResponse, PayPeriod, PeriodStatistics,
        UpdatePayPeriodRequest,
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ListPeriodsQuery {
    pub owner_id: Uuid,
}

pub async fn create_pay_period(
    State(state): State<AppState>,
    Json(body): Json<CreatePayPeriodRequest>,
) -> AppResult<(StatusCode, Json<PayPeriod>)> {
    let period = state.periods.create(body).await?;
    Ok((StatusCode::CREATED, Json(period)))
}

pub async fn list_pay_periods(
    State(state): State<AppState>,
    Query(query): Query<ListPeriodsQuery>,
) -> AppResult<Json<Vec<PayPeriod>>> {
    let periods = state.periods.list(query.owner_id).await?;
    Ok(Json(periods))
}

pub async fn get_pay_period(
    State(state): State<AppState>,
    Path(pay_period_id): Path<Uuid>,
) -> AppResult<Json<PayPeriod>> {
    let period = state.periods.get(pay_period_id).await?;
    Ok(Json(period))
}

pub async fn update_pay_period(
    State(state): State<AppState>,
    Path(pay_period_id): Path<Uuid>,
    Json(body): Json<UpdatePayPeriodRequest>,
) -> AppResult<Json<PayPeriod>> {
    let period = state.periods.update(pay_period_id, body).await?;
    Ok(Json(period))
}

pub async fn delete_pay_period(
    State(state): State<AppState>,
    Path(pay_period_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.periods.delete(pay_period_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn activate_pay_period(
    State(state): State<AppState>,
    Path(pay_period_id): Path<Uuid>,
) -> AppResult<Json<PayPeriod>> {
    let period = state.periods.activate(pay_period_id).await?;
    Ok(Json(period))
}

/// Aggregate the period's records and move it into PROCESSING. Re-running
/// this on a completed or closed period reopens it.
pub async fn process_pay_period(
    State(state): State<AppState>,
    Path(pay_period_id): Path<Uuid>,
) -> AppResult<Json<PayPeriod>> {
    let period = state.periods.process(pay_period_id).await?;
    Ok(Json(period))
}

/// Finalize the period's records and queue payout dispatch. Responds as soon
/// as the job is queued; settlement progress is visible via statistics.
pub async fn complete_pay_period(
    State(state): State<AppState>,
    Path(pay_period_id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<FinalizeResponse>)> {
    let response = state.periods.complete(pay_period_id).await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}

pub async fn close_pay_period(
    State(state): State<AppState>,
    Path(pay_period_id): Path<Uuid>,
) -> AppResult<Json<PayPeriod>> {
    let period = state.periods.close(pay_period_id).await?;
    Ok(Json(period))
}

pub async fn get_period_statistics(
    State(state): State<AppState>,
    Path(pay_period_id): Path<Uuid>,
) -> AppResult<Json<PeriodStatistics>> {
    let stats = state.periods.statistics(pay_period_id).await?;
    Ok(Json(stats))
}
