// src/routes/mod.rs

use crate::{
    handlers::{
        payments::{provider_webhook, trigger_status_check},
        payroll::{list_records, save_draft, update_draft_item},
        periods::{
            activate_pay_period, close_pay_period, complete_pay_period, create_pay_period,
            delete_pay_period, get_pay_period, get_period_statistics, list_pay_periods,
            process_pay_period, update_pay_period,
        },
    },
    state::AppState,
};
use axum::{
    Router,
    routing::{get, patch, post, put},
};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // ─── Pay Periods ──────────────────────────────────────
        .route("/pay-periods", post(create_pay_period).get(list_pay_periods))
        .route(
            "/pay-periods/{pay_period_id}",
            get(get_pay_period)
                .patch(update_pay_period)
                .delete(delete_pay_period),
        )
        .route(
            "/pay-periods/{pay_period_id}/activate",
            post(activate_pay_period),
        )
        .route(
            "/pay-periods/{pay_period_id}/process",
            post(process_pay_period),
        )
        .route(
            "/pay-periods/{pay_period_id}/complete",
            post(complete_pay_period),
        )
        .route("/pay-periods/{pay_period_id}/close", post(close_pay_period))
        .route(
            "/pay-periods/{pay_period_id}/statistics",
            get(get_period_statistics),
        )
        // ─── Payroll Records ──────────────────────────────────
        .route(
            "/pay-periods/{pay_period_id}/records",
            put(save_draft).get(list_records),
        )
        .route(
            "/pay-periods/{pay_period_id}/records/{worker_id}",
            patch(update_draft_item),
        )
        // ─── Payments ─────────────────────────────────────────
        .route("/payments/webhook", post(provider_webhook))
        .route("/payments/status-check", post(trigger_status_check))
}
