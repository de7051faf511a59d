// src/handlers/general.rs

use axum::Json;
use serde_json::{Value, json};

pub async fn root_handler() -> Json<Value> {
    Json(json!({
        "name": "Paydome API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
