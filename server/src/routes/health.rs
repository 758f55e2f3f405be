//! Health check endpoint.

use axum::{routing::get, Json, Router};
use daybook_engine::EntityKind;
use serde::Serialize;

use crate::AppState;

/// Health check response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Wire names of every kind this server stores
    pub entity_kinds: Vec<&'static str>,
}

/// Create health routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/", get(root))
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        entity_kinds: EntityKind::ALL.iter().map(|k| k.wire_name()).collect(),
    })
}

async fn root() -> &'static str {
    "Daybook Sync Server"
}
