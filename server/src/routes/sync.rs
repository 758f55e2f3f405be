//! Sync endpoint routes.

use axum::{
    extract::{DefaultBodyLimit, State},
    routing::post,
    Json, Router,
};
use daybook_engine::{RemoteSnapshot, SyncPayload, UploadReceipt};

use crate::auth::AuthUser;
use crate::error::Result;
use crate::handlers::{handle_download, handle_upload};
use crate::rate_limit::SyncEndpoint;
use crate::AppState;

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Create sync routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sync", post(upload_handler))
        .route("/sync/download", post(download_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}

/// POST /sync - Apply a client's changes.
async fn upload_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<SyncPayload>,
) -> Result<Json<UploadReceipt>> {
    state
        .rate_limiter
        .check(SyncEndpoint::Upload, &auth.user_id)?;
    let receipt = handle_upload(
        &state.pool,
        &auth.user_id,
        &payload,
        state.config.sync_max_items,
    )
    .await?;
    Ok(Json(receipt))
}

/// POST /sync/download - Fetch everything the user owns.
async fn download_handler(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<RemoteSnapshot>> {
    state
        .rate_limiter
        .check(SyncEndpoint::Download, &auth.user_id)?;
    let snapshot = handle_download(&state.pool, &auth.user_id).await?;
    Ok(Json(snapshot))
}
