use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use std::sync::Arc;

use crate::state::AppState;

pub async fn settings_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.store.snapshot();
    Json(json!({
        "phase": state.watcher.phase(),
        "fetched_at": snapshot.fetched_at.to_rfc3339(),
        "settings": &snapshot.mapping,
    }))
}

pub async fn document_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "document": state.document.state(),
        "globals": state.document.globals().to_json(),
        "writes": state.document.writes(),
    }))
}

// Asks for a settings refetch; bursts of calls collapse into one poll
pub async fn refresh_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let watcher = Arc::clone(&state.watcher);
    state
        .client
        .manager()
        .throttled_global_refresh(move || async move {
            watcher.poll_once().await;
        });
    (StatusCode::ACCEPTED, Json(json!({ "scheduled": true })))
}
