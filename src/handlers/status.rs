use axum::{Json, extract::State};
use std::sync::Arc;

use crate::models::QueueStatus;
use crate::state::AppState;

pub async fn status_handler(State(state): State<Arc<AppState>>) -> Json<QueueStatus> {
    Json(state.client.manager().queue_status())
}
