mod health;
mod metrics;
mod settings;
mod status;

pub use health::health_handler;
pub use metrics::metrics_handler;
pub use settings::{document_handler, refresh_handler, settings_handler};
pub use status::status_handler;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/status", get(status_handler))
        .route("/settings", get(settings_handler))
        .route("/document", get(document_handler))
        .route("/refresh", post(refresh_handler))
        .with_state(state)
}
