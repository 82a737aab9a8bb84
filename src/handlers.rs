use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use tracing::warn;

use crate::middleware::OverrideMatched;
use crate::response::HealthResponse;
use crate::server::AppState;

pub async fn public() -> &'static str {
    "Public"
}

/// Promotional route: behaves differently while an override event is active.
pub async fn sale(override_matched: Option<Extension<OverrideMatched>>) -> String {
    match override_matched {
        Some(Extension(OverrideMatched(true))) => "Sale!!! (promotional pricing active)".to_string(),
        _ => "Sale!!!".to_string(),
    }
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(_) => (StatusCode::OK, Json(HealthResponse::healthy())),
        Err(err) => {
            warn!(error = %err, "Counter store ping failed");
            (StatusCode::SERVICE_UNAVAILABLE, Json(HealthResponse::unhealthy()))
        }
    }
}
