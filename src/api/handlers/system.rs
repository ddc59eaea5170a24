use axum::{extract::State, http::StatusCode, Json};

use crate::api::{
    state::AppState,
    types::{ErrorResponse, HealthResponse, ModelSummary},
};

/// GET /health -- lightweight liveness/readiness probe
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = state.classifier.store();
    let params = store.snapshot().await;

    Json(HealthResponse {
        status: "ok".to_string(),
        hidden_units: params.hidden_units(),
        updates_applied: store.updates_applied(),
        persist_on_train: store.persist_on_train(),
        uptime_secs: state.uptime_seconds(),
    })
}

/// GET /api/model
pub async fn get_model_summary(State(state): State<AppState>) -> Json<ModelSummary> {
    let store = state.classifier.store();
    let params = store.snapshot().await;

    Json(ModelSummary {
        hidden_units: params.hidden_units(),
        shapes: params.shapes(),
        updates_applied: store.updates_applied(),
        persist_on_train: store.persist_on_train(),
        learning_rate: state.classifier.learning_rate(),
    })
}

/// OPTIONS on API routes: empty 200, CORS headers come from the layer.
pub async fn preflight() -> StatusCode {
    StatusCode::OK
}

/// Fallback for unknown routes and unsupported methods.
pub async fn not_found() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "Not Found".to_string(),
            traceback: None,
        }),
    )
}
