use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::api::{handlers, state::AppState};

pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Inference endpoints
        .route(
            "/api/predict",
            post(handlers::predict)
                .options(handlers::preflight)
                .fallback(handlers::not_found),
        )
        .route(
            "/api/train",
            post(handlers::train)
                .options(handlers::preflight)
                .fallback(handlers::not_found),
        )
        // Model endpoints
        .route(
            "/api/model",
            get(handlers::get_model_summary).fallback(handlers::not_found),
        )
        // Health endpoint
        .route(
            "/health",
            get(handlers::health_handler).fallback(handlers::not_found),
        )
        .fallback(handlers::not_found)
        // Add state and CORS
        .with_state(state)
        .layer(cors)
}
