use axum::{extract::rejection::JsonRejection, extract::State, Json};

use crate::api::{
    error::ApiError,
    state::AppState,
    types::{PredictRequest, PredictResponse, TrainRequest, TrainResponse},
};

/// POST /api/predict
pub async fn predict(
    State(state): State<AppState>,
    payload: std::result::Result<Json<PredictRequest>, JsonRejection>,
) -> std::result::Result<Json<PredictResponse>, ApiError> {
    let Json(req) = payload?;
    let prediction = state.classifier.predict(&req.image).await?;
    Ok(Json(PredictResponse {
        prediction: prediction.class,
    }))
}

/// POST /api/train
///
/// Applies one gradient step; the new parameters are written back to the
/// model file only when persist-on-train is enabled.
pub async fn train(
    State(state): State<AppState>,
    payload: std::result::Result<Json<TrainRequest>, JsonRejection>,
) -> std::result::Result<Json<TrainResponse>, ApiError> {
    let Json(req) = payload?;
    let outcome = state.classifier.train(&req.image, req.label).await?;

    let status = if outcome.persisted {
        "Model trained on one sample and saved"
    } else {
        "Model trained on one sample"
    };
    Ok(Json(TrainResponse {
        status: status.to_string(),
        prediction_before: outcome.prediction_before,
        persisted: outcome.persisted,
    }))
}
