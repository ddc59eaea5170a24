use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::error::Error as _;
use tracing::{error, warn};

use crate::api::types::ErrorResponse;
use crate::error::DigitError;

/// Per-request failure, rendered as `{"error": .., "traceback": ..}`.
#[derive(Debug)]
pub struct ApiError(pub DigitError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        if self.0.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    /// Error class followed by the `source()` chain.
    pub fn diagnostic(&self) -> String {
        let mut out = format!("{}: {}", self.0.kind(), self.0);
        let mut source = self.0.source();
        while let Some(cause) = source {
            out.push_str("\ncaused by: ");
            out.push_str(&cause.to_string());
            source = cause.source();
        }
        out
    }
}

impl From<DigitError> for ApiError {
    fn from(err: DigitError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(DigitError::InvalidInput(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let traceback = self.diagnostic();
        if status.is_server_error() {
            error!(kind = self.0.kind(), error = %self.0, "request failed");
        } else {
            warn!(kind = self.0.kind(), error = %self.0, "request rejected");
        }

        let body = ErrorResponse {
            error: self.0.to_string(),
            traceback: Some(traceback),
        };
        (status, Json(body)).into_response()
    }
}
