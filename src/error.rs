//! Request-time failures of the prediction endpoint.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("missing field `{0}`")]
    MissingField(String),

    #[error("unexpected field `{0}`")]
    UnexpectedField(String),

    #[error("field `{field}` must be {expected}")]
    InvalidType {
        field: String,
        expected: &'static str,
    },

    #[error("model failure: {0}")]
    Model(String),
}

impl IntoResponse for PredictionError {
    fn into_response(self) -> Response {
        error!("prediction failed: {}", self);

        let body = Json(json!({ "error": self.to_string() }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}
