//! Application-level error type shared by the HTTP surface. Every variant
//! maps to one status code and a `{"error": ...}` JSON body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::config::ConfigError;
use crate::pipeline::configuration::ConfigStoreError;
use crate::pipeline::ingest::IngestError;
use crate::pipeline::orchestrator::PipelineError;
use crate::telemetry::TelemetryError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    ConfigStore(#[from] ConfigStoreError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::ConfigStore(ConfigStoreError::NotFound) => StatusCode::NOT_FOUND,
            AppError::ConfigStore(ConfigStoreError::InUse) => StatusCode::CONFLICT,
            AppError::ConfigStore(ConfigStoreError::Validation(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Pipeline(PipelineError::RunInProgress) => StatusCode::CONFLICT,
            AppError::Pipeline(PipelineError::UnknownPhase(_)) => StatusCode::BAD_REQUEST,
            AppError::Pipeline(PipelineError::RunNotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Pipeline(PipelineError::RunFinished(_)) => StatusCode::CONFLICT,
            AppError::Pipeline(PipelineError::Config(inner)) => match inner {
                ConfigStoreError::NotFound => StatusCode::NOT_FOUND,
                ConfigStoreError::InUse => StatusCode::CONFLICT,
                ConfigStoreError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            },
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Ingest(_)
            | AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_client_status_codes() {
        assert_eq!(
            AppError::from(ConfigStoreError::NotFound).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(ConfigStoreError::InUse).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(ConfigStoreError::Validation("bad".into())).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn pipeline_errors_map_per_contract() {
        assert_eq!(
            AppError::from(PipelineError::RunInProgress).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(PipelineError::UnknownPhase("x".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(PipelineError::RunNotFound(uuid::Uuid::nil())).status_code(),
            StatusCode::NOT_FOUND
        );
    }
}
