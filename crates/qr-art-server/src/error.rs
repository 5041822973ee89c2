use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use qr_art_core::ArtError;
use serde_json::json;
use thiserror::Error;

/// Ошибки HTTP слоя
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Data required")]
    DataRequired,

    #[error("Prompt is required for AI mode")]
    PromptRequired,

    #[error("Invalid value for {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },

    #[error("Cannot read background image: {0}")]
    InvalidUpload(#[from] image::ImageError),

    #[error("Malformed form: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Task not found")]
    TaskNotFound,

    #[error(transparent)]
    Art(#[from] ArtError),

    #[error("Worker failed: {0}")]
    Worker(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::DataRequired
            | ServerError::PromptRequired
            | ServerError::InvalidField { .. }
            | ServerError::InvalidUpload(_)
            | ServerError::Multipart(_) => StatusCode::BAD_REQUEST,
            ServerError::TaskNotFound => StatusCode::NOT_FOUND,
            ServerError::Art(
                ArtError::EmptyData
                | ArtError::Encode(_)
                | ArtError::OutputTooSmall { .. }
                | ArtError::InvalidColor(_)
                | ArtError::MissingPrompt,
            ) => StatusCode::BAD_REQUEST,
            ServerError::Art(ArtError::Backend(_)) => StatusCode::BAD_GATEWAY,
            ServerError::Art(_) | ServerError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("Request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ServerError::DataRequired.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ServerError::TaskNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ServerError::Art(ArtError::InvalidColor("red".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServerError::Art(ArtError::Backend(qr_art_core::BackendError::EmptyResult)).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_messages() {
        assert_eq!(ServerError::DataRequired.to_string(), "Data required");
        assert_eq!(ServerError::TaskNotFound.to_string(), "Task not found");
    }
}
