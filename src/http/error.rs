use std::io;

use actix_web::{http::StatusCode, HttpResponse, ResponseError};

use crate::station::RecordingError;

/// Errors returned to HTTP clients, rendered as `{"error": "..."}`
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Recording(#[from] RecordingError),
    #[error("file not found")]
    NotFound,
    #[error("failed to read recordings: {0}")]
    Io(#[from] io::Error),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Recording(RecordingError::Exists(_) | RecordingError::NotRecording) => {
                StatusCode::CONFLICT
            }
            Self::Recording(RecordingError::Io(_)) | Self::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::NotFound => StatusCode::NOT_FOUND,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!("request failed: {self}");
        }
        HttpResponse::build(status).json(serde_json::json!({ "error": self.to_string() }))
    }
}
