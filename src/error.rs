use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::api::response;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    TranscriptError(String),

    #[error("Error generating summary: {0}")]
    LlmError(String),

    #[error("Request processing timed out")]
    Timeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::TranscriptError(_) => StatusCode::BAD_REQUEST,
            AppError::LlmError(_) | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Timeout => StatusCode::REQUEST_TIMEOUT,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        response::error(self.status(), self.to_string()).into_response()
    }
}

impl From<url::ParseError> for AppError {
    fn from(err: url::ParseError) -> Self {
        AppError::ConfigError(format!("Invalid server URL: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
