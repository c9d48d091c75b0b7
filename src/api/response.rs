use axum::Json;
use axum::http::StatusCode;
use serde::Serialize;

/// Failure body. The page only looks at the `error` field.
#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
}

pub fn success<T: Serialize>(data: T) -> (StatusCode, Json<T>) {
    (StatusCode::OK, Json(data))
}

pub fn error(status: StatusCode, message: String) -> (StatusCode, Json<ErrorBody>) {
    (status, Json(ErrorBody { error: message }))
}
