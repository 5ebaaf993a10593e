use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{error, warn};

use crate::api::error::{ErrorKind, ErrorMessage};

pub type ApiObject<T> = (StatusCode, Json<T>);

pub fn error_response(
    status: StatusCode,
    kind: ErrorKind,
    message: impl Into<String>,
) -> ApiObject<ErrorMessage> {
    let message = message.into();
    warn!(kind = kind.as_str(), status = status.as_u16(), error = %message, "request failed");
    (status, Json(ErrorMessage::new(message)))
}

/// Failures outside the request taxonomy, e.g. a panicked worker task.
pub fn internal_error(message: impl Into<String>) -> ApiObject<ErrorMessage> {
    let detail = message.into();
    error!(detail = %detail, "internal processing error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorMessage::new("Internal server error")),
    )
}

pub fn jpeg_response(bytes: Vec<u8>) -> Response {
    let length = bytes.len().to_string();
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, String::from("image/jpeg")),
            (header::CONTENT_LENGTH, length),
        ],
        bytes,
    )
        .into_response()
}
