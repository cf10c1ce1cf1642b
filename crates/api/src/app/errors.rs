use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use campus_auth::Denial;
use campus_infra::DataError;

pub fn json_error(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Terminal authorization denial. Only the fixed public message is exposed.
pub fn denial_response(denial: &Denial) -> Response {
    let status = StatusCode::from_u16(denial.status()).unwrap_or(StatusCode::FORBIDDEN);
    json_error(status, denial.code.as_str(), denial.public_message())
}

pub fn data_error_to_response(err: DataError) -> Response {
    match err {
        DataError::InvalidRecord(msg) => json_error(StatusCode::BAD_REQUEST, "INVALID_RECORD", msg),
        DataError::Storage(msg) => {
            tracing::error!(error = %msg, "record store failure");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORE_ERROR",
                "The record store is unavailable",
            )
        }
    }
}

pub fn not_found(what: &str) -> Response {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", format!("{what} not found"))
}

pub fn internal_error() -> Response {
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "Internal server error",
    )
}
