use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Detail returned when an upload's extension is not an accepted image type.
pub const UNSUPPORTED_FORMAT_MESSAGE: &str = "Only image files (jpg, jpeg, png) are allowed.";

/// Everything that can end a detection request early.
///
/// Only upload problems change the HTTP status. Processing failures are
/// answered with `200 OK` and an `{"error", "kind"}` body, so clients must
/// check for the `error` key.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Only image files (jpg, jpeg, png) are allowed.")]
    UnsupportedFormat,

    #[error("{0}")]
    MissingUpload(String),

    #[error("{0}")]
    UploadTooLarge(String),

    #[error("failed to decode image: {0}")]
    DecodeFailure(String),

    #[error("face detection failed: {0}")]
    DetectionFailure(String),

    #[error("failed to encode image: {0}")]
    EncodeFailure(String),
}

impl ServiceError {
    /// Stable snake_case name serialized next to the message.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::UnsupportedFormat => "unsupported_format",
            ServiceError::MissingUpload(_) => "missing_upload",
            ServiceError::UploadTooLarge(_) => "upload_too_large",
            ServiceError::DecodeFailure(_) => "decode_failure",
            ServiceError::DetectionFailure(_) => "detection_failure",
            ServiceError::EncodeFailure(_) => "encode_failure",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::UnsupportedFormat => StatusCode::BAD_REQUEST,
            ServiceError::MissingUpload(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::UploadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ServiceError::DecodeFailure(_)
            | ServiceError::DetectionFailure(_)
            | ServiceError::EncodeFailure(_) => StatusCode::OK,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        if status == StatusCode::OK {
            log::error!("Request failed ({}): {message}", self.kind());
            (status, Json(json!({ "error": message, "kind": self.kind() }))).into_response()
        } else {
            log::warn!("Rejected upload ({}): {message}", self.kind());
            (status, Json(json!({ "detail": message, "kind": self.kind() }))).into_response()
        }
    }
}
