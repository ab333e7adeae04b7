use axum::{body::Bytes, extract::Multipart, http::StatusCode};
use image::ImageFormat;

use crate::error::ServiceError;

/// Multipart field holding the image.
pub const UPLOAD_FIELD: &str = "file";

/// Extensions accepted for upload, compared case-insensitively.
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

/// Image format named by an accepted upload extension.
///
/// Annotated images are re-encoded in this format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFormat {
    Jpeg,
    Png,
    WebP,
}

impl UploadFormat {
    /// Validates the text after the last `.` of `filename`.
    ///
    /// A filename without a `.` is treated as an extension in its entirety.
    pub fn from_filename(filename: &str) -> Result<Self, ServiceError> {
        let extension = filename.rsplit('.').next().unwrap_or(filename);
        match extension.to_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(UploadFormat::Jpeg),
            "png" => Ok(UploadFormat::Png),
            "webp" => Ok(UploadFormat::WebP),
            _ => Err(ServiceError::UnsupportedFormat),
        }
    }

    pub fn image_format(self) -> ImageFormat {
        match self {
            UploadFormat::Jpeg => ImageFormat::Jpeg,
            UploadFormat::Png => ImageFormat::Png,
            UploadFormat::WebP => ImageFormat::WebP,
        }
    }
}

/// Raw upload accepted by the validator; lives for one request.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub filename: String,
    pub format: UploadFormat,
    pub bytes: Bytes,
}

/// Pull the `file` field out of a multipart body.
///
/// The filename is validated before the field body is read, so rejected
/// uploads are never buffered.
pub async fn read_upload(mut multipart: Multipart) -> Result<UploadedImage, ServiceError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let format = UploadFormat::from_filename(&filename)?;
        let bytes = field.bytes().await.map_err(multipart_error)?;
        log::debug!("Received {filename} ({} bytes)", bytes.len());

        return Ok(UploadedImage {
            filename,
            format,
            bytes,
        });
    }

    Err(ServiceError::MissingUpload(format!(
        "multipart field `{UPLOAD_FIELD}` is required"
    )))
}

fn multipart_error(error: axum::extract::multipart::MultipartError) -> ServiceError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServiceError::UploadTooLarge(error.body_text())
    } else {
        ServiceError::MissingUpload(error.body_text())
    }
}
