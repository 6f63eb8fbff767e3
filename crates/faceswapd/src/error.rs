use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use faceswap_core::{ErrorBody, RunnerError, StorageError};
use thiserror::Error;

pub const MSG_MISSING_IMAGES: &str = "Source and target images are required";
pub const MSG_PROCESSING_FAILED: &str = "Face swap processing failed";
pub const MSG_INTERNAL: &str = "Internal server error";

/// Everything that can end a swap request early.
///
/// Clients only ever see the fixed messages above; details go to the log.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("source or target image missing")]
    MissingImages,
    #[error("processing failed: {0}")]
    Processing(#[from] RunnerError),
    #[error("output file {0} was not produced")]
    OutputMissing(String),
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
    #[error("multipart: {0}")]
    Multipart(#[from] MultipartError),
    #[error("not a multipart request: {0}")]
    NotMultipart(#[from] MultipartRejection),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingImages => StatusCode::BAD_REQUEST,
            Self::Processing(_) | Self::OutputMissing(_) | Self::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Multipart(e) if e.status().is_client_error() => e.status(),
            Self::Multipart(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotMultipart(e) => e.status(),
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::MissingImages => MSG_MISSING_IMAGES.to_string(),
            Self::Processing(_) | Self::OutputMissing(_) => MSG_PROCESSING_FAILED.to_string(),
            Self::Multipart(e) if e.status().is_client_error() => e.body_text(),
            Self::NotMultipart(e) if e.status().is_client_error() => e.body_text(),
            Self::NotMultipart(_) => MSG_INTERNAL.to_string(),
            Self::Storage(_) | Self::Multipart(_) => MSG_INTERNAL.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "swap request failed");
        } else {
            tracing::warn!(error = %self, "swap request rejected");
        }
        (status, Json(ErrorBody::new(self.public_message()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_images_is_client_error() {
        let err = ApiError::MissingImages;
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.public_message(), MSG_MISSING_IMAGES);
    }

    #[test]
    fn test_output_missing_hides_detail() {
        let err = ApiError::OutputMissing("/srv/uploads/output-1.jpg".into());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), MSG_PROCESSING_FAILED);
    }

    #[test]
    fn test_storage_is_internal() {
        let err = ApiError::Storage(StorageError::Write {
            path: "/nope".into(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        });
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), MSG_INTERNAL);
    }
}
