use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::dataset::DatasetError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("Invalid upload: {0}")]
    Multipart(#[from] MultipartError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Multipart(e) => e.status(),
            ApiError::Dataset(e) => match e {
                DatasetError::UnknownDataset(_) => StatusCode::NOT_FOUND,
                DatasetError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
                DatasetError::NothingUploaded
                | DatasetError::MissingColumn { .. }
                | DatasetError::Encoding { .. }
                | DatasetError::InvalidName { .. }
                | DatasetError::Csv { .. } => StatusCode::BAD_REQUEST,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, %status, "Request rejected");
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_errors_map_to_client_statuses() {
        let err = ApiError::from(DatasetError::NothingUploaded);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "No files uploaded");

        let err = ApiError::from(DatasetError::UnknownDataset("Greeting".to_string()));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = ApiError::from(DatasetError::MissingColumn {
            file: "Greeting.csv".to_string(),
        });
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn io_failures_are_server_errors() {
        let err = ApiError::from(DatasetError::Io(std::io::Error::other("disk full")));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
