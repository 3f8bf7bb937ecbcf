//! HTTP mapping of catalog errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use csvhub_core::{CatalogError, FetchError};
use serde::{Deserialize, Serialize};

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

/// Handler error wrapping a [`CatalogError`].
#[derive(Debug)]
pub struct ApiError(pub CatalogError);

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        ApiError(err)
    }
}

/// Status code for a catalog error.
pub fn status_for(err: &CatalogError) -> StatusCode {
    match err {
        CatalogError::ValidationError(_)
        | CatalogError::InvalidRange { .. }
        | CatalogError::Parse(_)
        | CatalogError::Join(_) => StatusCode::BAD_REQUEST,
        CatalogError::FileNotFound(_) | CatalogError::TaskNotFound(_) => StatusCode::NOT_FOUND,
        CatalogError::ConflictError(_) => StatusCode::CONFLICT,
        CatalogError::Fetch(FetchError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
        CatalogError::Fetch(_) => StatusCode::BAD_GATEWAY,
        CatalogError::Sqlite(_)
        | CatalogError::Dataset(_)
        | CatalogError::SerializationError(_)
        | CatalogError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        // The failure itself is logged where it happens.
        tracing::debug!(status = %status.as_u16(), kind = self.0.kind(), "Error response");

        let body = ErrorResponse {
            error: self.0.to_string(),
            kind: self.0.kind().to_string(),
        };
        (status, Json(body)).into_response()
    }
}
