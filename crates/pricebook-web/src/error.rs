use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pricebook_core::{QueryError, ValidationError};
use thiserror::Error;

use crate::response::Envelope;

/// Failure returned by a handler, rendered as the error envelope.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    BadRequest(String),

    #[error("page {requested} is out of bounds, max page is {max}")]
    PageOutOfBounds { requested: u64, max: u64 },

    #[error("{0}")]
    NotFound(String),

    /// Details are logged, never sent.
    #[error("internal server error")]
    Internal,
}

impl ApiError {
    pub fn missing_parameter(name: &str) -> Self {
        Self::BadRequest(format!("missing required query parameter '{name}'"))
    }

    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) | Self::PageOutOfBounds { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(error: QueryError) -> Self {
        match error {
            QueryError::Validation(validation) => Self::Validation(validation),
            QueryError::PageOutOfBounds { requested, max } => {
                Self::PageOutOfBounds { requested, max }
            }
            QueryError::Warehouse(source) => {
                tracing::error!(error = %source, "query failed in storage");
                Self::Internal
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(Envelope::<()>::error(self.to_string()))).into_response()
    }
}
