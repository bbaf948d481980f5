//! Registry error types.
//!
//! Every variant maps to an HTTP status.  The enum implements
//! [`axum::response::IntoResponse`] so handlers can simply return
//! `Err(RegistryError::NotFound { .. })`; the body follows the registry
//! protocol's `{"errors": [...]}` shape.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::storage::StoreError;

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

#[derive(Debug, Error)]
pub enum RegistryError {
    /// A coordinate, version, object, or key-material file does not exist.
    #[error("{resource} not found")]
    NotFound { resource: String },

    /// A checksum file could not be parsed.
    #[error("{message}")]
    Parse { message: String },

    /// Listing the bucket failed while rebuilding the index.
    #[error("index refresh failed")]
    Refresh(#[source] anyhow::Error),

    /// Catch-all for unexpected backend failures.
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl RegistryError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        RegistryError::NotFound {
            resource: resource.into(),
        }
    }

    /// Return the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            RegistryError::NotFound { .. } => StatusCode::NOT_FOUND,
            RegistryError::Parse { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            RegistryError::Refresh(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RegistryError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Render the error followed by its source chain, for logs.
    fn to_string_with_sources(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }
}

impl From<StoreError> for RegistryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { key } => RegistryError::NotFound { resource: key },
            StoreError::Backend(e) => RegistryError::Internal(e),
        }
    }
}

/// Error body shape used by the provider registry protocol.
#[derive(Debug, Serialize)]
struct ErrorBody {
    errors: Vec<String>,
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(status = status.as_u16(), "{}", self.to_string_with_sources());
        }

        let body = ErrorBody {
            errors: vec![self.to_string()],
        };
        (status, Json(body)).into_response()
    }
}
