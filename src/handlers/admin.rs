//! Operational endpoints.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::errors::RegistryError;
use crate::index::RefreshSummary;
use crate::AppState;

/// `GET /refresh` -- rebuild the bucket index now.
///
/// A failed refresh leaves the previous index in service.
#[utoipa::path(
    get,
    path = "/refresh",
    tag = "Admin",
    operation_id = "Refresh",
    responses(
        (status = 200, description = "Index rebuilt", body = RefreshSummary),
        (status = 500, description = "Bucket listing failed; previous index kept")
    )
)]
pub async fn refresh(state: Arc<AppState>) -> Result<Response, RegistryError> {
    let summary = state.index.refresh().await?;
    Ok((StatusCode::OK, Json(summary)).into_response())
}
