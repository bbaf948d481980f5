//! Provider discovery, version listing and download metadata.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::errors::RegistryError;
use crate::schema::{Discovery, DownloadData, ProviderVersions};
use crate::AppState;

/// `GET /.well-known/terraform.json` -- service discovery document.
#[utoipa::path(
    get,
    path = "/.well-known/terraform.json",
    tag = "Discovery",
    operation_id = "Discovery",
    responses(
        (status = 200, description = "Supported services", body = Discovery)
    )
)]
pub async fn discovery() -> Response {
    (StatusCode::OK, Json(Discovery::default())).into_response()
}

/// `GET /v1/providers/:namespace/:type/versions`
#[utoipa::path(
    get,
    path = "/v1/providers/{namespace}/{type}/versions",
    tag = "Providers",
    operation_id = "ListVersions",
    params(
        ("namespace" = String, Path, description = "Provider namespace"),
        ("type" = String, Path, description = "Provider type")
    ),
    responses(
        (status = 200, description = "Published versions", body = ProviderVersions),
        (status = 404, description = "Provider not found")
    )
)]
pub async fn list_versions(
    state: Arc<AppState>,
    namespace: &str,
    provider_type: &str,
) -> Result<Response, RegistryError> {
    let versions = state
        .registry
        .list_versions(namespace, provider_type)
        .await?;
    Ok((StatusCode::OK, Json(versions)).into_response())
}

/// `GET /v1/providers/:namespace/:type/:version/download/:os/:arch`
#[utoipa::path(
    get,
    path = "/v1/providers/{namespace}/{type}/{version}/download/{os}/{arch}",
    tag = "Providers",
    operation_id = "GetDownloadData",
    params(
        ("namespace" = String, Path, description = "Provider namespace"),
        ("type" = String, Path, description = "Provider type"),
        ("version" = String, Path, description = "Provider version"),
        ("os" = String, Path, description = "Target operating system"),
        ("arch" = String, Path, description = "Target architecture")
    ),
    responses(
        (status = 200, description = "Download metadata", body = DownloadData),
        (status = 404, description = "Checksum file or key material not found"),
        (status = 500, description = "Malformed checksum file")
    )
)]
pub async fn get_download_data(
    state: Arc<AppState>,
    namespace: &str,
    provider_type: &str,
    version: &str,
    os: &str,
    arch: &str,
) -> Result<Response, RegistryError> {
    let data = state
        .registry
        .get_download_data(namespace, provider_type, version, os, arch)
        .await?;
    Ok((StatusCode::OK, Json(data)).into_response())
}
