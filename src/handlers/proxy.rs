//! Raw artifact passthrough.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::errors::RegistryError;
use crate::storage::ObjectStream;
use crate::AppState;

/// `GET /proxy/:namespace/:type/:version/:filename` -- stream the object.
///
/// The body is forwarded chunk by chunk; if the client goes away the
/// response is dropped and the upstream stream with it.
#[utoipa::path(
    get,
    path = "/proxy/{namespace}/{type}/{version}/{filename}",
    tag = "Proxy",
    operation_id = "Proxy",
    params(
        ("namespace" = String, Path, description = "Provider namespace"),
        ("type" = String, Path, description = "Provider type"),
        ("version" = String, Path, description = "Provider version"),
        ("filename" = String, Path, description = "Object name under the version")
    ),
    responses(
        (status = 200, description = "Object bytes"),
        (status = 404, description = "Object not found")
    )
)]
pub async fn proxy(
    state: Arc<AppState>,
    namespace: &str,
    provider_type: &str,
    version: &str,
    filename: &str,
) -> Result<Response, RegistryError> {
    let object = state
        .registry
        .proxy(namespace, provider_type, version, filename)
        .await?;

    Ok(object_response(object))
}

/// Build the passthrough response. `Content-Length` is only sent when the
/// store declared one; otherwise the body goes out chunked.
fn object_response(object: ObjectStream) -> Response {
    let content_type = HeaderValue::from_str(&object.content_type)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));

    let mut response = (StatusCode::OK, Body::from_stream(object.body)).into_response();
    let hdrs = response.headers_mut();
    hdrs.insert(header::CONTENT_TYPE, content_type);
    if let Some(length) = object.content_length {
        hdrs.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }

    response
}
