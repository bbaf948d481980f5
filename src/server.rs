//! Axum router construction and registry route mapping.
//!
//! The [`app`] function wires every registry endpoint to its handler and
//! returns a ready-to-serve [`axum::Router`].  Handlers in
//! [`crate::handlers`] take plain string arguments; the thin wrappers here
//! do the extraction.

use axum::{
    extract::{Path, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::errors::{generate_request_id, RegistryError};
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::AppState;

// -- OpenAPI specification ----------------------------------------------------

/// OpenAPI documentation for the registry HTTP surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Bucket Provider Registry",
        version = "0.1.0",
        description = "Provider registry protocol served from an object-storage bucket"
    ),
    paths(
        health_check,
        crate::handlers::providers::discovery,
        crate::handlers::providers::list_versions,
        crate::handlers::providers::get_download_data,
        crate::handlers::proxy::proxy,
        crate::handlers::admin::refresh,
    ),
    components(schemas(
        crate::schema::Discovery,
        crate::schema::Platform,
        crate::schema::ProviderVersion,
        crate::schema::ProviderVersions,
        crate::schema::GpgPublicKey,
        crate::schema::SigningKeys,
        crate::schema::DownloadData,
        crate::index::RefreshSummary,
    )),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Discovery", description = "Service discovery"),
        (name = "Providers", description = "Provider versions and downloads"),
        (name = "Proxy", description = "Artifact passthrough"),
        (name = "Admin", description = "Index maintenance"),
    )
)]
struct ApiDoc;

/// Build the axum [`Router`] with all registry routes.
///
/// `/metrics` is only mounted when `observability.metrics` is enabled.
pub fn app(state: Arc<AppState>) -> Router {
    let metrics_enabled = state.config.observability.metrics;

    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/openapi.json", get(openapi_json))
        .route(
            "/.well-known/terraform.json",
            get(crate::handlers::providers::discovery),
        )
        .route(
            "/v1/providers/:namespace/:type/versions",
            get(handle_list_versions),
        )
        .route(
            "/v1/providers/:namespace/:type/:version/download/:os/:arch",
            get(handle_download),
        )
        .route(
            "/proxy/:namespace/:type/:version/:filename",
            get(handle_proxy),
        )
        .route("/refresh", get(handle_refresh));

    if metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    let router = router
        .fallback(handle_not_found)
        .with_state(state)
        // Layer ordering: inner layers run first, outer layers wrap them.
        .layer(middleware::from_fn(common_headers_middleware));

    let router = if metrics_enabled {
        router.layer(middleware::from_fn(metrics_middleware))
    } else {
        router
    };

    router
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
}

// -- Common headers middleware -----------------------------------------------

/// Adds `x-request-id`, `date` and `server` to every response.
async fn common_headers_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    if !headers.contains_key("x-request-id") {
        if let Ok(value) = HeaderValue::from_str(&generate_request_id()) {
            headers.insert("x-request-id", value);
        }
    }

    let date = httpdate::fmt_http_date(std::time::SystemTime::now());
    if let Ok(value) = HeaderValue::from_str(&date) {
        headers.insert("date", value);
    }
    headers.insert("server", HeaderValue::from_static("bucket-registry"));

    response
}

// -- Health check ------------------------------------------------------------

/// `GET /health` -- Returns `{"status": "ok"}` with 200 OK.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    operation_id = "HealthCheck",
    responses(
        (status = 200, description = "Health check OK")
    )
)]
async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"status":"ok"}"#,
    )
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

async fn handle_not_found() -> RegistryError {
    RegistryError::not_found("route")
}

// -- Route wrappers ----------------------------------------------------------

async fn handle_list_versions(
    State(state): State<Arc<AppState>>,
    Path((namespace, provider_type)): Path<(String, String)>,
) -> Result<Response, RegistryError> {
    crate::handlers::providers::list_versions(state, &namespace, &provider_type).await
}

async fn handle_download(
    State(state): State<Arc<AppState>>,
    Path((namespace, provider_type, version, os, arch)): Path<(
        String,
        String,
        String,
        String,
        String,
    )>,
) -> Result<Response, RegistryError> {
    crate::handlers::providers::get_download_data(
        state,
        &namespace,
        &provider_type,
        &version,
        &os,
        &arch,
    )
    .await
}

async fn handle_proxy(
    State(state): State<Arc<AppState>>,
    Path((namespace, provider_type, version, filename)): Path<(String, String, String, String)>,
) -> Result<Response, RegistryError> {
    crate::handlers::proxy::proxy(state, &namespace, &provider_type, &version, &filename).await
}

async fn handle_refresh(State(state): State<Arc<AppState>>) -> Result<Response, RegistryError> {
    crate::handlers::admin::refresh(state).await
}
