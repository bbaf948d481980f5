//! Prometheus metrics for the registry.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants, provides an axum middleware for HTTP RED
//! metrics, and exposes the `/metrics` endpoint handler.

use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

// -- Metric name constants ----------------------------------------------------

/// Total HTTP requests (counter). Labels: method, path, status.
pub const HTTP_REQUESTS_TOTAL: &str = "registry_http_requests_total";

/// HTTP request duration in seconds (histogram). Labels: method, path.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "registry_http_request_duration_seconds";

/// Index refreshes (counter). Labels: outcome.
pub const INDEX_REFRESH_TOTAL: &str = "registry_index_refresh_total";

/// Index refresh duration in seconds (histogram).
pub const INDEX_REFRESH_DURATION_SECONDS: &str = "registry_index_refresh_duration_seconds";

/// Providers in the published index snapshot (gauge).
pub const INDEX_PROVIDERS: &str = "registry_index_providers";

// -- Global recorder installation ---------------------------------------------

/// Singleton handle to the Prometheus recorder.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent.
pub fn init_metrics() -> anyhow::Result<&'static PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle))
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total HTTP requests");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(INDEX_REFRESH_TOTAL, "Bucket index refreshes by outcome");
    describe_histogram!(
        INDEX_REFRESH_DURATION_SECONDS,
        "Bucket index refresh duration in seconds"
    );
    describe_gauge!(INDEX_PROVIDERS, "Providers in the published index snapshot");
}

// -- Metrics middleware -------------------------------------------------------

/// Axum middleware that records HTTP RED metrics for every request.
///
/// Excludes `/metrics` from self-instrumentation.
pub async fn metrics_middleware(
    req: Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    if req.uri().path() == "/metrics" {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let start = Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

// -- Path normalization -------------------------------------------------------

/// Normalize an actual request path to a route template for metric labels.
///
/// Examples:
/// - `/v1/providers/black/lodge/versions` -> `/v1/providers/{namespace}/{type}/versions`
/// - `/proxy/black/lodge/1.0.1/x.zip` -> `/proxy/{namespace}/{type}/{version}/{filename}`
/// - anything unrecognised -> `/{other}`
fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    match segments.as_slice() {
        [""] => "/".to_string(),
        [".well-known", "terraform.json"] | ["health"] | ["refresh"] | ["openapi.json"] => {
            path.to_string()
        }
        ["v1", "providers", _, _, "versions"] => {
            "/v1/providers/{namespace}/{type}/versions".to_string()
        }
        ["v1", "providers", _, _, _, "download", _, _] => {
            "/v1/providers/{namespace}/{type}/{version}/download/{os}/{arch}".to_string()
        }
        ["proxy", _, _, _, _] => "/proxy/{namespace}/{type}/{version}/{filename}".to_string(),
        _ => "/{other}".to_string(),
    }
}

// -- Metrics endpoint handler -------------------------------------------------

/// `GET /metrics` -- Render Prometheus exposition format text.
pub async fn metrics_handler() -> Response {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_static_routes() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("/health"), "/health");
        assert_eq!(normalize_path("/refresh"), "/refresh");
        assert_eq!(
            normalize_path("/.well-known/terraform.json"),
            "/.well-known/terraform.json"
        );
    }

    #[test]
    fn test_normalize_path_versions() {
        assert_eq!(
            normalize_path("/v1/providers/black/lodge/versions"),
            "/v1/providers/{namespace}/{type}/versions"
        );
    }

    #[test]
    fn test_normalize_path_download() {
        assert_eq!(
            normalize_path("/v1/providers/black/lodge/1.0.1/download/linux/amd64"),
            "/v1/providers/{namespace}/{type}/{version}/download/{os}/{arch}"
        );
    }

    #[test]
    fn test_normalize_path_proxy() {
        assert_eq!(
            normalize_path("/proxy/black/lodge/1.0.1/shasum.sig"),
            "/proxy/{namespace}/{type}/{version}/{filename}"
        );
    }

    #[test]
    fn test_normalize_path_unknown() {
        assert_eq!(normalize_path("/black/lodge"), "/{other}");
        assert_eq!(normalize_path("/proxy/black"), "/{other}");
    }
}
