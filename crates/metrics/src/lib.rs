mod capture;
mod definitions;
mod instrumented_store;
mod middleware;

pub use capture::ResponseCapture;
pub use definitions::*;
pub use instrumented_store::InstrumentedStore;
pub use middleware::metrics_middleware;

use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use prometheus::{Encoder, TextEncoder};
use tracing::error;

/// Axum handler that returns all registered metrics in Prometheus text format.
pub async fn metrics_handler() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    ([(CONTENT_TYPE, encoder.format_type())], buffer).into_response()
}

/// Build a router with just the `/metrics` endpoint.
///
/// Merge it next to the instrumented routes rather than under
/// [`metrics_middleware`], so scrapes do not count themselves.
pub fn metrics_router() -> axum::Router {
    axum::Router::new().route("/metrics", axum::routing::get(metrics_handler))
}
