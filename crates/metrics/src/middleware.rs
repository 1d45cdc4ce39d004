use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;

use crate::capture::ResponseCapture;
use crate::definitions::{HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION};

/// Axum middleware that records request count and latency into Prometheus.
///
/// Uses [`MatchedPath`] for the route template (e.g. `/v1/transactions`)
/// so labels stay bounded. Install it with `route_layer` so that only
/// registered routes are measured, and leave `/metrics` outside of it. When
/// installed with a plain `layer`, requests that matched no route are
/// labelled with an empty route.
pub async fn metrics_middleware(
    matched_path: Option<MatchedPath>,
    req: Request,
    next: Next,
) -> Response {
    let route = matched_path
        .as_ref()
        .map(MatchedPath::as_str)
        .unwrap_or_default()
        .to_string();
    let method = req.method().to_string();
    let start = Instant::now();

    let mut capture = ResponseCapture::new(next);
    let response = capture.call(req).await;

    let status = capture.status();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&route, &method, status.as_str()])
        .inc();
    HTTP_REQUEST_DURATION
        .with_label_values(&[&route, &method])
        .observe(start.elapsed().as_secs_f64());

    response
}
