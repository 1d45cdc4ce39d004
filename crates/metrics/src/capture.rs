use std::convert::Infallible;

use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::Response;
use tower::{Service, ServiceExt};

/// Decorator around the downstream service that remembers the status code
/// of the response it produced.
///
/// The response itself is handed back untouched: headers and body stream
/// straight through without buffering. Only the first observed status is
/// kept; until one is observed, [`status`](Self::status) reports `200 OK`.
pub struct ResponseCapture<S> {
    inner: S,
    status: Option<StatusCode>,
}

impl<S> ResponseCapture<S>
where
    S: Service<Request, Response = Response, Error = Infallible>,
{
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            status: None,
        }
    }

    /// Forward `req` to the wrapped service and record the response status.
    pub async fn call(&mut self, req: Request) -> Response {
        let result = match self.inner.ready().await {
            Ok(svc) => svc.call(req).await,
            Err(e) => Err(e),
        };
        let response = match result {
            Ok(response) => response,
            Err(never) => match never {},
        };
        self.record(response.status());
        response
    }

    fn record(&mut self, status: StatusCode) {
        self.status.get_or_insert(status);
    }

    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }
}
