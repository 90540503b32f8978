//! Request count and latency metrics per route

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use hybridrag_common::metrics::RequestMetrics;

/// Record every request under its route template, e.g. `/v1/{tenant}/conversations`
pub async fn track_requests(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let metrics = RequestMetrics::start(request.method().as_str(), &endpoint);

    let response = next.run(request).await;

    metrics.finish(response.status().as_u16());
    response
}
