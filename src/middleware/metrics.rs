use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use metrics::{counter, histogram};

/// Per-request counter and latency histogram, labelled by method, matched
/// route template and status.
pub async fn record_metrics(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    counter!("http_requests_total", 1, "method" => method.clone(), "route" => route.clone(), "status" => status.clone());
    histogram!(
        "http_request_duration_seconds",
        start.elapsed().as_secs_f64(),
        "method" => method,
        "route" => route,
        "status" => status
    );
    response
}
