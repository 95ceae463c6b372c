pub mod auth;
pub mod errors;
pub mod metrics;
pub mod panic;
pub mod response;
pub mod roles;

use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, Request},
    http::{header, HeaderName, HeaderValue, Method},
    middleware::from_fn,
    Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::config::AppConfig;

pub use auth::jwt_auth_middleware;
pub use errors::normalize_errors;
pub use metrics::record_metrics;
pub use panic::handle_panic;
pub use response::{ApiResponse, ApiResult, PagedResponse};
pub use roles::require_admin;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Wrap `router` in the cross-cutting layers. Outermost first:
///
/// 1. CORS
/// 2. Set request id
/// 3. Trace span and request log
/// 4. Propagate request id to the response
/// 5. Compression
/// 6. Error normalization
/// 7. Metrics
/// 8. Timeout
/// 9. Panic recovery
/// 10. Body size limit
pub fn apply_middleware<S>(router: Router<S>, config: &AppConfig) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    let mut router = router
        .layer(DefaultBodyLimit::max(config.api.max_request_size_bytes))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TimeoutLayer::new(Duration::from_secs(config.api.request_timeout_secs)))
        .layer(from_fn(record_metrics))
        .layer(from_fn(normalize_errors));

    if config.api.enable_response_compression {
        router = router.layer(CompressionLayer::new());
    }

    router = router.layer(PropagateRequestIdLayer::new(request_id.clone()));

    if config.api.enable_request_logging {
        router = router.layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request| {
                    let request_id = request
                        .headers()
                        .get(REQUEST_ID_HEADER)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("-");
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = %request_id,
                        subject = tracing::field::Empty,
                    )
                })
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );
    }

    router = router.layer(SetRequestIdLayer::new(request_id, MakeRequestUuid));

    if config.security.enable_cors {
        router = router.layer(cors_layer(&config.security.cors_origins));
    }
    router
}

/// `*` (or an empty list) allows any origin. Unparseable origins are skipped
/// with a warning.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, HeaderName::from_static(REQUEST_ID_HEADER)])
        .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)]);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("Ignoring invalid CORS origin '{}': {}", o, e);
                None
            }
        })
        .collect();
    layer.allow_origin(parsed)
}
