use axum::http::{header, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

use crate::config::CorsConfig;

/// CORS stage for the configured trusted origins. Origins are matched exactly;
/// preflight requests (`OPTIONS` with `Access-Control-Request-Method`) are
/// answered here with 200 and an empty body.
pub fn layer(config: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .trusted_origins
        .iter()
        .filter(|origin| origin.as_str() != "*")
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring malformed trusted origin");
                None
            }
        })
        .collect();

    // Preflights from untrusted origins are still answered here with 200, just
    // without Access-Control-Allow-Origin; they never reach the router.
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::OPTIONS, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .vary([header::ORIGIN, header::ACCESS_CONTROL_REQUEST_METHOD])
}
