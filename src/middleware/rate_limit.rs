use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::error::ApiError;
use crate::state::AppState;

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// Refuses requests once the client's bucket is empty. The limiter lock is
/// released inside `admit`, before the rest of the pipeline runs.
pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.limiter.enabled() {
        return next.run(request).await;
    }

    let (mut parts, body) = request.into_parts();
    let peer = ConnectInfo::<SocketAddr>::from_request_parts(&mut parts, &state)
        .await
        .ok()
        .map(|ConnectInfo(addr)| addr);

    let key = match client_key(&parts.headers, peer, state.config.limiter.trust_forwarded_for) {
        Ok(ip) => ip.to_string(),
        Err(reason) => {
            error!(%reason, "cannot derive rate limit key");
            return ApiError::server_error().into_response();
        }
    };

    if !state.limiter.admit(&key) {
        return ApiError::rate_limit_exceeded().into_response();
    }

    next.run(Request::from_parts(parts, body)).await
}

/// Client identity for rate limiting. The peer address is used unless
/// forwarded headers are trusted and present; a present but malformed header
/// is an error rather than a reason to fall back.
pub fn client_key(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> Result<IpAddr, String> {
    if trust_forwarded_for {
        if let Some(value) = headers.get(X_FORWARDED_FOR) {
            let first = value
                .to_str()
                .ok()
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .unwrap_or_default();
            return first
                .parse()
                .map_err(|_| format!("malformed {} header: {:?}", X_FORWARDED_FOR, value));
        }
        if let Some(value) = headers.get(X_REAL_IP) {
            return value
                .to_str()
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .ok_or_else(|| format!("malformed {} header: {:?}", X_REAL_IP, value));
        }
    }

    peer.map(|addr| addr.ip())
        .ok_or_else(|| "peer address unavailable".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{
        body::Body,
        extract::connect_info::MockConnectInfo,
        http::{HeaderValue, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    use crate::config::{AppConfig, Environment};
    use crate::database::Models;
    use crate::mailer::LogMailer;

    fn peer() -> Option<SocketAddr> {
        Some("192.0.2.10:51234".parse().unwrap())
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn peer_address_by_default() {
        let h = headers(&[(X_FORWARDED_FOR, "203.0.113.5")]);
        let key = client_key(&h, peer(), false).unwrap();
        assert_eq!(key.to_string(), "192.0.2.10");
    }

    #[test]
    fn forwarded_headers_when_trusted() {
        let h = headers(&[(X_FORWARDED_FOR, "203.0.113.5, 10.0.0.1")]);
        assert_eq!(client_key(&h, peer(), true).unwrap().to_string(), "203.0.113.5");

        let h = headers(&[(X_REAL_IP, "2001:db8::1")]);
        assert_eq!(client_key(&h, peer(), true).unwrap().to_string(), "2001:db8::1");

        let h = HeaderMap::new();
        assert_eq!(client_key(&h, peer(), true).unwrap().to_string(), "192.0.2.10");
    }

    #[test]
    fn malformed_forwarded_header_is_an_error() {
        let h = headers(&[(X_FORWARDED_FOR, "not-an-ip")]);
        assert!(client_key(&h, peer(), true).is_err());
    }

    #[test]
    fn missing_peer_is_an_error() {
        assert!(client_key(&HeaderMap::new(), None, false).is_err());
    }

    fn limited_router() -> Router {
        let mut config = AppConfig::for_environment(Environment::Development);
        config.limiter.enabled = true;
        config.limiter.rps = 2.0;
        config.limiter.burst = 4;
        let mailer = Arc::new(LogMailer::new(&config.smtp));
        let state = AppState::new(config, Models::memory(), mailer);

        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(state, rate_limit))
    }

    fn get_root() -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .uri("/")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn mocked_peer_is_rate_limited() {
        let peer: SocketAddr = "192.0.2.10:51234".parse().unwrap();
        let app = limited_router().layer(MockConnectInfo(peer));

        let mut statuses = Vec::new();
        for _ in 0..5 {
            let response = app
                .clone()
                .oneshot(get_root())
                .await
                .unwrap();
            statuses.push(response.status());
        }

        assert_eq!(
            statuses,
            [
                StatusCode::OK,
                StatusCode::OK,
                StatusCode::OK,
                StatusCode::OK,
                StatusCode::TOO_MANY_REQUESTS
            ]
        );
    }

    #[tokio::test]
    async fn unknown_peer_is_a_server_error() {
        // No connection info at all, neither real nor mocked
        let response = limited_router()
            .oneshot(get_root())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
