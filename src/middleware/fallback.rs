use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;

/// Handler for paths no route matches
pub async fn not_found() -> ApiError {
    ApiError::not_found()
}

/// Replaces the router's bare 405 with the JSON error body, keeping its
/// `Allow` header. No handler answers 405 itself.
pub async fn method_not_allowed(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let response = next.run(request).await;
    if response.status() != StatusCode::METHOD_NOT_ALLOWED {
        return response;
    }

    let mut json = ApiError::method_not_allowed(method.as_str()).into_response();
    if let Some(allow) = response.headers().get(header::ALLOW) {
        json.headers_mut().insert(header::ALLOW, allow.clone());
    }
    json
}
