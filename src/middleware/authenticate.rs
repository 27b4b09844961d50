use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::database::models::{validate_token_plaintext, Identity, Scope};
use crate::database::DatabaseError;
use crate::error::ApiError;
use crate::state::AppState;
use crate::validator::Validator;

/// Resolves the bearer token into an `Identity` and stores it on the request.
/// Requests without an `Authorization` header continue as anonymous.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let mut response = match resolve_identity(&state, request.headers()).await {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    };

    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("Authorization"));
    response
}

async fn resolve_identity(state: &AppState, headers: &HeaderMap) -> Result<Identity, ApiError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(Identity::Anonymous);
    };

    let token = bearer_token(value).ok_or(ApiError::InvalidAuthenticationToken)?;

    let mut v = Validator::new();
    validate_token_plaintext(&mut v, token);
    if !v.valid() {
        return Err(ApiError::InvalidAuthenticationToken);
    }

    match state
        .models
        .users
        .get_for_token(Scope::Authentication, token)
        .await
    {
        Ok(user) => Ok(Identity::User(user)),
        Err(DatabaseError::NotFound) => Err(ApiError::InvalidAuthenticationToken),
        Err(other) => Err(other.into()),
    }
}

/// Accepts exactly `Bearer <token>`: two parts separated by one space.
fn bearer_token(value: &HeaderValue) -> Option<&str> {
    let value = value.to_str().ok()?;
    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Some(token),
        _ => None,
    }
}
