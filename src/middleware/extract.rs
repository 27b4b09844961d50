use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Request},
    http::{request::Parts, StatusCode},
};
use serde::de::DeserializeOwned;
use serde_json::error::Category;

use crate::database::models::Identity;
use crate::error::ApiError;
use crate::state::AppState;

/// JSON request body with client-facing error messages. Target types are
/// expected to use `#[serde(deny_unknown_fields)]`.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T> FromRequest<AppState> for JsonBody<T>
where
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(request: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let limit = state.config.api.max_request_size_bytes;
        let bytes = Bytes::from_request(request, state)
            .await
            .map_err(|rejection| {
                if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                    ApiError::bad_request(format!("body must not be larger than {} bytes", limit))
                } else {
                    ApiError::bad_request(rejection.body_text())
                }
            })?;

        parse_json(&bytes).map(JsonBody)
    }
}

pub fn parse_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ApiError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::bad_request("body must not be empty"));
    }

    serde_json::from_slice(bytes).map_err(|err| {
        let message = err.to_string();
        let text = match err.classify() {
            Category::Eof => "body contains badly-formed JSON".to_string(),
            Category::Syntax if message.starts_with("trailing characters") => {
                "body must only contain a single JSON value".to_string()
            }
            Category::Syntax => {
                format!("body contains badly-formed JSON (at column {})", err.column())
            }
            Category::Data => match unknown_field(&message) {
                Some(field) => format!("body contains unknown key \"{}\"", field),
                None => format!("body contains incorrect JSON type: {}", strip_position(&message)),
            },
            Category::Io => "body could not be read".to_string(),
        };
        ApiError::bad_request(text)
    })
}

fn unknown_field(message: &str) -> Option<&str> {
    let rest = message.strip_prefix("unknown field `")?;
    rest.split('`').next()
}

fn strip_position(message: &str) -> &str {
    message.split(" at line ").next().unwrap_or(message)
}

/// The identity attached by the authentication stage, anonymous when absent.
#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Identity>().cloned().unwrap_or_default())
    }
}

/// Record ids in paths are positive integers; anything else is treated as an
/// unknown resource.
pub fn parse_id(raw: &str) -> Result<i64, ApiError> {
    match raw.parse::<i64>() {
        Ok(id) if id >= 1 => Ok(id),
        _ => Err(ApiError::not_found()),
    }
}
