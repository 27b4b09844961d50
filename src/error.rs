// HTTP API Error Types
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::auth::PasswordError;
use crate::database::DatabaseError;

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    Unauthorized(String),
    /// 401 carrying a `WWW-Authenticate: Bearer` challenge
    InvalidAuthenticationToken,

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 405 Method Not Allowed
    MethodNotAllowed(String),

    // 409 Conflict
    Conflict(String),

    // 422 Unprocessable Entity
    UnprocessableEntity {
        message: String,
        field_errors: HashMap<String, String>,
    },

    // 429 Too Many Requests
    TooManyRequests(String),

    // 500 Internal Server Error
    InternalServerError(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) | ApiError::InvalidAuthenticationToken => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::UnprocessableEntity { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::InvalidAuthenticationToken => "invalid or missing authentication token",
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::MethodNotAllowed(msg)
            | ApiError::Conflict(msg)
            | ApiError::TooManyRequests(msg)
            | ApiError::InternalServerError(msg) => msg,
            ApiError::UnprocessableEntity { message, .. } => message,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::InvalidAuthenticationToken => "INVALID_AUTHENTICATION_TOKEN",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::MethodNotAllowed(_) => "METHOD_NOT_ALLOWED",
            ApiError::Conflict(_) => "EDIT_CONFLICT",
            ApiError::UnprocessableEntity { .. } => "VALIDATION_ERROR",
            ApiError::TooManyRequests(_) => "TOO_MANY_REQUESTS",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "error": true,
            "message": self.message(),
            "code": self.error_code()
        });
        if let ApiError::UnprocessableEntity { field_errors, .. } = self {
            body["field_errors"] = json!(field_errors);
        }
        body
    }
}

// Constructors for the responses the API sends
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn not_found() -> Self {
        ApiError::NotFound("the requested resource could not be found".to_string())
    }

    pub fn method_not_allowed(method: &str) -> Self {
        ApiError::MethodNotAllowed(format!(
            "the {} method is not supported for this resource",
            method
        ))
    }

    pub fn edit_conflict() -> Self {
        ApiError::Conflict(
            "unable to update the record due to an edit conflict, please try again".to_string(),
        )
    }

    pub fn failed_validation(field_errors: HashMap<String, String>) -> Self {
        ApiError::UnprocessableEntity {
            message: "one or more fields failed validation".to_string(),
            field_errors,
        }
    }

    /// 422 for a single field
    pub fn invalid_field(field: &str, message: &str) -> Self {
        let mut field_errors = HashMap::new();
        field_errors.insert(field.to_string(), message.to_string());
        Self::failed_validation(field_errors)
    }

    pub fn invalid_credentials() -> Self {
        ApiError::Unauthorized("invalid authentication credentials".to_string())
    }

    pub fn authentication_required() -> Self {
        ApiError::Unauthorized("you must be authenticated to access this resource".to_string())
    }

    pub fn inactive_account() -> Self {
        ApiError::Forbidden(
            "your user account must be activated to access this resource".to_string(),
        )
    }

    pub fn not_permitted() -> Self {
        ApiError::Forbidden(
            "your user account doesn't have the necessary permissions to access this resource"
                .to_string(),
        )
    }

    pub fn rate_limit_exceeded() -> Self {
        ApiError::TooManyRequests("rate limit exceeded".to_string())
    }

    /// Opaque 500; the cause must already be logged by the caller.
    pub fn server_error() -> Self {
        ApiError::InternalServerError(
            "the server encountered a problem and could not process your request".to_string(),
        )
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound => ApiError::not_found(),
            DatabaseError::EditConflict => ApiError::edit_conflict(),
            DatabaseError::DuplicateEmail => {
                ApiError::invalid_field("email", "a user with this email address already exists")
            }
            other => {
                // Don't expose storage detail to clients
                tracing::error!(error = %other, "store operation failed");
                ApiError::server_error()
            }
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        tracing::error!(error = %err, "password hashing failed");
        ApiError::server_error()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status_code(), Json(self.to_json())).into_response();
        if matches!(self, ApiError::InvalidAuthenticationToken) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
