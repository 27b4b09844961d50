use axum::extract::State;
use chrono::Duration;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::verify_password;
use crate::database::models::{validate_email, validate_password_plaintext, Scope};
use crate::database::DatabaseError;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, JsonBody};
use crate::state::AppState;
use crate::validator::Validator;

pub const AUTHENTICATION_TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialsInput {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// POST /v1/tokens/authentication - Exchange credentials for a bearer token.
/// Earlier authentication tokens of the user are revoked.
pub async fn create_authentication(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<CredentialsInput>,
) -> ApiResult<Value> {
    let mut v = Validator::new();
    validate_email(&mut v, &input.email);
    validate_password_plaintext(&mut v, &input.password);
    if !v.valid() {
        return Err(ApiError::failed_validation(v.into_errors()));
    }

    let user = match state.models.users.get_by_email(&input.email).await {
        Ok(user) => user,
        Err(DatabaseError::NotFound) => return Err(ApiError::invalid_credentials()),
        Err(other) => return Err(other.into()),
    };

    if !verify_password(&input.password, &user.password_hash)? {
        return Err(ApiError::invalid_credentials());
    }

    state
        .models
        .tokens
        .delete_all_for_user(Scope::Authentication, user.id)
        .await?;

    let token = state
        .models
        .tokens
        .new_token(
            user.id,
            Duration::hours(AUTHENTICATION_TOKEN_TTL_HOURS),
            Scope::Authentication,
        )
        .await?;

    tracing::info!(user_id = user.id, "authentication token issued");
    Ok(ApiResponse::created(json!({ "authentication_token": token })))
}
