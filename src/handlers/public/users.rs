use axum::extract::State;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::auth::hash_password;
use crate::database::models::{validate_token_plaintext, validate_user, Scope, User, MOVIES_READ};
use crate::database::DatabaseError;
use crate::error::ApiError;
use crate::mailer::Email;
use crate::middleware::{ApiResponse, ApiResult, JsonBody};
use crate::state::AppState;
use crate::validator::Validator;

/// Lifetime of the token mailed out at registration
pub const ACTIVATION_TOKEN_TTL_DAYS: i64 = 3;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivateInput {
    #[serde(default)]
    pub token: String,
}

/// POST /v1/users - Register an inactive account and mail its activation token
pub async fn register(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<RegisterInput>,
) -> ApiResult<Value> {
    let mut v = Validator::new();
    validate_user(&mut v, &input.name, &input.email, &input.password);
    if !v.valid() {
        return Err(ApiError::failed_validation(v.into_errors()));
    }

    let draft = User {
        id: 0,
        created_at: Utc::now(),
        name: input.name,
        email: input.email,
        password_hash: hash_password(&input.password)?,
        activated: false,
        version: 0,
    };

    let user = state.models.users.insert(&draft).await?;
    state
        .models
        .permissions
        .add_for_user(user.id, &[MOVIES_READ])
        .await?;

    let token = state
        .models
        .tokens
        .new_token(user.id, Duration::days(ACTIVATION_TOKEN_TTL_DAYS), Scope::Activation)
        .await?;

    let email = Email::welcome(&user, &token.plaintext, token.expiry);
    let mailer = state.mailer.clone();
    state.background.spawn("welcome-email", async move {
        if let Err(err) = mailer.send(email).await {
            error!(error = %err, "failed to send welcome email");
        }
    });

    info!(user_id = user.id, "user registered");
    Ok(ApiResponse::accepted(json!({ "user": user })))
}

/// PUT /v1/users/activated - Activate the account owning an activation token
pub async fn activate(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<ActivateInput>,
) -> ApiResult<Value> {
    let mut v = Validator::new();
    validate_token_plaintext(&mut v, &input.token);
    if !v.valid() {
        return Err(ApiError::failed_validation(v.into_errors()));
    }

    let mut user = match state
        .models
        .users
        .get_for_token(Scope::Activation, &input.token)
        .await
    {
        Ok(user) => user,
        Err(DatabaseError::NotFound) => {
            return Err(ApiError::invalid_field(
                "token",
                "invalid or expired activation token",
            ))
        }
        Err(other) => return Err(other.into()),
    };

    user.activated = true;
    let user = state.models.users.update(&user).await?;

    state
        .models
        .tokens
        .delete_all_for_user(Scope::Activation, user.id)
        .await?;

    info!(user_id = user.id, "user activated");
    Ok(ApiResponse::success(json!({ "user": user })))
}
