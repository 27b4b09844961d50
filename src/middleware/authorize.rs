//! Route gates layered on top of the authentication stage.
//!
//! Each gate implies the ones before it: permission requires activation,
//! activation requires authentication. The first failing gate answers, so a
//! client can tell "log in" from "activate" from "not allowed".

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::database::models::{Identity, User};
use crate::database::Models;
use crate::error::ApiError;

fn identity(request: &Request) -> Identity {
    request
        .extensions()
        .get::<Identity>()
        .cloned()
        .unwrap_or_default()
}

pub fn check_authenticated(identity: &Identity) -> Result<&User, ApiError> {
    identity.user().ok_or_else(ApiError::authentication_required)
}

pub fn check_activated(identity: &Identity) -> Result<&User, ApiError> {
    let user = check_authenticated(identity)?;
    if !user.activated {
        return Err(ApiError::inactive_account());
    }
    Ok(user)
}

pub async fn require_authenticated(request: Request, next: Next) -> Response {
    match check_authenticated(&identity(&request)) {
        Ok(_) => next.run(request).await,
        Err(err) => err.into_response(),
    }
}

pub async fn require_activated(request: Request, next: Next) -> Response {
    match check_activated(&identity(&request)) {
        Ok(_) => next.run(request).await,
        Err(err) => err.into_response(),
    }
}

/// State for `require_permission`: which code the route needs and where to
/// look it up.
#[derive(Clone)]
pub struct PermissionGate {
    pub models: Models,
    pub code: &'static str,
}

impl PermissionGate {
    pub fn new(models: Models, code: &'static str) -> Self {
        Self { models, code }
    }

    async fn check(&self, identity: &Identity) -> Result<(), ApiError> {
        let user = check_activated(identity)?;
        // Looked up on every request so revocations apply immediately
        let permissions = self.models.permissions.get_all_for_user(user.id).await?;
        if !permissions.include(self.code) {
            return Err(ApiError::not_permitted());
        }
        Ok(())
    }
}

pub async fn require_permission(
    State(gate): State<PermissionGate>,
    request: Request,
    next: Next,
) -> Response {
    match gate.check(&identity(&request)).await {
        Ok(()) => next.run(request).await,
        Err(err) => err.into_response(),
    }
}
