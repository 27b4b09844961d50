use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::validator::{matches_email, Validator};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    /// Argon2id PHC string; the plaintext password is never stored
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub activated: bool,
    #[serde(skip_serializing)]
    pub version: i32,
}

/// Who is making the request. Set on every request by the authentication
/// stage; anything that reads it without that stage sees `Anonymous`.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Identity {
    #[default]
    Anonymous,
    User(User),
}

impl Identity {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous)
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            Identity::Anonymous => None,
            Identity::User(user) => Some(user),
        }
    }
}

pub fn validate_email(v: &mut Validator, email: &str) {
    v.check(!email.is_empty(), "email", "must be provided");
    v.check(matches_email(email), "email", "must be a valid email address");
}

pub fn validate_password_plaintext(v: &mut Validator, password: &str) {
    v.check(!password.is_empty(), "password", "must be provided");
    v.check(password.len() >= 8, "password", "must be at least 8 bytes long");
    v.check(password.len() <= 72, "password", "must not be more than 72 bytes long");
}

pub fn validate_user(v: &mut Validator, name: &str, email: &str, password: &str) {
    v.check(!name.is_empty(), "name", "must be provided");
    v.check(name.len() <= 500, "name", "must not be more than 500 bytes long");

    validate_email(v, email);
    validate_password_plaintext(v, password);
}
