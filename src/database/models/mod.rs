pub mod movie;
pub mod permission;
pub mod token;
pub mod user;

pub use movie::{validate_movie, Movie, Runtime};
pub use permission::{Permissions, MOVIES_READ, MOVIES_WRITE};
pub use token::{validate_token_plaintext, Scope, Token};
pub use user::{validate_email, validate_password_plaintext, validate_user, Identity, User};
