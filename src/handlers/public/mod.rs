pub mod system;
pub mod tokens;
pub mod users;

pub use system::{debug_vars, healthcheck};
pub use tokens::create_authentication;
pub use users::{activate, register};
