//! Request pipeline stages. Each stage is a `handle(request, next)` function
//! (or a tower layer) composed in order by `routes::router`.

pub mod authenticate;
pub mod authorize;
pub mod cors;
pub mod extract;
pub mod fallback;
pub mod metrics;
pub mod rate_limit;
pub mod recover;
pub mod response;

pub use authenticate::authenticate;
pub use authorize::{require_activated, require_authenticated, require_permission, PermissionGate};
pub use extract::JsonBody;
pub use metrics::{track_metrics, Metrics};
pub use rate_limit::rate_limit;
pub use response::{ApiResponse, ApiResult};
