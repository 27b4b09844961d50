use axum::extract::State;
use chrono::Utc;
use serde_json::{json, Value};

use crate::middleware::ApiResponse;
use crate::state::AppState;

/// GET /v1/healthcheck - Service status and build information
pub async fn healthcheck(State(state): State<AppState>) -> ApiResponse<Value> {
    ApiResponse::success(json!({
        "status": "available",
        "system_info": {
            "environment": state.config.environment.as_str(),
            "version": env!("CARGO_PKG_VERSION"),
        }
    }))
}

/// GET /debug/vars - Request counters
pub async fn debug_vars(State(state): State<AppState>) -> ApiResponse<Value> {
    ApiResponse::success(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().timestamp(),
        "metrics": state.metrics.snapshot(),
        "rate_limiter": {
            "enabled": state.limiter.enabled(),
            "tracked_clients": state.limiter.tracked_clients(),
        }
    }))
}
