use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, patch, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::database::models::{MOVIES_READ, MOVIES_WRITE};
use crate::handlers::{protected::movies, public};
use crate::middleware::{
    authenticate, cors, fallback, rate_limit, recover, require_permission, track_metrics,
    PermissionGate,
};
use crate::state::AppState;

/// Route table wrapped in the request pipeline. Stages run outer to inner:
/// trace, metrics, panic recovery, 405 body, CORS, rate limit, authenticate.
/// Permission gates sit on the individual routes.
pub fn router(state: AppState) -> Router {
    let gate = |code: &'static str| {
        middleware::from_fn_with_state(
            PermissionGate::new(state.models.clone(), code),
            require_permission,
        )
    };

    let movie_routes = Router::new()
        .route(
            "/v1/movies",
            get(movies::list)
                .route_layer(gate(MOVIES_READ))
                .merge(post(movies::create).route_layer(gate(MOVIES_WRITE))),
        )
        .route(
            "/v1/movies/:id",
            get(movies::show)
                .route_layer(gate(MOVIES_READ))
                .merge(
                    patch(movies::update)
                        .merge(delete(movies::delete))
                        .route_layer(gate(MOVIES_WRITE)),
                ),
        );

    let pipeline = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            track_metrics,
        ))
        .layer(recover::layer())
        .layer(middleware::from_fn(fallback::method_not_allowed))
        .layer(cors::layer(&state.config.cors))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(middleware::from_fn_with_state(state.clone(), authenticate));

    Router::new()
        .route("/v1/healthcheck", get(public::healthcheck))
        .merge(movie_routes)
        .route("/v1/users", post(public::register))
        .route("/v1/users/activated", put(public::activate))
        .route("/v1/tokens/authentication", post(public::create_authentication))
        .route("/debug/vars", get(public::debug_vars))
        .fallback(fallback::not_found)
        .layer(DefaultBodyLimit::max(state.config.api.max_request_size_bytes))
        .layer(pipeline)
        .with_state(state)
}
