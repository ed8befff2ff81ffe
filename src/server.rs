//! HTTP surface
//! Mission: Wire the auth handlers into one axum router

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::auth::{admin, api as auth_api, auth_middleware, AuthState};
use crate::middleware::{rate_limit_middleware, request_logging, RateLimitLayer};

/// Build the full application router. `login_limiter` throttles the login
/// route per client IP when present.
pub fn build_router(state: AuthState, login_limiter: Option<RateLimitLayer>) -> Router {
    let mut login_routes = Router::new().route("/api/auth/login", post(auth_api::login));
    if let Some(limiter) = login_limiter {
        login_routes =
            login_routes.route_layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));
    }

    // Bearer is optional here: these endpoints answer for missing or stale sessions themselves
    let public_routes = Router::new()
        .route("/api/auth/verify-session", post(auth_api::verify_session))
        .route("/api/auth/signout-beacon", post(auth_api::signout_beacon))
        .merge(login_routes);

    let protected_routes = Router::new()
        .route("/api/auth/me", get(auth_api::get_current_user))
        .route("/api/auth/refresh", post(auth_api::refresh))
        .route("/api/auth/signout", post(auth_api::sign_out))
        .route("/api/user/change-password", post(auth_api::change_password))
        .route(
            "/api/settings/maintenance",
            get(admin::get_maintenance).post(admin::set_maintenance),
        )
        .route(
            "/api/admin/accounts",
            get(admin::list_accounts).post(admin::create_account),
        )
        .route(
            "/api/admin/accounts/:id",
            put(admin::update_account).delete(admin::delete_account),
        )
        .route_layer(middleware::from_fn_with_state(
            state.jwt_handler.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(middleware::from_fn(request_logging))
        .layer(CorsLayer::permissive())
}

async fn health_check() -> &'static str {
    "🛡️ session-guard operational"
}
