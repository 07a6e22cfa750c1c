pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::ApiConfig;
use crate::services::{Database, EmailProvider, JwtService};
use service_core::error::AppError;
use service_core::middleware::rate_limit::{ip_rate_limit_middleware, IpRateLimiter};

#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub db: Database,
    pub email: Arc<dyn EmailProvider>,
    pub jwt: JwtService,
    pub start_email_rate_limiter: IpRateLimiter,
    pub ip_rate_limiter: IpRateLimiter,
}

pub fn build_router(state: AppState) -> Router {
    // start-email triggers outbound email, so it gets a tighter per-IP
    // limit than the rest of the surface.
    let start_email_limiter = state.start_email_rate_limiter.clone();
    let start_email_route = Router::new()
        .route("/auth/bot/start-email", post(handlers::auth::start_email))
        .layer(from_fn_with_state(
            start_email_limiter,
            ip_rate_limit_middleware,
        ));

    let ip_limiter = state.ip_rate_limiter.clone();

    let cors = CorsLayer::new()
        .allow_origin(
            state
                .config
                .frontend_url
                .parse::<axum::http::HeaderValue>()
                .map(|origin| tower_http::cors::AllowOrigin::exact(origin))
                .unwrap_or_else(|e| {
                    tracing::error!(error = %e, "Invalid FRONTEND_URL for CORS, allowing any origin");
                    tower_http::cors::AllowOrigin::any()
                }),
        )
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);

    Router::new()
        .route("/health", get(health_check))
        .merge(start_email_route)
        .route("/auth/bot/verify-email", post(handlers::auth::verify_email))
        .route("/auth/bot/set-password", post(handlers::auth::set_password))
        .route(
            "/auth/bot/issue-session",
            post(handlers::auth::issue_session),
        )
        .with_state(state)
        .layer(from_fn_with_state(ip_limiter, ip_rate_limit_middleware))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
}

/// Service health check.
pub async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<axum::Json<serde_json::Value>, AppError> {
    state.db.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Database health check failed");
        e
    })?;

    Ok(axum::Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "checks": { "database": "up" }
    })))
}
