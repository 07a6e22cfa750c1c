use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use service_core::middleware::rate_limit::create_ip_rate_limiter;
use service_core::observability::logging::init_tracing;
use tokio::signal;
use verify_api::{
    build_router,
    config::ApiConfig,
    db,
    services::{Database, EmailService, JwtService},
    AppState,
};

const EXPIRY_SWEEP_INTERVAL_SECONDS: u64 = 300;

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    let config = ApiConfig::from_env()?;

    init_tracing(&config.service_name, &config.log_level);

    tracing::info!(
        service = %config.service_name,
        environment = ?config.environment,
        "Starting verification service"
    );

    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool)
        .await
        .map_err(|e| service_core::error::AppError::DatabaseError(anyhow::anyhow!(e)))?;
    let database = Database::new(pool);
    tracing::info!("Database initialized");

    let email = Arc::new(EmailService::new(&config.smtp)?);
    let jwt = JwtService::new(&config.session);

    let start_email_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.start_email_attempts,
        config.rate_limit.start_email_window_seconds,
    );
    let ip_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.global_ip_limit,
        config.rate_limit.global_ip_window_seconds,
    );

    let state = AppState {
        config: config.clone(),
        db: database.clone(),
        email,
        jwt,
        start_email_rate_limiter,
        ip_rate_limiter,
    };

    // Sweep expired codes so abandoned verifications don't accumulate.
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_secs(EXPIRY_SWEEP_INTERVAL_SECONDS));
        loop {
            interval.tick().await;
            match database.delete_expired_codes().await {
                Ok(0) => {}
                Ok(n) => tracing::info!(swept = n, "Expired verification codes removed"),
                Err(e) => tracing::error!(error = %e, "Expiry sweep failed"),
            }
        }
    });

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
