use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber for a service.
///
/// RUST_LOG takes precedence; otherwise `log_level` applies to the whole
/// tree. Idempotent enough for tests: a second call is a no-op.
pub fn init_tracing(service_name: &str, log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let result = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true),
        )
        .try_init();

    if result.is_ok() {
        tracing::info!(service = %service_name, "Tracing initialized");
    }
}
