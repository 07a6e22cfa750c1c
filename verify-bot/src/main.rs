use service_core::observability::logging::init_tracing;
use std::sync::Arc;
use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::prelude::*;
use verify_bot::api_client::ApiClient;
use verify_bot::config::BotConfig;
use verify_bot::flow::FlowState;
use verify_bot::handlers;
use verify_bot::rate_limit::create_chat_rate_limiter;

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    let config = BotConfig::from_env()?;

    init_tracing(&config.service_name, &config.log_level);

    tracing::info!(
        service = %config.service_name,
        environment = ?config.environment,
        api_url = %config.api_url,
        "Starting verification bot"
    );

    let bot = Bot::new(config.telegram_bot_token.clone());
    let api = ApiClient::new(&config.api_url)
        .map_err(|e| service_core::error::AppError::ConfigError(anyhow::anyhow!(e)))?;
    let dialogue_storage = InMemStorage::<FlowState>::new();
    let rate_limiter = create_chat_rate_limiter(&config.rate_limit);
    let config = Arc::new(config);

    tracing::info!("Bot is running");

    Dispatcher::builder(bot, handlers::schema())
        .dependencies(dptree::deps![config, api, dialogue_storage, rate_limiter])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
