use service_core::config::{get_env, get_env_parse, load_dotenv, Environment};
use service_core::error::AppError;

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub environment: Environment,
    pub service_name: String,
    pub log_level: String,
    pub telegram_bot_token: String,
    pub api_url: String,
    pub frontend_url: String,
    pub student_domains: Vec<String>,
    pub code_max_attempts: u32,
    pub rate_limit: BotRateLimitConfig,
}

#[derive(Debug, Clone)]
pub struct BotRateLimitConfig {
    pub messages: u32,
    pub window_seconds: u64,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, AppError> {
        load_dotenv();

        let environment = Environment::from_env()?;
        let is_prod = environment.is_prod();

        Ok(BotConfig {
            environment,
            service_name: get_env("SERVICE_NAME", Some("verify-bot"), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            // No usable default exists for the token, even in dev.
            telegram_bot_token: get_env("TELEGRAM_BOT_TOKEN", None, is_prod)?,
            api_url: get_env("API_URL", Some("http://localhost:8080"), is_prod)?,
            frontend_url: get_env("FRONTEND_URL", Some("http://localhost:3000"), is_prod)?,
            student_domains: get_env(
                "STUDENT_EMAIL_DOMAINS",
                Some(".edu,.ac.uk,.edu.uz"),
                is_prod,
            )?
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
            code_max_attempts: get_env_parse("CODE_MAX_ATTEMPTS", 5u32, is_prod)?,
            rate_limit: BotRateLimitConfig {
                messages: get_env_parse("RATE_LIMIT_MESSAGES", 10u32, is_prod)?,
                window_seconds: get_env_parse("RATE_LIMIT_WINDOW_SECONDS", 60u64, is_prod)?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_in_dev() {
        std::env::set_var("TELEGRAM_BOT_TOKEN", "123456:test-token");
        let config = BotConfig::from_env().expect("dev config should load from defaults");
        assert_eq!(config.code_max_attempts, 5);
        assert_eq!(config.rate_limit.messages, 10);
        assert!(config.student_domains.contains(&".edu.uz".to_string()));
        std::env::remove_var("TELEGRAM_BOT_TOKEN");
    }
}
