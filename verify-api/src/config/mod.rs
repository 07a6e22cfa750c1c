use service_core::config::{get_env, get_env_parse, load_dotenv, Environment};
use service_core::error::AppError;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub environment: Environment,
    pub service_name: String,
    pub log_level: String,
    pub port: u16,
    pub frontend_url: String,
    pub database: DatabaseConfig,
    pub smtp: SmtpConfig,
    pub session: SessionConfig,
    pub verification: VerificationConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    pub from_email: String,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub jwt_secret: String,
    pub url_ttl_seconds: i64,
}

#[derive(Debug, Clone)]
pub struct VerificationConfig {
    pub student_domains: Vec<String>,
    pub code_ttl_seconds: i64,
    pub max_attempts: i64,
    pub resend_cooldown_seconds: i64,
    pub pepper: String,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub start_email_attempts: u32,
    pub start_email_window_seconds: u64,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, AppError> {
        load_dotenv();

        let environment = Environment::from_env()?;
        let is_prod = environment.is_prod();

        Ok(ApiConfig {
            environment,
            service_name: get_env("SERVICE_NAME", Some("verify-api"), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            port: get_env_parse("PORT", 8080u16, is_prod)?,
            frontend_url: get_env(
                "FRONTEND_URL",
                Some("http://localhost:3000"),
                is_prod,
            )?,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", Some("sqlite://verify.db"), is_prod)?,
                max_connections: get_env_parse("DATABASE_MAX_CONNECTIONS", 5u32, is_prod)?,
            },
            smtp: SmtpConfig {
                host: get_env("SMTP_HOST", Some("localhost"), is_prod)?,
                user: get_env("SMTP_USER", Some("noreply@localhost"), is_prod)?,
                password: get_env("SMTP_PASSWORD", Some(""), is_prod)?,
                from_email: get_env("SMTP_FROM", Some("noreply@localhost"), is_prod)?,
            },
            session: SessionConfig {
                jwt_secret: get_env("SESSION_JWT_SECRET", Some("dev-secret-change-me"), is_prod)?,
                url_ttl_seconds: get_env_parse("SESSION_URL_TTL_SECONDS", 120i64, is_prod)?,
            },
            verification: VerificationConfig {
                student_domains: get_env(
                    "STUDENT_EMAIL_DOMAINS",
                    Some(".edu,.ac.uk,.edu.uz"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
                code_ttl_seconds: get_env_parse("CODE_TTL_SECONDS", 900i64, is_prod)?,
                max_attempts: get_env_parse("CODE_MAX_ATTEMPTS", 5i64, is_prod)?,
                resend_cooldown_seconds: get_env_parse(
                    "CODE_RESEND_COOLDOWN_SECONDS",
                    60i64,
                    is_prod,
                )?,
                pepper: get_env("CODE_PEPPER", Some("dev-pepper-change-me"), is_prod)?,
            },
            rate_limit: RateLimitConfig {
                start_email_attempts: get_env_parse("RATE_LIMIT_START_EMAIL_ATTEMPTS", 5u32, is_prod)?,
                start_email_window_seconds: get_env_parse(
                    "RATE_LIMIT_START_EMAIL_WINDOW_SECONDS",
                    300u64,
                    is_prod,
                )?,
                global_ip_limit: get_env_parse("RATE_LIMIT_GLOBAL_IP_LIMIT", 100u32, is_prod)?,
                global_ip_window_seconds: get_env_parse(
                    "RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS",
                    60u64,
                    is_prod,
                )?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_in_dev() {
        let config = ApiConfig::from_env().expect("dev config should load from defaults");
        assert_eq!(config.verification.code_ttl_seconds, 900);
        assert_eq!(config.verification.max_attempts, 5);
        assert!(config
            .verification
            .student_domains
            .contains(&".edu".to_string()));
        assert_eq!(config.session.url_ttl_seconds, 120);
    }
}
