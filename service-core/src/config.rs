//! Environment-driven configuration helpers shared by all services.

use crate::error::AppError;
use std::env;

/// Deployment environment. Controls whether defaults may stand in for
/// missing variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Prod,
}

impl Environment {
    pub fn from_env() -> Result<Self, AppError> {
        let raw = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        raw.parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))
    }

    pub fn is_prod(self) -> bool {
        self == Environment::Prod
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

/// Load `.env` if present. Safe to call more than once.
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Look up an environment variable with an optional default.
///
/// In production a missing variable is always an error; in dev the
/// default is used when one is provided.
pub fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

/// Parse a numeric environment variable, falling back to the default on
/// parse failure.
pub fn get_env_parse<T>(key: &str, default: T, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr + ToString + Copy,
{
    let raw = get_env(key, Some(&default.to_string()), is_prod)?;
    Ok(raw.parse().unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_used_in_dev() {
        let val = get_env("SERVICE_CORE_TEST_MISSING_VAR", Some("fallback"), false).unwrap();
        assert_eq!(val, "fallback");
    }

    #[test]
    fn missing_without_default_errors() {
        assert!(get_env("SERVICE_CORE_TEST_MISSING_VAR_2", None, false).is_err());
    }

    #[test]
    fn missing_in_prod_errors_even_with_default() {
        assert!(get_env("SERVICE_CORE_TEST_MISSING_VAR_3", Some("x"), true).is_err());
    }

    #[test]
    fn parse_falls_back_on_garbage() {
        std::env::set_var("SERVICE_CORE_TEST_BAD_NUM", "not-a-number");
        let val: u32 = get_env_parse("SERVICE_CORE_TEST_BAD_NUM", 42, false).unwrap();
        assert_eq!(val, 42);
        std::env::remove_var("SERVICE_CORE_TEST_BAD_NUM");
    }
}
