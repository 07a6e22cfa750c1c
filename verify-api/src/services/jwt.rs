use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SessionConfig;

/// Signs and validates short-lived session tokens for magic links.
///
/// Tokens are never persisted; expiry is the only revocation mechanism,
/// which is why the TTL is measured in seconds, not days.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    url_ttl_seconds: i64,
}

/// Claims for a session URL token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (user ID)
    pub sub: String,
    /// Telegram chat-user id that completed verification
    pub telegram_id: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// JWT ID
    pub jti: String,
}

impl JwtService {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            url_ttl_seconds: config.url_ttl_seconds,
        }
    }

    pub fn url_ttl_seconds(&self) -> i64 {
        self.url_ttl_seconds
    }

    pub fn generate_session_token(
        &self,
        user_id: &str,
        telegram_id: &str,
    ) -> Result<String, anyhow::Error> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.url_ttl_seconds);

        let claims = SessionClaims {
            sub: user_id.to_string(),
            telegram_id: telegram_id.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode session token: {}", e))?;

        Ok(token)
    }

    pub fn validate_session_token(&self, token: &str) -> Result<SessionClaims, anyhow::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        let token_data = decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| anyhow::anyhow!("Invalid session token: {}", e))?;

        Ok(token_data.claims)
    }
}
