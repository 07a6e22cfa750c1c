//! Verification code model - one-time email ownership proof.

use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// A pending (or settled) email verification.
///
/// Created on start-email, mutated on each failed check and finalized by
/// setting `consumed_at` on success. Expired rows are swept periodically.
#[derive(Debug, Clone, FromRow)]
pub struct VerificationCode {
    pub id: String,
    pub email: String,
    pub code_hash: String,
    pub telegram_id: String,
    pub expires_at: DateTime<Utc>,
    pub attempts: i64,
    pub consumed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl VerificationCode {
    pub fn new(email: String, code_hash: String, telegram_id: String, ttl_seconds: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            email,
            code_hash,
            telegram_id,
            expires_at: now + Duration::seconds(ttl_seconds),
            attempts: 0,
            consumed_at: None,
            created_at: now,
        }
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    pub fn attempts_exhausted(&self, max_attempts: i64) -> bool {
        self.attempts >= max_attempts
    }
}
