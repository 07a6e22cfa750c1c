use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// A user created or updated by a successful email verification.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub telegram_id: Option<String>,
    pub email_verified: bool,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new_verified(email: String, telegram_id: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            email,
            telegram_id: Some(telegram_id),
            email_verified: true,
            email_verified_at: Some(now),
            password_hash: None,
            created_at: now,
        }
    }

    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }
}
