//! SQLite database service. One method per query.

use chrono::{DateTime, Utc};
use service_core::error::AppError;
use sqlx::SqlitePool;

use crate::models::{User, VerificationCode};

/// Database wrapper over the connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Health check - ping the database.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                AppError::DatabaseError(anyhow::anyhow!("Database health check failed: {}", e))
            })?;
        Ok(())
    }

    // ==================== Verification Codes ====================

    pub async fn insert_verification_code(
        &self,
        code: &VerificationCode,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO verification_codes
                (id, email, code_hash, telegram_id, expires_at, attempts, consumed_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&code.id)
        .bind(&code.email)
        .bind(&code.code_hash)
        .bind(&code.telegram_id)
        .bind(code.expires_at)
        .bind(code.attempts)
        .bind(code.consumed_at)
        .bind(code.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    pub async fn find_verification_code(
        &self,
        id: &str,
    ) -> Result<Option<VerificationCode>, AppError> {
        sqlx::query_as::<_, VerificationCode>("SELECT * FROM verification_codes WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    pub async fn increment_attempts(&self, id: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE verification_codes SET attempts = attempts + 1 WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    pub async fn consume_verification_code(&self, id: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE verification_codes SET consumed_at = ?1 WHERE id = ?2")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    /// When the most recent code for this email was issued, if any.
    /// Drives the resend cooldown.
    pub async fn latest_code_issued_at(
        &self,
        email: &str,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT created_at FROM verification_codes WHERE email = ?1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    /// Delete expired, unconsumed codes. Returns the number of rows swept.
    pub async fn delete_expired_codes(&self) -> Result<u64, AppError> {
        let result = sqlx::query(
            "DELETE FROM verification_codes WHERE consumed_at IS NULL AND expires_at < ?1",
        )
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(result.rows_affected())
    }

    // ==================== Users ====================

    pub async fn find_user_by_telegram_id(
        &self,
        telegram_id: &str,
    ) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE telegram_id = ?1")
            .bind(telegram_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    /// Create or update a user after a successful verification.
    ///
    /// A telegram id can only back one account, so it is detached from any
    /// other row before the upsert.
    pub async fn upsert_verified_user(
        &self,
        email: &str,
        telegram_id: &str,
    ) -> Result<User, AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        sqlx::query("UPDATE users SET telegram_id = NULL WHERE telegram_id = ?1 AND email <> ?2")
            .bind(telegram_id)
            .bind(email)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        let template = User::new_verified(email.to_string(), telegram_id.to_string());

        sqlx::query(
            r#"
            INSERT INTO users
                (id, email, telegram_id, email_verified, email_verified_at, password_hash, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(email) DO UPDATE SET
                telegram_id = excluded.telegram_id,
                email_verified = excluded.email_verified,
                email_verified_at = excluded.email_verified_at
            "#,
        )
        .bind(&template.id)
        .bind(&template.email)
        .bind(&template.telegram_id)
        .bind(template.email_verified)
        .bind(template.email_verified_at)
        .bind(&template.password_hash)
        .bind(template.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?1")
            .bind(email)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        Ok(user)
    }

    pub async fn set_password_hash(
        &self,
        user_id: &str,
        password_hash: &str,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET password_hash = ?1 WHERE id = ?2")
            .bind(password_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    async fn database() -> Database {
        Database::new(create_test_pool().await.expect("pool"))
    }

    #[tokio::test]
    async fn verification_code_roundtrip() {
        let db = database().await;
        let code = VerificationCode::new(
            "a@uni.edu".to_string(),
            "hash".to_string(),
            "111".to_string(),
            900,
        );
        db.insert_verification_code(&code).await.unwrap();

        let found = db.find_verification_code(&code.id).await.unwrap().unwrap();
        assert_eq!(found.email, "a@uni.edu");
        assert_eq!(found.attempts, 0);

        db.increment_attempts(&code.id).await.unwrap();
        let found = db.find_verification_code(&code.id).await.unwrap().unwrap();
        assert_eq!(found.attempts, 1);

        db.consume_verification_code(&code.id).await.unwrap();
        let found = db.find_verification_code(&code.id).await.unwrap().unwrap();
        assert!(found.is_consumed());
    }

    #[tokio::test]
    async fn expired_codes_are_swept() {
        let db = database().await;
        let expired = VerificationCode::new(
            "a@uni.edu".to_string(),
            "hash".to_string(),
            "111".to_string(),
            -10,
        );
        let live = VerificationCode::new(
            "b@uni.edu".to_string(),
            "hash".to_string(),
            "222".to_string(),
            900,
        );
        db.insert_verification_code(&expired).await.unwrap();
        db.insert_verification_code(&live).await.unwrap();

        let swept = db.delete_expired_codes().await.unwrap();
        assert_eq!(swept, 1);
        assert!(db.find_verification_code(&live.id).await.unwrap().is_some());
        assert!(db
            .find_verification_code(&expired.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn upsert_updates_existing_user() {
        let db = database().await;
        let first = db.upsert_verified_user("a@uni.edu", "111").await.unwrap();
        let second = db.upsert_verified_user("a@uni.edu", "222").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.telegram_id.as_deref(), Some("222"));
        assert!(second.email_verified);
    }

    #[tokio::test]
    async fn telegram_id_moves_between_accounts() {
        let db = database().await;
        db.upsert_verified_user("a@uni.edu", "111").await.unwrap();
        db.upsert_verified_user("b@uni.edu", "111").await.unwrap();

        let user = db.find_user_by_telegram_id("111").await.unwrap().unwrap();
        assert_eq!(user.email, "b@uni.edu");

        let detached = db.find_user_by_email("a@uni.edu").await.unwrap().unwrap();
        assert!(detached.telegram_id.is_none());
    }

    #[tokio::test]
    async fn password_hash_is_stored() {
        let db = database().await;
        let user = db.upsert_verified_user("a@uni.edu", "111").await.unwrap();
        assert!(!user.has_password());

        db.set_password_hash(&user.id, "$argon2id$fake").await.unwrap();
        let user = db.find_user_by_telegram_id("111").await.unwrap().unwrap();
        assert!(user.has_password());
    }
}
