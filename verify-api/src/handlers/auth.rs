//! Verification flow handlers.
//!
//! Implements the code lifecycle (issue, check, consume) and the session
//! hand-off. Core logic lives in `*_impl` functions so tests can exercise
//! it without going through the router.

use axum::{
    extract::{Json, State},
    http::StatusCode,
};
use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use validator::Validate;

use crate::dtos::{
    IssueSessionRequest, IssueSessionResponse, SetPasswordRequest, SetPasswordResponse,
    StartEmailRequest, StartEmailResponse, VerifyEmailRequest, VerifyEmailResponse,
};
use crate::models::VerificationCode;
use crate::utils::password::hash_password;
use crate::AppState;
use service_core::error::AppError;

const CODE_LENGTH: usize = 6;

/// Issue a verification code for a student email - implementation.
#[tracing::instrument(skip(state, req), fields(telegram_id = %req.telegram_id))]
pub async fn start_email_impl(
    state: &AppState,
    req: StartEmailRequest,
) -> Result<StartEmailResponse, AppError> {
    let email = req.email.trim().to_lowercase();

    let domains = &state.config.verification.student_domains;
    if !domains.iter().any(|d| email.ends_with(d.as_str())) {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Email must be from a student domain: {}",
            domains.join(", ")
        )));
    }

    // Resend cooldown: one code per address per window.
    let cooldown = state.config.verification.resend_cooldown_seconds;
    if let Some(issued_at) = state.db.latest_code_issued_at(&email).await? {
        let elapsed = (chrono::Utc::now() - issued_at).num_seconds();
        if elapsed < cooldown {
            let retry_after = (cooldown - elapsed).max(1) as u64;
            return Err(AppError::TooManyRequests(
                "A code was sent recently. Please wait before requesting another.".to_string(),
                Some(retry_after),
            ));
        }
    }

    let code = generate_code(CODE_LENGTH);
    let code_hash = hash_code(&code, &state.config.verification.pepper);

    let verification = VerificationCode::new(
        email.clone(),
        code_hash,
        req.telegram_id.clone(),
        state.config.verification.code_ttl_seconds,
    );
    state.db.insert_verification_code(&verification).await?;

    // A failed send must not invalidate the issued code; the user can ask
    // for a resend after the cooldown.
    let ttl_minutes = state.config.verification.code_ttl_seconds / 60;
    if let Err(e) = state
        .email
        .send_verification_code(&email, &code, ttl_minutes)
        .await
    {
        tracing::error!(error = %e, "Failed to send verification email");
    }

    Ok(StartEmailResponse {
        verification_id: verification.id,
        expires_at: verification.expires_at,
    })
}

/// POST /auth/bot/start-email
pub async fn start_email(
    State(state): State<AppState>,
    Json(req): Json<StartEmailRequest>,
) -> Result<(StatusCode, Json<StartEmailResponse>), AppError> {
    req.validate()?;
    let response = start_email_impl(&state, req).await?;
    Ok((StatusCode::OK, Json(response)))
}

/// Check a submitted code - implementation.
#[tracing::instrument(skip(state, req), fields(verification_id = %req.verification_id))]
pub async fn verify_email_impl(
    state: &AppState,
    req: VerifyEmailRequest,
) -> Result<VerifyEmailResponse, AppError> {
    let verification = state
        .db
        .find_verification_code(&req.verification_id)
        .await?
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Invalid verification ID")))?;

    if verification.telegram_id != req.telegram_id {
        return Err(AppError::BadRequest(anyhow::anyhow!("Telegram ID mismatch")));
    }

    if verification.is_consumed() {
        return Err(AppError::BadRequest(anyhow::anyhow!("Code already used")));
    }

    if verification.is_expired() {
        return Err(AppError::BadRequest(anyhow::anyhow!("Code expired")));
    }

    if verification.attempts_exhausted(state.config.verification.max_attempts) {
        return Err(AppError::BadRequest(anyhow::anyhow!("Too many attempts")));
    }

    let submitted_hash = hash_code(&req.code, &state.config.verification.pepper);
    if !hashes_match(&submitted_hash, &verification.code_hash) {
        state.db.increment_attempts(&verification.id).await?;
        return Err(AppError::AuthError(anyhow::anyhow!("Invalid code")));
    }

    state.db.consume_verification_code(&verification.id).await?;

    let user = state
        .db
        .upsert_verified_user(&verification.email, &req.telegram_id)
        .await?;

    tracing::info!(user_id = %user.id, "Email verified");

    Ok(VerifyEmailResponse {
        ok: true,
        has_password: user.has_password(),
        user_id: user.id,
    })
}

/// POST /auth/bot/verify-email
pub async fn verify_email(
    State(state): State<AppState>,
    Json(req): Json<VerifyEmailRequest>,
) -> Result<Json<VerifyEmailResponse>, AppError> {
    req.validate()?;
    let response = verify_email_impl(&state, req).await?;
    Ok(Json(response))
}

/// Set the account password after verification - implementation.
#[tracing::instrument(skip(state, req), fields(telegram_id = %req.telegram_id))]
pub async fn set_password_impl(
    state: &AppState,
    req: SetPasswordRequest,
) -> Result<SetPasswordResponse, AppError> {
    let user = state
        .db
        .find_user_by_telegram_id(&req.telegram_id)
        .await?
        .filter(|u| u.email_verified)
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("User not verified")))?;

    let password_hash = hash_password(&req.password)?;
    state.db.set_password_hash(&user.id, &password_hash).await?;

    tracing::info!(user_id = %user.id, "Password set");

    Ok(SetPasswordResponse { ok: true })
}

/// POST /auth/bot/set-password
pub async fn set_password(
    State(state): State<AppState>,
    Json(req): Json<SetPasswordRequest>,
) -> Result<Json<SetPasswordResponse>, AppError> {
    req.validate()?;
    let response = set_password_impl(&state, req).await?;
    Ok(Json(response))
}

/// Issue a short-lived session URL - implementation.
#[tracing::instrument(skip(state, req), fields(telegram_id = %req.telegram_id))]
pub async fn issue_session_impl(
    state: &AppState,
    req: IssueSessionRequest,
) -> Result<IssueSessionResponse, AppError> {
    let user = state
        .db
        .find_user_by_telegram_id(&req.telegram_id)
        .await?
        .filter(|u| u.email_verified)
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("User not verified")))?;

    let token = state
        .jwt
        .generate_session_token(&user.id, &req.telegram_id)
        .map_err(AppError::InternalError)?;

    let session_url = format!("{}/auth/magic?token={}", state.config.frontend_url, token);

    Ok(IssueSessionResponse { session_url })
}

/// POST /auth/bot/issue-session
pub async fn issue_session(
    State(state): State<AppState>,
    Json(req): Json<IssueSessionRequest>,
) -> Result<Json<IssueSessionResponse>, AppError> {
    req.validate()?;
    let response = issue_session_impl(&state, req).await?;
    Ok(Json(response))
}

// ============================================================================
// Helpers
// ============================================================================

/// Generate a random numeric code.
fn generate_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| rng.gen_range(0..10).to_string())
        .collect()
}

/// Hash a code with the server pepper for storage.
pub(crate) fn hash_code(code: &str, pepper: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hasher.update(pepper.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time comparison of two hex digests.
fn hashes_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_code_is_numeric_and_sized() {
        for _ in 0..50 {
            let code = generate_code(CODE_LENGTH);
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn hash_depends_on_pepper() {
        let a = hash_code("123456", "pepper-a");
        let b = hash_code("123456", "pepper-b");
        assert_ne!(a, b);
        assert_eq!(a, hash_code("123456", "pepper-a"));
    }

    #[test]
    fn hash_comparison() {
        let a = hash_code("123456", "p");
        assert!(hashes_match(&a, &hash_code("123456", "p")));
        assert!(!hashes_match(&a, &hash_code("654321", "p")));
    }
}
