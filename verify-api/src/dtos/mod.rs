//! Wire types for the bot-facing API. Field names are camelCase to match
//! the consumers of the original service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StartEmailRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "telegramId is required"))]
    pub telegram_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartEmailResponse {
    pub verification_id: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VerifyEmailRequest {
    #[validate(length(min = 1, message = "verificationId is required"))]
    pub verification_id: String,

    #[validate(length(equal = 6, message = "Code must be 6 digits"))]
    pub code: String,

    #[validate(length(min = 1, message = "telegramId is required"))]
    pub telegram_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyEmailResponse {
    pub ok: bool,
    pub user_id: String,
    pub has_password: bool,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SetPasswordRequest {
    #[validate(length(min = 1, message = "telegramId is required"))]
    pub telegram_id: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters long"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SetPasswordResponse {
    pub ok: bool,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct IssueSessionRequest {
    #[validate(length(min = 1, message = "telegramId is required"))]
    pub telegram_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueSessionResponse {
    pub session_url: String,
}
