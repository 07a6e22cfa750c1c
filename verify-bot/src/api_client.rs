//! Typed client for the verify-api backend.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("API request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The backend answered with a non-2xx status. `message` carries the
    /// backend's `error` field when the body was parseable.
    #[error("{message}")]
    Api { status: StatusCode, message: String },
}

impl ApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Api { status, .. } => Some(*status),
            ApiError::Transport(_) => None,
        }
    }

    /// The backend understood the request and said no, as opposed to the
    /// backend being unreachable or broken.
    pub fn is_rejection(&self) -> bool {
        self.status().is_some_and(|s| s.is_client_error())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartEmailRequest<'a> {
    email: &'a str,
    telegram_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartEmailResponse {
    pub verification_id: String,
    pub expires_at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyEmailRequest<'a> {
    verification_id: &'a str,
    code: &'a str,
    telegram_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyEmailResponse {
    pub ok: bool,
    pub user_id: String,
    pub has_password: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SetPasswordRequest<'a> {
    telegram_id: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPasswordResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IssueSessionRequest<'a> {
    telegram_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueSessionResponse {
    pub session_url: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn start_email(
        &self,
        email: &str,
        telegram_id: &str,
    ) -> Result<StartEmailResponse, ApiError> {
        self.post(
            "/auth/bot/start-email",
            &StartEmailRequest { email, telegram_id },
        )
        .await
    }

    pub async fn verify_email(
        &self,
        verification_id: &str,
        code: &str,
        telegram_id: &str,
    ) -> Result<VerifyEmailResponse, ApiError> {
        self.post(
            "/auth/bot/verify-email",
            &VerifyEmailRequest {
                verification_id,
                code,
                telegram_id,
            },
        )
        .await
    }

    pub async fn set_password(
        &self,
        telegram_id: &str,
        password: &str,
    ) -> Result<SetPasswordResponse, ApiError> {
        self.post(
            "/auth/bot/set-password",
            &SetPasswordRequest {
                telegram_id,
                password,
            },
        )
        .await
    }

    pub async fn issue_session(&self, telegram_id: &str) -> Result<IssueSessionResponse, ApiError> {
        self.post(
            "/auth/bot/issue-session",
            &IssueSessionRequest { telegram_id },
        )
        .await
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|b| b.error)
                .unwrap_or_else(|_| format!("backend returned {}", status));
            return Err(ApiError::Api { status, message });
        }

        Ok(response.json().await?)
    }
}
