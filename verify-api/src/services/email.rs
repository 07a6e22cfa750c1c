use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, Message,
    SmtpTransport, Transport,
};
use service_core::error::AppError;
use std::sync::Mutex;
use std::time::Duration;

#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Deliver a verification code. `ttl_minutes` is shown in the body.
    async fn send_verification_code(
        &self,
        to_email: &str,
        code: &str,
        ttl_minutes: i64,
    ) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct EmailService {
    mailer: SmtpTransport,
    from_email: String,
}

impl EmailService {
    pub fn new(config: &crate::config::SmtpConfig) -> Result<Self, AppError> {
        let creds = Credentials::new(config.user.clone(), config.password.clone());

        let mailer = SmtpTransport::relay(&config.host)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!(e.to_string())))?
            .credentials(creds)
            .port(587)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        tracing::info!(host = %config.host, "Email service initialized");

        Ok(Self {
            mailer,
            from_email: config.from_email.clone(),
        })
    }

    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        plain_body: &str,
        html_body: &str,
    ) -> Result<(), AppError> {
        let email = Message::builder()
            .from(self.from_email.parse().map_err(
                |e: lettre::address::AddressError| AppError::InternalError(e.into()),
            )?)
            .to(to_email.parse().map_err(
                |e: lettre::address::AddressError| AppError::InternalError(e.into()),
            )?)
            .subject(subject)
            .multipart(
                lettre::message::MultiPart::alternative()
                    .singlepart(
                        lettre::message::SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(plain_body.to_string()),
                    )
                    .singlepart(
                        lettre::message::SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )
            .map_err(|e| AppError::InternalError(e.into()))?;

        // Send on the blocking pool; SmtpTransport is synchronous.
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::InternalError(e.into()))?;

        match result {
            Ok(_) => {
                tracing::info!(to = %to_email, subject = %subject, "Email sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e.to_string(), to = %to_email, "Failed to send email");
                Err(AppError::EmailError(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl EmailProvider for EmailService {
    async fn send_verification_code(
        &self,
        to_email: &str,
        code: &str,
        ttl_minutes: i64,
    ) -> Result<(), AppError> {
        let html_body = format!(
            r###"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h1 style="color: #4F46E5;">StudentDeals Verification</h1>
  <p>Your verification code is:</p>
  <div style="background: #F3F4F6; padding: 20px; border-radius: 8px; text-align: center; margin: 20px 0;">
    <h2 style="color: #111827; font-size: 32px; margin: 0; letter-spacing: 4px;">{code}</h2>
  </div>
  <p style="color: #6B7280;">This code expires in {ttl_minutes} minutes.</p>
  <hr style="border: none; border-top: 1px solid #E5E7EB; margin: 20px 0;">
  <p style="color: #9CA3AF; font-size: 12px;">
    If you didn't request this code, please ignore this email.
  </p>
</div>"###
        );

        let plain_body = format!(
            "Your verification code is: {code}\n\nThis code expires in {ttl_minutes} minutes.\n\nIf you didn't request this code, please ignore this email."
        );

        self.send_email(
            to_email,
            "Your StudentDeals verification code",
            &plain_body,
            &html_body,
        )
        .await
    }
}

/// Email provider that records instead of sending. Used by tests to
/// observe the issued code.
#[derive(Default)]
pub struct MockEmailService {
    sent: Mutex<Vec<(String, String)>>,
}

impl MockEmailService {
    pub fn new() -> Self {
        Self::default()
    }

    /// (recipient, code) pairs in send order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().expect("mock email lock poisoned").clone()
    }

    pub fn last_code(&self) -> Option<String> {
        self.sent
            .lock()
            .expect("mock email lock poisoned")
            .last()
            .map(|(_, code)| code.clone())
    }
}

#[async_trait]
impl EmailProvider for MockEmailService {
    async fn send_verification_code(
        &self,
        to_email: &str,
        code: &str,
        _ttl_minutes: i64,
    ) -> Result<(), AppError> {
        self.sent
            .lock()
            .expect("mock email lock poisoned")
            .push((to_email.to_string(), code.to_string()));
        Ok(())
    }
}
