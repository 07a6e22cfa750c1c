//! Pure verification flow logic.
//!
//! Everything here is SDK-free: input validation and the dialogue
//! transitions are plain functions over state and input, testable
//! without a Telegram connection. Handlers own the side effects (API
//! calls, replies) and use these to decide what comes next.

use serde::{Deserialize, Serialize};

/// Dialogue state for one chat.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum FlowState {
    /// Not in a verification flow.
    #[default]
    Idle,
    /// Verification started, waiting for the student email address.
    AwaitingEmail,
    /// Code sent, waiting for the 6-digit code.
    AwaitingCode(CodeEntry),
    /// Email verified, waiting for a new account password.
    AwaitingPassword,
}

/// What we remember between sending a code and receiving it back.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodeEntry {
    pub verification_id: String,
    pub email: String,
    /// Client-side mirror of the server attempt limit, used only for
    /// friendlier "N attempts remaining" messages.
    pub attempts_left: u32,
}

impl CodeEntry {
    pub fn new(verification_id: String, email: String, max_attempts: u32) -> Self {
        Self {
            verification_id,
            email,
            attempts_left: max_attempts,
        }
    }

    /// Record a failed code check. Returns the updated entry, or `None`
    /// once the allowance is spent and the flow should restart.
    pub fn register_failure(mut self) -> Option<Self> {
        self.attempts_left = self.attempts_left.saturating_sub(1);
        if self.attempts_left == 0 {
            None
        } else {
            Some(self)
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum EmailIssue {
    Malformed,
    NotStudentDomain,
}

/// Normalize and locally validate an email address before it is sent to
/// the API. The API repeats both checks; doing them here saves a round
/// trip for the common typo cases.
pub fn normalize_email(input: &str, student_domains: &[String]) -> Result<String, EmailIssue> {
    let email = input.trim().to_lowercase();

    let Some((local, domain)) = email.split_once('@') else {
        return Err(EmailIssue::Malformed);
    };
    if local.is_empty() || domain.is_empty() || !domain.contains('.') {
        return Err(EmailIssue::Malformed);
    }

    if !student_domains.iter().any(|d| email.ends_with(d.as_str())) {
        return Err(EmailIssue::NotStudentDomain);
    }

    Ok(email)
}

/// A verification code is exactly six ASCII digits.
pub fn parse_code(input: &str) -> Option<&str> {
    let code = input.trim();
    if code.len() == 6 && code.chars().all(|c| c.is_ascii_digit()) {
        Some(code)
    } else {
        None
    }
}

pub const MIN_PASSWORD_LENGTH: usize = 8;

pub fn parse_password(input: &str) -> Option<&str> {
    let password = input.trim();
    if password.len() >= MIN_PASSWORD_LENGTH {
        Some(password)
    } else {
        None
    }
}

/// Backend verdict on a submitted code, stripped of transport detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeCheckOutcome {
    Valid { has_password: bool },
    Rejected,
    Unavailable,
}

/// Next dialogue state after the backend has checked a code.
///
/// Accepted codes leave the code-entry phase: straight to Idle when the
/// account already has a password, otherwise on to password creation.
/// Rejections spend an attempt and restart the flow once the allowance
/// is gone; backend unavailability keeps the entry untouched so the
/// user can simply resend.
pub fn after_code_check(entry: CodeEntry, outcome: &CodeCheckOutcome) -> FlowState {
    match outcome {
        CodeCheckOutcome::Valid { has_password: true } => FlowState::Idle,
        CodeCheckOutcome::Valid { has_password: false } => FlowState::AwaitingPassword,
        CodeCheckOutcome::Rejected => match entry.register_failure() {
            Some(updated) => FlowState::AwaitingCode(updated),
            None => FlowState::Idle,
        },
        CodeCheckOutcome::Unavailable => FlowState::AwaitingCode(entry),
    }
}
