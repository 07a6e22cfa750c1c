//! Telegram update handlers and the dispatch schema.

use crate::api_client::ApiClient;
use crate::config::BotConfig;
use crate::flow::{self, CodeCheckOutcome, CodeEntry, EmailIssue, FlowState};
use crate::rate_limit::{allow_message, ChatRateLimiter};
use reqwest::StatusCode;
use std::sync::Arc;
use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::{ChatId, InlineKeyboardButton, InlineKeyboardMarkup, ParseMode};
use teloxide::utils::command::BotCommands;
use tracing::{error, warn};

pub type FlowDialogue = Dialogue<FlowState, InMemStorage<FlowState>>;

pub const CALLBACK_VERIFY_EMAIL: &str = "verify_email";
pub const CALLBACK_HELP: &str = "help";

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    #[command(description = "show the main menu.")]
    Start,
    #[command(description = "how verification works.")]
    Help,
    #[command(description = "abandon the current verification.")]
    Cancel,
}

pub fn schema() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(
            Update::filter_message()
                .filter(|msg: Message, limiter: ChatRateLimiter| {
                    !allow_message(&limiter, msg.chat.id)
                })
                .endpoint(handle_rate_limited),
        )
        .branch(
            Update::filter_callback_query()
                .enter_dialogue::<CallbackQuery, InMemStorage<FlowState>, FlowState>()
                .endpoint(handle_callback),
        )
        .branch(
            Update::filter_message()
                .enter_dialogue::<Message, InMemStorage<FlowState>, FlowState>()
                .branch(
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint(handle_command),
                )
                .branch(dptree::case![FlowState::AwaitingEmail].endpoint(handle_email))
                .branch(dptree::case![FlowState::AwaitingCode(entry)].endpoint(handle_code))
                .branch(dptree::case![FlowState::AwaitingPassword].endpoint(handle_password))
                .branch(dptree::case![FlowState::Idle].endpoint(handle_idle)),
        )
}

/// The identity the backend keys users on. Private chats are the only
/// supported surface, so the sender id and chat id normally coincide.
fn telegram_id(msg: &Message) -> String {
    msg.from
        .as_ref()
        .map(|u| u.id.to_string())
        .unwrap_or_else(|| msg.chat.id.to_string())
}

fn main_menu_keyboard(config: &BotConfig) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();
    if let Ok(login_url) = url::Url::parse(&format!("{}/auth/telegram", config.frontend_url)) {
        rows.push(vec![InlineKeyboardButton::url(
            "🔐 Login with Telegram",
            login_url,
        )]);
    }
    rows.push(vec![InlineKeyboardButton::callback(
        "🎓 Verify student e-mail",
        CALLBACK_VERIFY_EMAIL,
    )]);
    rows.push(vec![InlineKeyboardButton::callback(
        "ℹ️ Help",
        CALLBACK_HELP,
    )]);
    InlineKeyboardMarkup::new(rows)
}

fn help_text(config: &BotConfig) -> String {
    format!(
        "ℹ️ Send /start and pick \"Verify student e-mail\".\n\n\
         You will be asked for your student email address, then for the \
         6-digit code we send to it, and finally for a password for your \
         account.\n\nSupported domains: {}",
        config.student_domains.join(", ")
    )
}

fn email_prompt(config: &BotConfig) -> String {
    format!(
        "🎓 <b>Student E-mail Verification</b>\n\n\
         Please send your student email address.\n\
         Supported domains: {}",
        config.student_domains.join(", ")
    )
}

const CREATE_PASSWORD_PROMPT: &str = "✅ <b>Email verified successfully!</b>\n\n\
    🔐 <b>Create your password</b>\n\n\
    Please create a password for your StudentDeals account.\n\
    You will use this password to log in to the website.\n\n\
    Password must be at least 8 characters long.\n\n\
    Enter your password:";

async fn handle_rate_limited(bot: Bot, msg: Message) -> Result<(), teloxide::RequestError> {
    bot.send_message(msg.chat.id, "⏳ Too many requests. Please wait a moment.")
        .await?;
    Ok(())
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    dialogue: FlowDialogue,
    config: Arc<BotConfig>,
) -> Result<(), teloxide::RequestError> {
    match cmd {
        Command::Start => {
            reset_dialogue(&dialogue).await;
            bot.send_message(msg.chat.id, "👋 Welcome to StudentDeals!\n\nChoose an option:")
                .reply_markup(main_menu_keyboard(&config))
                .await?;
        }
        Command::Help => {
            bot.send_message(msg.chat.id, help_text(&config)).await?;
        }
        Command::Cancel => {
            reset_dialogue(&dialogue).await;
            bot.send_message(msg.chat.id, "Verification cancelled. Send /start to begin again.")
                .await?;
        }
    }
    Ok(())
}

async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    dialogue: FlowDialogue,
    config: Arc<BotConfig>,
) -> Result<(), teloxide::RequestError> {
    let Some(data) = q.data.as_deref() else {
        return Ok(());
    };

    bot.answer_callback_query(q.id.clone()).await?;

    let chat_id = q
        .message
        .as_ref()
        .map(|m| m.chat().id)
        .unwrap_or(ChatId(q.from.id.0 as i64));

    match data {
        CALLBACK_VERIFY_EMAIL => {
            if let Err(e) = dialogue.update(FlowState::AwaitingEmail).await {
                error!(error = %e, "Failed to update dialogue state");
                return Ok(());
            }
            bot.send_message(chat_id, email_prompt(&config))
                .parse_mode(ParseMode::Html)
                .await?;
        }
        CALLBACK_HELP => {
            bot.send_message(chat_id, help_text(&config)).await?;
        }
        _ => {}
    }
    Ok(())
}

async fn handle_idle(bot: Bot, msg: Message) -> Result<(), teloxide::RequestError> {
    if msg.text().is_none() {
        return Ok(());
    }
    bot.send_message(msg.chat.id, "Send /start to begin verification.")
        .await?;
    Ok(())
}

async fn handle_email(
    bot: Bot,
    msg: Message,
    dialogue: FlowDialogue,
    config: Arc<BotConfig>,
    api: ApiClient,
) -> Result<(), teloxide::RequestError> {
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let email = match flow::normalize_email(text, &config.student_domains) {
        Ok(email) => email,
        Err(EmailIssue::Malformed) => {
            bot.send_message(
                msg.chat.id,
                "❌ That does not look like a valid email address. Please try again.",
            )
            .await?;
            return Ok(());
        }
        Err(EmailIssue::NotStudentDomain) => {
            let list = config
                .student_domains
                .iter()
                .map(|d| format!("• {d}"))
                .collect::<Vec<_>>()
                .join("\n");
            bot.send_message(
                msg.chat.id,
                format!("❌ Email must be from a student domain:\n{list}"),
            )
            .await?;
            return Ok(());
        }
    };

    match api.start_email(&email, &telegram_id(&msg)).await {
        Ok(res) => {
            let entry = CodeEntry::new(res.verification_id, email.clone(), config.code_max_attempts);
            if let Err(e) = dialogue.update(FlowState::AwaitingCode(entry)).await {
                error!(error = %e, "Failed to update dialogue state");
                return Ok(());
            }
            bot.send_message(
                msg.chat.id,
                format!(
                    "✅ Verification code sent to: <b>{email}</b>\n\n\
                     Please enter the 6-digit code from your email:"
                ),
            )
            .parse_mode(ParseMode::Html)
            .await?;
        }
        Err(e) if e.status() == Some(StatusCode::TOO_MANY_REQUESTS) => {
            bot.send_message(
                msg.chat.id,
                "⏳ A code was sent to this address recently. Please wait a bit before requesting another.",
            )
            .await?;
        }
        Err(e) if e.is_rejection() => {
            bot.send_message(msg.chat.id, format!("❌ {e}")).await?;
        }
        Err(e) => {
            error!(error = %e, "start-email call failed");
            bot.send_message(
                msg.chat.id,
                "❌ Failed to start verification. Please try again later.",
            )
            .await?;
        }
    }
    Ok(())
}

async fn handle_code(
    bot: Bot,
    msg: Message,
    entry: CodeEntry,
    dialogue: FlowDialogue,
    config: Arc<BotConfig>,
    api: ApiClient,
) -> Result<(), teloxide::RequestError> {
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let Some(code) = flow::parse_code(text) else {
        bot.send_message(msg.chat.id, "❌ The code must be 6 digits. Please try again:")
            .await?;
        return Ok(());
    };

    let tid = telegram_id(&msg);
    let result = api.verify_email(&entry.verification_id, code, &tid).await;
    let outcome = match &result {
        Ok(res) if res.ok => CodeCheckOutcome::Valid {
            has_password: res.has_password,
        },
        Ok(_) => CodeCheckOutcome::Unavailable,
        Err(e) if e.is_rejection() => CodeCheckOutcome::Rejected,
        Err(_) => CodeCheckOutcome::Unavailable,
    };

    let next = flow::after_code_check(entry, &outcome);
    if let Err(e) = dialogue.update(next.clone()).await {
        error!(error = %e, "Failed to update dialogue state");
        return Ok(());
    }

    match (&outcome, &next) {
        (CodeCheckOutcome::Valid { has_password: true }, _) => {
            send_session_link(
                &bot,
                msg.chat.id,
                &api,
                &config,
                &tid,
                "✅ <b>Email verified successfully!</b>\n\n\
                 Click the button below to open StudentDeals:",
            )
            .await?;
        }
        (CodeCheckOutcome::Valid { has_password: false }, _) => {
            bot.send_message(msg.chat.id, CREATE_PASSWORD_PROMPT)
                .parse_mode(ParseMode::Html)
                .await?;
        }
        (CodeCheckOutcome::Rejected, FlowState::AwaitingCode(updated)) => {
            let reason = result
                .err()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Invalid code".to_string());
            bot.send_message(
                msg.chat.id,
                format!("❌ {reason}. {} attempts remaining.", updated.attempts_left),
            )
            .await?;
        }
        (CodeCheckOutcome::Rejected, _) => {
            bot.send_message(
                msg.chat.id,
                "❌ Too many failed attempts. Please start over with /start",
            )
            .await?;
        }
        (CodeCheckOutcome::Unavailable, _) => {
            if let Err(e) = &result {
                error!(error = %e, "verify-email call failed");
            }
            bot.send_message(
                msg.chat.id,
                "❌ Verification failed. Please try again later.",
            )
            .await?;
        }
    }
    Ok(())
}

async fn handle_password(
    bot: Bot,
    msg: Message,
    dialogue: FlowDialogue,
    config: Arc<BotConfig>,
    api: ApiClient,
) -> Result<(), teloxide::RequestError> {
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let Some(password) = flow::parse_password(text) else {
        bot.send_message(
            msg.chat.id,
            "❌ Password must be at least 8 characters long. Please try again:",
        )
        .await?;
        return Ok(());
    };

    let tid = telegram_id(&msg);
    match api.set_password(&tid, password).await {
        Ok(res) if res.ok => {
            reset_dialogue(&dialogue).await;
            send_session_link(
                &bot,
                msg.chat.id,
                &api,
                &config,
                &tid,
                "🎉 <b>Password created successfully!</b>\n\n\
                 Your account is now ready. You can use your email and password \
                 to log in to the website.\n\n\
                 Click the button below to open StudentDeals:",
            )
            .await?;
        }
        Ok(_) => {
            bot.send_message(msg.chat.id, "❌ Failed to set password. Please try again:")
                .await?;
        }
        Err(e) if e.is_rejection() => {
            bot.send_message(msg.chat.id, format!("❌ {e}")).await?;
        }
        Err(e) => {
            error!(error = %e, "set-password call failed");
            bot.send_message(msg.chat.id, "❌ Failed to set password. Please try again:")
                .await?;
        }
    }
    Ok(())
}

/// Issue a short-lived session link and send it as a URL button. Falls
/// back to the plain frontend URL when issuance fails, so a finished
/// verification never dead-ends.
async fn send_session_link(
    bot: &Bot,
    chat_id: ChatId,
    api: &ApiClient,
    config: &BotConfig,
    telegram_id: &str,
    heading: &str,
) -> Result<(), teloxide::RequestError> {
    let (label, link) = match api.issue_session(telegram_id).await {
        Ok(res) => ("🎉 OPEN", res.session_url),
        Err(e) => {
            warn!(error = %e, "Session issuance failed, using the plain frontend link");
            ("🎉 OPEN StudentDeals", config.frontend_url.clone())
        }
    };

    let request = bot.send_message(chat_id, heading).parse_mode(ParseMode::Html);
    match url::Url::parse(&link) {
        Ok(link) => {
            request
                .reply_markup(InlineKeyboardMarkup::new(vec![vec![
                    InlineKeyboardButton::url(label, link),
                ]]))
                .await?;
        }
        Err(e) => {
            warn!(error = %e, "Link did not parse, sending it as text");
            bot.send_message(chat_id, format!("{heading}\n\n{link}"))
                .parse_mode(ParseMode::Html)
                .await?;
        }
    }
    Ok(())
}

async fn reset_dialogue(dialogue: &FlowDialogue) {
    if let Err(e) = dialogue.reset().await {
        error!(error = %e, "Failed to reset dialogue state");
    }
}
