//! Per-chat message rate limiting.

use crate::config::BotRateLimitConfig;
use service_core::middleware::rate_limit::{create_keyed_rate_limiter, KeyedRateLimiter};
use teloxide::types::ChatId;

/// Rate limiter keyed by chat id.
pub type ChatRateLimiter = KeyedRateLimiter<i64>;

pub fn create_chat_rate_limiter(config: &BotRateLimitConfig) -> ChatRateLimiter {
    create_keyed_rate_limiter(config.messages, config.window_seconds)
}

/// True when this chat still has allowance in the current window.
pub fn allow_message(limiter: &ChatRateLimiter, chat_id: ChatId) -> bool {
    limiter.check_key(&chat_id.0).is_ok()
}
