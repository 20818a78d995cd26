//! User-facing replies for failed model calls.

use crate::agents::LlmError;
use crate::app::types::BotResponse;

pub const MESSAGE_TOO_LONG: &str =
    "⚠️ Hmm, your message is too long. Try shortening it a little and resend.";
pub const OVERLOADED: &str =
    "🚫 I'm a bit overloaded right now. Please wait a few seconds and try again.";
pub const UNEXPECTED: &str = "❌ Unexpected Error. Please try again later.";
pub const CONNECTION_LOST: &str = "🌐 Lost connection to the assistant. Please reconnect.";
pub const EMPTY_REPLY: &str = "⚠️ Oops! Something went wrong! Please try again in a few seconds.";
pub const SLOW_REPLY: &str = "⏳ المساعد اتأخر في الرد. جرب تاني كمان شوية.";

pub const CLASSIFY_CONNECTION: &str =
    "🚫 Oops! Connection error. Please try again in a few seconds.";
pub const CLASSIFY_RATE_LIMIT: &str = "⏱️ Slow down a bit! You’ve hit the request limit.";
pub const CLASSIFY_UNEXPECTED: &str = "❌ Unexpected error. Please try again later.";

/// Maps a failed reply generation
pub fn generation_error(error: &LlmError) -> BotResponse {
    tracing::warn!(%error, "reply generation failed");
    match error {
        LlmError::PayloadTooLarge(_) => BotResponse::error(MESSAGE_TOO_LONG),
        LlmError::RateLimited(_) => BotResponse::error(OVERLOADED),
        LlmError::ConnectionFailed(_) => BotResponse::reconnect(CONNECTION_LOST),
        LlmError::Timeout(_) => BotResponse::error(SLOW_REPLY),
        LlmError::Other(_) => BotResponse::error(UNEXPECTED),
    }
}

/// Maps a failed intent classification
pub fn classification_error(error: &LlmError) -> BotResponse {
    tracing::warn!(%error, "intent classification failed");
    match error {
        LlmError::ConnectionFailed(_) => BotResponse::reconnect(CLASSIFY_CONNECTION),
        LlmError::RateLimited(_) => BotResponse::error(CLASSIFY_RATE_LIMIT),
        LlmError::PayloadTooLarge(_) => BotResponse::error(MESSAGE_TOO_LONG),
        LlmError::Timeout(_) => BotResponse::error(SLOW_REPLY),
        LlmError::Other(_) => BotResponse::error(CLASSIFY_UNEXPECTED),
    }
}
