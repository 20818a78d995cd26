use crate::agents::{ChatMessage, LlmClient, LlmError};
use crate::app::prompts::INTENT_SYSTEM_PROMPT;

/// Routing label for one user turn.
///
/// The classifier is free-form, so anything that is not one of the fixed
/// labels is kept as a dish name and sent to retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentLabel {
    NotFoodRelated,
    FoodGeneralized,
    ChatHistory,
    VideoSearch,
    WebSearch,
    CalendarEvent,
    Dish(String),
}

impl IntentLabel {
    pub fn parse(raw: &str) -> Self {
        let normalized = normalize_label(raw);
        match normalized.as_str() {
            "not food related" => IntentLabel::NotFoodRelated,
            "food generalized" => IntentLabel::FoodGeneralized,
            "respond based on chat history" => IntentLabel::ChatHistory,
            "video search" => IntentLabel::VideoSearch,
            "web search" => IntentLabel::WebSearch,
            "google calendar event" => IntentLabel::CalendarEvent,
            _ => IntentLabel::Dish(clean_dish(raw)),
        }
    }

    /// Labels answered straight from the model without retrieval
    pub fn is_conversational(&self) -> bool {
        matches!(
            self,
            IntentLabel::NotFoodRelated | IntentLabel::FoodGeneralized | IntentLabel::ChatHistory
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            IntentLabel::NotFoodRelated => "not food related",
            IntentLabel::FoodGeneralized => "food generalized",
            IntentLabel::ChatHistory => "respond based on chat history",
            IntentLabel::VideoSearch => "video search",
            IntentLabel::WebSearch => "web search",
            IntentLabel::CalendarEvent => "google calendar event",
            IntentLabel::Dish(name) => name,
        }
    }
}

const QUOTES: &[char] = &['"', '\'', '`', '«', '»', '“', '”'];
const TRAILING_PUNCTUATION: &[char] = &['.', '!', '?', '؟', '،', ',', ':', ';', '؛'];

/// Lowercase, unquoted, single-spaced form used for label comparison
pub fn normalize_label(raw: &str) -> String {
    raw.trim()
        .trim_matches(QUOTES)
        .trim()
        .trim_end_matches(TRAILING_PUNCTUATION)
        .trim_matches(QUOTES)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Dish names keep their case but lose quotes and stray punctuation
fn clean_dish(raw: &str) -> String {
    raw.trim()
        .trim_matches(QUOTES)
        .trim()
        .trim_end_matches(TRAILING_PUNCTUATION)
        .trim_matches(QUOTES)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn classifier_input(query: &str, context: &str) -> String {
    format!(
        "سياق المحادثة السابق:\n{}\n\nرسالة المستخدم الحالية:\n{}",
        context, query
    )
}

/// Asks the model for the raw routing label.
///
/// The label is returned as the model wrote it (trimmed); it is not checked
/// against the known set.
pub async fn classify(llm: &dyn LlmClient, query: &str, context: &str) -> Result<String, LlmError> {
    let messages = [
        ChatMessage::system(INTENT_SYSTEM_PROMPT),
        ChatMessage::user(classifier_input(query, context)),
    ];
    let label = llm.complete(&messages, 0.0).await?;
    tracing::debug!(label = %label, "intent classified");
    Ok(label.trim().to_string())
}
