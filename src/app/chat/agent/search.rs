use crate::agents::{ChatMessage, LlmClient, LlmError};
use crate::app::chat::agent::intent::IntentLabel;
use crate::app::chat::agent::json::extract_json_block;
use crate::app::prompts::{CLEANED_QUERY_PROMPT, VIDEO_SEARCH_PROMPT, WEB_SEARCH_PROMPT};

/// Whether a follow-up message is really a search request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanedQuery {
    Video(String),
    Web(String),
    None,
}

/// Model replies sometimes wrap the query in quotes or a label line
fn clean_query_line(reply: &str) -> String {
    let line = reply
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();
    let line = line
        .split_once(':')
        .filter(|(head, _)| head.chars().count() <= 20 && head.contains("بحث"))
        .map_or(line, |(_, tail)| tail);
    line.trim().trim_matches(['"', '\'', '«', '»']).trim().to_string()
}

/// YouTube keywords for the user's request.
///
/// `selected_title` pins the search to a recipe the user already chose.
pub async fn extract_video_query(
    llm: &dyn LlmClient,
    user_input: &str,
    selected_title: Option<&str>,
) -> Result<String, LlmError> {
    let mut system_prompt = VIDEO_SEARCH_PROMPT.to_string();
    if let Some(title) = selected_title.filter(|title| !title.trim().is_empty()) {
        system_prompt.push_str(&format!(
            "\n\nالوصفة المؤكدة المطلوب البحث عنها هي:\n\"{}\"\n",
            title
        ));
    }

    let messages = [
        ChatMessage::system(system_prompt),
        ChatMessage::user(format!("رسالة المستخدم: {}", user_input)),
    ];
    let reply = llm.complete(&messages, 0.0).await?;
    Ok(clean_query_line(&reply))
}

/// Google keywords for the user's request, using recent turns for follow-ups
pub async fn extract_web_query(
    llm: &dyn LlmClient,
    user_input: &str,
    context: &str,
) -> Result<String, LlmError> {
    let messages = [
        ChatMessage::system(WEB_SEARCH_PROMPT),
        ChatMessage::user(format!(
            "سياق المحادثة السابق:\n{}\n\nرسالة المستخدم:\n{}",
            context, user_input
        )),
    ];
    let reply = llm.complete(&messages, 0.0).await?;
    Ok(clean_query_line(&reply))
}

/// Decides whether `user_input` asks for a video or web search.
///
/// Only conversational labels are checked; every other label is `None`
/// without a model call. Unparseable replies also yield `None`.
pub async fn extract_cleaned_query(
    llm: &dyn LlmClient,
    user_input: &str,
    last_bot_response: &str,
    label: &IntentLabel,
) -> Result<CleanedQuery, LlmError> {
    if !label.is_conversational() {
        return Ok(CleanedQuery::None);
    }

    let messages = [
        ChatMessage::system(CLEANED_QUERY_PROMPT),
        ChatMessage::user(format!(
            "آخر رد من المساعد: {}\nرسالة المستخدم: {}",
            last_bot_response, user_input
        )),
    ];
    let reply = llm.complete(&messages, 0.0).await?;
    Ok(parse_cleaned_query(&reply))
}

pub fn parse_cleaned_query(reply: &str) -> CleanedQuery {
    let Some(value) = extract_json_block(reply) else {
        tracing::debug!(reply, "cleaned query reply was not JSON");
        return CleanedQuery::None;
    };
    let kind = value.get("type").and_then(|v| v.as_str()).unwrap_or_default();
    let Some(query) = value.get("query").and_then(|v| v.as_str()) else {
        return CleanedQuery::None;
    };
    let query = query.trim().to_string();

    match kind.trim().to_lowercase().as_str() {
        "video" if !query.is_empty() => CleanedQuery::Video(query),
        "web" if !query.is_empty() => CleanedQuery::Web(query),
        _ => CleanedQuery::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testing::FakeLlm;

    #[test]
    fn test_clean_query_line() {
        assert_eq!(clean_query_line("\n\"طريقة عمل الكشري\"\n"), "طريقة عمل الكشري");
        assert_eq!(clean_query_line("كلمات البحث: بسبوسة بالقشطة"), "بسبوسة بالقشطة");
        assert_eq!(clean_query_line("   "), "");
    }

    #[test]
    fn test_parse_cleaned_query_variants() {
        assert_eq!(
            parse_cleaned_query(r#"{"type": "web", "query": "أفضل مطاعم كشري"}"#),
            CleanedQuery::Web("أفضل مطاعم كشري".to_string())
        );
        assert_eq!(
            parse_cleaned_query("```json\n{\"type\": \"video\", \"query\": \"محشي\"}\n```"),
            CleanedQuery::Video("محشي".to_string())
        );
        assert_eq!(
            parse_cleaned_query(r#"{"type": "web", "query": ""}"#),
            CleanedQuery::None
        );
        assert_eq!(parse_cleaned_query(r#"{"type": "web"}"#), CleanedQuery::None);
        assert_eq!(parse_cleaned_query("مش عارف"), CleanedQuery::None);
    }

    #[tokio::test]
    async fn test_cleaned_query_skips_non_conversational_labels() {
        let llm = FakeLlm::with_replies(Vec::new());
        let result = extract_cleaned_query(
            &llm,
            "أيوه",
            "تحب أدورلك؟",
            &IntentLabel::Dish("كشري".to_string()),
        )
        .await
        .unwrap();
        assert_eq!(result, CleanedQuery::None);
        assert!(llm.calls().is_empty());
    }

    #[tokio::test]
    async fn test_video_extractor_pins_selected_title() {
        let llm = FakeLlm::with_replies(vec![Ok("طريقة عمل المسقعة".to_string())]);
        let query = extract_video_query(&llm, "عايز فيديو ليها", Some("مسقعة باللحمة"))
            .await
            .unwrap();
        assert_eq!(query, "طريقة عمل المسقعة");

        let calls = llm.calls();
        assert!(calls[0].messages[0]
            .content
            .contains("الوصفة المؤكدة المطلوب البحث عنها هي:\n\"مسقعة باللحمة\""));
        assert_eq!(calls[0].messages[1].content, "رسالة المستخدم: عايز فيديو ليها");
    }
}
