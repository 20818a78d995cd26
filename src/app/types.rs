use serde::{Deserialize, Serialize};

use crate::services::search::{VideoResult, WebResult};

/// Session-facing reply envelope, serialized with a `type` tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BotResponse {
    Response {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selected_title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        full_recipe: Option<String>,
        #[serde(rename = "sourceUrl", default, skip_serializing_if = "Option::is_none")]
        source_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        web_results: Option<Vec<WebResult>>,
    },
    Suggestions {
        message: String,
        suggestions: Vec<String>,
    },
    Video {
        title: String,
        videos: Vec<VideoResult>,
    },
    Web {
        title: String,
        results: Vec<WebResult>,
    },
    Error {
        message: String,
    },
    Reconnect {
        message: String,
    },
}

impl BotResponse {
    pub fn message(message: impl Into<String>) -> Self {
        BotResponse::Response {
            message: message.into(),
            selected_title: None,
            full_recipe: None,
            source_url: None,
            web_results: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        BotResponse::Error {
            message: message.into(),
        }
    }

    pub fn reconnect(message: impl Into<String>) -> Self {
        BotResponse::Reconnect {
            message: message.into(),
        }
    }

    /// Text shown to the user and written to the chat log
    pub fn display_text(&self) -> String {
        match self {
            BotResponse::Response { message, .. }
            | BotResponse::Error { message }
            | BotResponse::Reconnect { message } => message.clone(),
            BotResponse::Suggestions {
                message,
                suggestions,
            } => {
                let mut text = message.clone();
                for (index, suggestion) in suggestions.iter().enumerate() {
                    text.push_str(&format!("\n{}. {}", index + 1, suggestion));
                }
                text
            }
            BotResponse::Video { title, videos } => {
                let links: Vec<String> = videos
                    .iter()
                    .enumerate()
                    .map(|(i, video)| crate::agents::google::format_link(i, &video.title, &video.url))
                    .collect();
                if title.is_empty() {
                    links.join("\n\n")
                } else {
                    format!("{}\n\n{}", title, links.join("\n\n"))
                }
            }
            BotResponse::Web { title, results } => {
                let links: Vec<String> = results
                    .iter()
                    .enumerate()
                    .map(|(i, result)| crate::agents::google::format_link(i, &result.title, &result.link))
                    .collect();
                format!("{}\n\n{}", title, links.join("\n\n"))
            }
        }
    }
}

/// How replies are phrased for the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationMode {
    #[default]
    Text,
    Voice,
}

impl ConversationMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "text" | "نص" => Some(ConversationMode::Text),
            "voice" | "صوت" => Some(ConversationMode::Voice),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConversationMode::Text => "text",
            ConversationMode::Voice => "voice",
        }
    }
}
