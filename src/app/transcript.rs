use async_trait::async_trait;
use chrono::Local;
use color_eyre::Result;

use crate::agents::google::format_link;
use crate::app::types::BotResponse;
use crate::storage::{LogMessage, StorageManager};

const USER_ROLE: &str = "user";
const BOT_ROLE: &str = "bot";

/// Where finished chat logs are written
#[async_trait]
pub trait ChatLogStore: Send + Sync {
    async fn save_chat_log(&self, user_id: &str, messages: &[LogMessage]) -> Result<()>;
}

#[async_trait]
impl ChatLogStore for StorageManager {
    async fn save_chat_log(&self, user_id: &str, messages: &[LogMessage]) -> Result<()> {
        StorageManager::save_chat_log(self, user_id, messages).await
    }
}

/// Chat log collected during a session and flushed when it ends.
///
/// A question answered with suggestions is held back until the user
/// picks an option, so the log reads question, choice, answer.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<LogMessage>,
    pending_query: Option<String>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn entries(&self) -> &[LogMessage] {
        &self.entries
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drains the collected entries, e.g. before a flush
    pub fn take(&mut self) -> Vec<LogMessage> {
        self.pending_query = None;
        std::mem::take(&mut self.entries)
    }

    /// Records a regular turn
    pub fn record_turn(&mut self, input: &str, response: &BotResponse) {
        if let BotResponse::Suggestions { .. } = response {
            self.pending_query = Some(input.to_string());
            return;
        }
        self.push(USER_ROLE, input);
        self.record_bot(response);
    }

    /// Records the reply to a pending suggestion list
    pub fn record_choice(&mut self, choice: &str, response: &BotResponse) {
        if let Some(query) = self.pending_query.take() {
            self.push(USER_ROLE, &query);
        }
        self.push(USER_ROLE, choice);
        if let BotResponse::Response { message, .. } = response {
            self.push(BOT_ROLE, message);
        }
    }

    fn record_bot(&mut self, response: &BotResponse) {
        match response {
            BotResponse::Response { message, .. } | BotResponse::Error { message } => {
                self.push(BOT_ROLE, message);
            }
            BotResponse::Video { title, videos } => {
                let mut text = format!("📹 تم العثور على فيديوهات لـ **{}**:\n", title);
                let links: Vec<String> = videos
                    .iter()
                    .enumerate()
                    .map(|(index, video)| format_link(index, &video.title, &video.url))
                    .collect();
                text.push_str(&links.join("\n"));
                self.push(BOT_ROLE, &text);
            }
            BotResponse::Suggestions { .. }
            | BotResponse::Web { .. }
            | BotResponse::Reconnect { .. } => {}
        }
    }

    fn push(&mut self, role: &str, content: &str) {
        self.entries.push(LogMessage {
            role: role.to_string(),
            content: content.to_string(),
            timestamp: Local::now().to_rfc3339(),
        });
    }
}
