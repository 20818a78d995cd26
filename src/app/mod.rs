pub mod chat;
pub mod memory;
pub mod prompts;
pub mod system_prompt;
pub mod transcript;
pub mod types;

#[cfg(test)]
pub mod testing;

pub use chat::Session;
pub use types::{BotResponse, ConversationMode};

use chrono_tz::Tz;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::agents::LlmClient;
use crate::config::Config;
use crate::services::calendar::CalendarService;
use crate::services::dates::parse_timezone;
use crate::services::profiles::{ProfileStore, UserLocks};
use crate::services::retrieval::RecipeIndex;
use crate::services::search::SearchService;
use crate::storage::LogMessage;

/// External collaborators shared by every session
#[derive(Clone)]
pub struct Services {
    pub llm: Arc<dyn LlmClient>,
    pub recipes: Arc<dyn RecipeIndex>,
    pub search: Arc<dyn SearchService>,
    /// `None` when no calendar backend is configured
    pub calendar: Option<Arc<dyn CalendarService>>,
    pub profiles: Arc<dyn ProfileStore>,
    pub locks: UserLocks,
}

/// Per-session tunables resolved from [`Config`]
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub timezone: Tz,
    pub temperature: f32,
    /// Maximum number of messages kept in memory
    pub memory_capacity: usize,
    /// Exchanges shown to the intent classifier
    pub context_turns: usize,
    pub kb_threshold: f32,
    pub auto_select_distance: Option<f32>,
    pub llm_timeout: Duration,
    pub search_timeout: Duration,
    pub calendar_timeout: Duration,
    pub retrieval_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::Africa::Cairo,
            temperature: 0.7,
            memory_capacity: 12,
            context_turns: 3,
            kb_threshold: 0.35,
            auto_select_distance: None,
            llm_timeout: Duration::from_secs(60),
            search_timeout: Duration::from_secs(10),
            calendar_timeout: Duration::from_secs(15),
            retrieval_timeout: Duration::from_secs(20),
        }
    }
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            timezone: parse_timezone(&config.calendar.timezone)?,
            temperature: config.llm.temperature,
            memory_capacity: config.session.max_memory_turns,
            context_turns: config.session.context_turns,
            kb_threshold: config.session.kb_threshold,
            auto_select_distance: config.session.auto_select_distance,
            llm_timeout: Duration::from_secs(config.llm.timeout_secs),
            search_timeout: Duration::from_secs(config.search.timeout_secs),
            calendar_timeout: Duration::from_secs(config.calendar.timeout_secs),
            retrieval_timeout: Duration::from_secs(config.session.retrieval_timeout_secs),
        })
    }
}

pub type SessionHandle = Arc<Mutex<Session>>;

/// Live sessions keyed by a process-unique id.
///
/// Each session sits behind its own mutex, so a transport that locks the
/// handle per inbound message processes one message at a time per session
/// while separate sessions proceed independently.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<u64, SessionHandle>>>,
    next_id: Arc<AtomicU64>,
    settings: SessionSettings,
    services: Services,
}

impl SessionRegistry {
    pub fn new(settings: SessionSettings, services: Services) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            settings,
            services,
        }
    }

    /// Starts a session for `email`; `None` when the user is unknown
    pub async fn open(&self, email: &str, mode: ConversationMode) -> Result<Option<u64>> {
        let Some(session) =
            Session::start(email, mode, self.settings.clone(), self.services.clone()).await?
        else {
            return Ok(None);
        };
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.sessions
            .lock()
            .await
            .insert(id, Arc::new(Mutex::new(session)));
        tracing::debug!(session_id = id, "session registered");
        Ok(Some(id))
    }

    pub async fn get(&self, id: u64) -> Option<SessionHandle> {
        self.sessions.lock().await.get(&id).cloned()
    }

    /// Rebuilds the session from a freshly loaded profile and hands back the
    /// chat log collected so far
    pub async fn reset(&self, id: u64) -> Result<Vec<LogMessage>> {
        let handle = self
            .get(id)
            .await
            .ok_or_else(|| eyre!("no session with id {}", id))?;
        let mut session = handle.lock().await;
        let transcript = session.take_transcript();
        let email = session.email().to_string();
        let mode = session.mode();

        let fresh =
            Session::start(&email, mode, self.settings.clone(), self.services.clone()).await?;
        match fresh {
            Some(fresh) => *session = fresh,
            None => {
                tracing::warn!(session_id = id, "profile vanished, clearing session in place");
                session.reset();
            }
        }
        Ok(transcript)
    }

    /// Drops the session, returning its unflushed chat log
    pub async fn dispose(&self, id: u64) -> Option<Vec<LogMessage>> {
        let handle = self.sessions.lock().await.remove(&id)?;
        let transcript = handle.lock().await.take_transcript();
        tracing::debug!(session_id = id, "session disposed");
        Some(transcript)
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::LlmError;
    use crate::app::testing::{FakeLlm, FakeProfiles, FakeRecipeIndex, FakeSearch};
    use crate::services::profiles::UserProfile;

    fn services(llm: FakeLlm, profiles: FakeProfiles) -> Services {
        Services {
            llm: Arc::new(llm),
            recipes: Arc::new(FakeRecipeIndex::new(Vec::new())),
            search: Arc::new(FakeSearch::default()),
            calendar: None,
            profiles: Arc::new(profiles),
            locks: UserLocks::new(),
        }
    }

    fn known_user() -> FakeProfiles {
        FakeProfiles::new(UserProfile {
            user_id: "u7".to_string(),
            name: "أحمد".to_string(),
            ..UserProfile::default()
        })
    }

    fn chit_chat() -> Vec<Result<String, LlmError>> {
        vec![
            Ok("Not Food Related.".to_string()),
            Ok("أهلاً يا أحمد!".to_string()),
        ]
    }

    #[test]
    fn test_settings_from_default_config() {
        let settings = SessionSettings::from_config(&Config::default()).unwrap();
        assert_eq!(settings.timezone, chrono_tz::Africa::Cairo);
        assert_eq!(settings.memory_capacity, 12);
        assert_eq!(settings.llm_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_settings_reject_unknown_timezone() {
        let mut config = Config::default();
        config.calendar.timezone = "Mars/Olympus".to_string();
        assert!(SessionSettings::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_open_unknown_user() {
        let registry = SessionRegistry::new(
            SessionSettings::default(),
            services(FakeLlm::default(), FakeProfiles::empty()),
        );
        let id = registry
            .open("ghost@example.com", ConversationMode::Text)
            .await
            .unwrap();
        assert!(id.is_none());
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn test_open_assigns_distinct_ids() {
        let registry = SessionRegistry::new(
            SessionSettings::default(),
            services(FakeLlm::default(), known_user()),
        );
        let first = registry.open("a@example.com", ConversationMode::Text).await.unwrap();
        let second = registry.open("a@example.com", ConversationMode::Voice).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(registry.len().await, 2);

        let handle = registry.get(second.unwrap()).await.unwrap();
        assert_eq!(handle.lock().await.mode(), ConversationMode::Voice);
    }

    #[tokio::test]
    async fn test_reset_returns_log_and_clears_memory() {
        let registry = SessionRegistry::new(
            SessionSettings::default(),
            services(FakeLlm::with_replies(chit_chat()), known_user()),
        );
        let id = registry
            .open("a@example.com", ConversationMode::Text)
            .await
            .unwrap()
            .unwrap();
        let handle = registry.get(id).await.unwrap();
        let reply = handle.lock().await.handle_incoming("ازيك").await;
        assert_eq!(reply, BotResponse::message("أهلاً يا أحمد!"));

        let log = registry.reset(id).await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].role, "user");
        assert_eq!(log[1].content, "أهلاً يا أحمد!");

        let session = handle.lock().await;
        assert!(session.memory().is_empty());
        assert_eq!(session.user_id(), "u7");
    }

    #[tokio::test]
    async fn test_reset_unknown_session() {
        let registry = SessionRegistry::new(
            SessionSettings::default(),
            services(FakeLlm::default(), known_user()),
        );
        assert!(registry.reset(42).await.is_err());
    }

    #[tokio::test]
    async fn test_dispose_removes_session() {
        let registry = SessionRegistry::new(
            SessionSettings::default(),
            services(FakeLlm::with_replies(chit_chat()), known_user()),
        );
        let id = registry
            .open("a@example.com", ConversationMode::Text)
            .await
            .unwrap()
            .unwrap();
        let handle = registry.get(id).await.unwrap();
        handle.lock().await.handle_incoming("ازيك").await;

        let log = registry.dispose(id).await.unwrap();
        assert_eq!(log.len(), 2);
        assert!(registry.get(id).await.is_none());
        assert!(registry.dispose(id).await.is_none());
    }
}
