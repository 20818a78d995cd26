//! In-memory collaborators for unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration};
use chrono_tz::Tz;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::agents::{ChatMessage, LlmClient, LlmError};
use crate::app::transcript::ChatLogStore;
use crate::services::calendar::{
    CalendarEvent, CalendarService, EventDraft, EventEdit, EventTime, EventTiming, EventUpdates,
};
use crate::services::dates::localize;
use crate::services::profiles::{ProfileStore, UserProfile};
use crate::services::retrieval::{RecipeCandidate, RecipeIndex};
use crate::services::search::{ScrapedPage, SearchService, VideoResult, WebResult};
use crate::storage::LogMessage;

/// One recorded completion request
#[derive(Debug, Clone)]
pub struct LlmCall {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
}

/// Replays scripted replies in order; errors once the script runs out
#[derive(Default)]
pub struct FakeLlm {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    calls: Mutex<Vec<LlmCall>>,
}

impl FakeLlm {
    pub fn with_replies(replies: Vec<Result<String, LlmError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<LlmCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for FakeLlm {
    async fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String, LlmError> {
        self.calls.lock().unwrap().push(LlmCall {
            messages: messages.to_vec(),
            temperature,
        });
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Other("no scripted reply".to_string())))
    }
}

/// Fixed candidate set; every query sees the same recipes
#[derive(Default)]
pub struct FakeRecipeIndex {
    candidates: Vec<RecipeCandidate>,
    queries: Mutex<Vec<(String, usize)>>,
    failing: bool,
}

impl FakeRecipeIndex {
    pub fn new(mut candidates: Vec<RecipeCandidate>) -> Self {
        candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Self {
            candidates,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn queries(&self) -> Vec<(String, usize)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecipeIndex for FakeRecipeIndex {
    async fn query(&self, text: &str, limit: usize) -> Result<Vec<RecipeCandidate>> {
        self.queries.lock().unwrap().push((text.to_string(), limit));
        if self.failing {
            return Err(eyre!("vector store unavailable"));
        }
        Ok(self.candidates.iter().take(limit).cloned().collect())
    }
}

/// Canned search results keyed by nothing; pages listed in `pages` scrape
/// successfully, every other url fails
#[derive(Default)]
pub struct FakeSearch {
    pub web: Vec<WebResult>,
    pub videos: Vec<VideoResult>,
    pub pages: Vec<ScrapedPage>,
    pub failing: bool,
    pub(crate) queries: Mutex<Vec<String>>,
}

impl FakeSearch {
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchService for FakeSearch {
    async fn web_search(&self, query: &str) -> Result<Vec<WebResult>> {
        self.queries.lock().unwrap().push(query.to_string());
        if self.failing {
            return Err(eyre!("search quota exceeded"));
        }
        Ok(self.web.clone())
    }

    async fn video_search(&self, query: &str) -> Result<Vec<VideoResult>> {
        self.queries.lock().unwrap().push(query.to_string());
        if self.failing {
            return Err(eyre!("search quota exceeded"));
        }
        Ok(self.videos.clone())
    }

    async fn scrape_page(&self, url: &str) -> ScrapedPage {
        self.pages
            .iter()
            .find(|page| page.url() == url)
            .cloned()
            .unwrap_or_else(|| ScrapedPage::Failed {
                url: url.to_string(),
                error: "HTTP 403".to_string(),
            })
    }
}

/// Calendar kept in memory, ordered by start time like the real API
#[derive(Default)]
pub struct FakeCalendar {
    events: Mutex<Vec<CalendarEvent>>,
    created: Mutex<Vec<EventDraft>>,
    deleted: Mutex<Vec<String>>,
    list_calls: Mutex<Vec<(DateTime<Tz>, Option<DateTime<Tz>>)>>,
    failing: bool,
    missing_credentials: bool,
}

impl FakeCalendar {
    pub fn new(events: Vec<CalendarEvent>) -> Self {
        Self {
            events: Mutex::new(events),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Events are reachable but the user's tokens are gone
    pub fn without_credentials() -> Self {
        Self {
            missing_credentials: true,
            ..Self::default()
        }
    }

    pub fn created(&self) -> Vec<EventDraft> {
        self.created.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> Vec<(DateTime<Tz>, Option<DateTime<Tz>>)> {
        self.list_calls.lock().unwrap().clone()
    }

    fn check(&self) -> Result<()> {
        if self.failing {
            return Err(eyre!("calendar backend unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl CalendarService for FakeCalendar {
    async fn list_events(
        &self,
        _user_id: &str,
        start: DateTime<Tz>,
        end: Option<DateTime<Tz>>,
        max_results: usize,
    ) -> Result<Vec<CalendarEvent>> {
        self.list_calls.lock().unwrap().push((start, end));
        self.check()?;
        let tz = start.timezone();
        let mut events: Vec<(DateTime<Tz>, CalendarEvent)> = self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| {
                let begins = match event.timing(&tz)? {
                    EventTiming::Timed { start, .. } => start,
                    EventTiming::AllDay { start, .. } => localize(&tz, start.and_hms_opt(0, 0, 0)?)?,
                };
                Some((begins, event.clone()))
            })
            .filter(|(begins, _)| *begins >= start && end.is_none_or(|end| *begins < end))
            .collect();
        events.sort_by_key(|(begins, _)| *begins);
        Ok(events
            .into_iter()
            .take(max_results)
            .map(|(_, event)| event)
            .collect())
    }

    async fn create_event(&self, _user_id: &str, draft: &EventDraft) -> Result<Option<CalendarEvent>> {
        self.check()?;
        self.created.lock().unwrap().push(draft.clone());
        let event = CalendarEvent {
            id: format!("created-{}", self.created.lock().unwrap().len()),
            summary: draft.summary.clone(),
            start: EventTime::at(draft.start),
            end: EventTime::at(draft.end),
        };
        self.events.lock().unwrap().push(event.clone());
        Ok(Some(event))
    }

    async fn update_event(
        &self,
        _user_id: &str,
        event_id: &str,
        updates: &EventUpdates,
    ) -> Result<EventEdit> {
        self.check()?;
        let mut events = self.events.lock().unwrap();
        let Some(event) = events.iter_mut().find(|event| event.id == event_id) else {
            return Ok(EventEdit::NotFound);
        };
        if let Some(summary) = &updates.summary {
            event.summary = summary.clone();
        }
        if let Some(start) = updates.start {
            event.start = EventTime::at(start);
            if updates.end.is_none() {
                event.end = EventTime::at(start + Duration::hours(1));
            }
        }
        if let Some(end) = updates.end {
            event.end = EventTime::at(end);
        }
        Ok(EventEdit::Updated(event.clone()))
    }

    async fn delete_event(&self, _user_id: &str, event_id: &str) -> Result<bool> {
        self.check()?;
        let mut events = self.events.lock().unwrap();
        let before = events.len();
        events.retain(|event| event.id != event_id);
        if events.len() == before {
            return Ok(false);
        }
        self.deleted.lock().unwrap().push(event_id.to_string());
        Ok(true)
    }

    async fn connection_status(&self, _user_id: &str) -> Result<bool> {
        self.check()?;
        Ok(!self.missing_credentials)
    }
}

/// One user profile; the calendar flag can be flipped mid-test
#[derive(Default)]
pub struct FakeProfiles {
    profile: Mutex<Option<UserProfile>>,
    favorites: Mutex<Vec<String>>,
}

impl FakeProfiles {
    pub fn new(profile: UserProfile) -> Self {
        Self {
            profile: Mutex::new(Some(profile)),
            favorites: Mutex::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn set_calendar_connected(&self, connected: bool) {
        if let Some(profile) = self.profile.lock().unwrap().as_mut() {
            profile.calendar_connected = connected;
        }
    }

    pub fn favorites(&self) -> Vec<String> {
        self.favorites.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProfileStore for FakeProfiles {
    async fn load_profile(&self, _email: &str) -> Result<Option<UserProfile>> {
        let mut profile = self.profile.lock().unwrap().clone();
        if let Some(profile) = profile.as_mut() {
            for title in self.favorites.lock().unwrap().iter() {
                if !profile.favorite_recipes.contains(title) {
                    profile.favorite_recipes.push(title.clone());
                }
            }
        }
        Ok(profile)
    }

    async fn calendar_connected(&self, _user_id: &str) -> Result<bool> {
        Ok(self
            .profile
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|profile| profile.calendar_connected))
    }

    async fn add_favorite(&self, _user_id: &str, title: &str) -> Result<()> {
        self.favorites.lock().unwrap().push(title.to_string());
        Ok(())
    }
}

/// Records every flushed chat log
#[derive(Default)]
pub struct FakeChatLogs {
    saved: Mutex<Vec<(String, Vec<LogMessage>)>>,
}

impl FakeChatLogs {
    pub fn saved(&self) -> Vec<(String, Vec<LogMessage>)> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatLogStore for FakeChatLogs {
    async fn save_chat_log(&self, user_id: &str, messages: &[LogMessage]) -> Result<()> {
        self.saved
            .lock()
            .unwrap()
            .push((user_id.to_string(), messages.to_vec()));
        Ok(())
    }
}
