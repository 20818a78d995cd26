pub mod agent;
pub mod calendar;
pub mod response;
pub mod suggestions;

use chrono::DateTime;
use chrono_tz::Tz;
use color_eyre::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::agents::{ChatMessage, LlmError};
use crate::app::memory::ConversationMemory;
use crate::app::system_prompt::render_system_prompt;
use crate::app::transcript::Transcript;
use crate::app::types::{BotResponse, ConversationMode};
use crate::app::{Services, SessionSettings};
use crate::services::dates::now_in;
use crate::services::profiles::UserProfile;
use crate::services::retrieval::{is_in_knowledge_base, search_recipes};
use crate::services::search::{ScrapedPage, WebResult};
use crate::services::with_timeout;
use crate::storage::LogMessage;

use agent::calendar::parse_calendar_request;
use agent::intent::{IntentLabel, classify};
use agent::search::{CleanedQuery, extract_cleaned_query, extract_video_query, extract_web_query};
use response::{EMPTY_REPLY, classification_error, generation_error};
use suggestions::{CHOOSE_PROMPT, Choice, SuggestionState, parse_choice_number};

const PICK_A_NUMBER: &str = "من فضلك اختر رقم من الاختيارات الموجودة.";
const INVALID_CHOICE: &str = "اختيار غير صالح. حاول رقم تاني.";
const NOTHING_CHOSEN: &str = "لم يتم اختيار أي وصفة. يمكنك التحدث بحرية الآن.";
const NO_RECIPES_FOUND: &str = "لم أتمكن من العثور على وصفات مناسبة.";
const RETRIEVAL_FAILED: &str = "🚫 حصلت مشكلة وأنا بدور على الوصفات. جرب تاني كمان شوية.";
const VIDEO_QUERY_FAILED: &str =
    "🚫 حصلت مشكلة وأنا بحاول أفهم الفيديو المطلوب. جرب تبعته بصيغة تانية.";
const NO_VIDEOS: &str = "⚠️ مش لاقيت فيديو مناسب للطلب ده دلوقتي.";
const NO_WEB_RESULTS: &str = "⚠️ ملقتش نتائج بحث دلوقتي. جرّب صيغة تانية؟";
const WEB_FAILED: &str = "🚫 حصلت مشكلة في البحث على الإنترنت أو استخلاص المحتوى.";
const CALENDAR_DISCONNECTED: &str =
    "تقويم جوجل غير متصل. يرجى توصيله أولاً من صفحة الإعدادات للمساعدة في المواعيد.";
const CALENDAR_FAILED: &str = "🚫 حصلت مشكلة وأنا بحاول أتعامل مع التقويم بتاعك.";

const WEB_OFFER_MARKERS: [&str; 2] = ["web search", "🌐"];
/// Only the best few search hits are fetched in full
const PAGES_TO_SCRAPE: usize = 2;
const SCRAPE_FALLBACK_NOTE: &str = " (Scraping failed, showing snippet.)";

/// Runs a model call under the completion deadline
async fn with_llm_deadline<T, F>(budget: Duration, call: F) -> Result<T, LlmError>
where
    F: Future<Output = Result<T, LlmError>>,
{
    match tokio::time::timeout(budget, call).await {
        Ok(result) => result,
        Err(_) => Err(LlmError::Timeout(budget.as_secs())),
    }
}

/// One user's conversation: memory, pending suggestions and prompt state.
///
/// Every inbound message goes through [`Session::handle_incoming`] and
/// always produces a [`BotResponse`]; failures are turned into messages.
pub struct Session {
    user_id: String,
    email: String,
    profile: UserProfile,
    mode: ConversationMode,
    memory: ConversationMemory,
    suggestions: Option<SuggestionState>,
    selected_title: Option<String>,
    system_prompt: String,
    settings: SessionSettings,
    services: Services,
    transcript: Transcript,
}

impl Session {
    /// Loads the profile for `email`; `None` when no such user exists
    pub async fn start(
        email: &str,
        mode: ConversationMode,
        settings: SessionSettings,
        services: Services,
    ) -> Result<Option<Self>> {
        let Some(profile) = services.profiles.load_profile(email).await? else {
            tracing::info!(email, "no profile for session");
            return Ok(None);
        };
        let system_prompt = render_system_prompt(&profile, mode, &now_in(settings.timezone));
        tracing::info!(user_id = %profile.user_id, mode = mode.as_str(), "session started");

        Ok(Some(Self {
            user_id: profile.user_id.clone(),
            email: email.to_string(),
            profile,
            mode,
            memory: ConversationMemory::new(settings.memory_capacity),
            suggestions: None,
            selected_title: None,
            system_prompt,
            settings,
            services,
            transcript: Transcript::new(),
        }))
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    pub fn mode(&self) -> ConversationMode {
        self.mode
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    #[cfg(test)]
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn selected_title(&self) -> Option<&str> {
        self.selected_title.as_deref()
    }

    pub fn is_awaiting_choice(&self) -> bool {
        self.suggestions.is_some()
    }

    pub fn set_mode(&mut self, mode: ConversationMode) {
        self.mode = mode;
        self.refresh_prompt();
    }

    /// Forgets the conversation but keeps the user and mode
    pub fn reset(&mut self) {
        self.memory.clear();
        self.suggestions = None;
        self.selected_title = None;
        self.refresh_prompt();
    }

    /// Chat log entries collected since the last call
    pub fn take_transcript(&mut self) -> Vec<LogMessage> {
        self.transcript.take()
    }

    /// Stores the currently selected recipe as a favorite and reloads the
    /// profile so the prompt lists it
    pub async fn add_favorite(&mut self) -> Result<Option<String>> {
        let Some(title) = self.selected_title.clone() else {
            return Ok(None);
        };

        let lock = self.services.locks.lock_for(&self.user_id);
        let guard = lock.lock().await;
        self.services.profiles.add_favorite(&self.user_id, &title).await?;
        let reloaded = self.services.profiles.load_profile(&self.email).await?;
        drop(guard);

        if let Some(profile) = reloaded {
            self.profile = profile;
        }
        self.refresh_prompt();
        tracing::info!(user_id = %self.user_id, %title, "favorite added");
        Ok(Some(title))
    }

    /// Entry point for every user message
    pub async fn handle_incoming(&mut self, text: &str) -> BotResponse {
        let input = text.trim();

        if self.suggestions.is_some() {
            let response = match parse_choice_number(input) {
                Some(number) => match number.checked_sub(1) {
                    Some(index) => self.handle_choice(index).await,
                    None => BotResponse::error(INVALID_CHOICE),
                },
                None => BotResponse::error(PICK_A_NUMBER),
            };
            if self.suggestions.is_none() {
                self.transcript.record_choice(input, &response);
            }
            return response;
        }

        let response = self.handle_message(input).await;
        self.transcript.record_turn(input, &response);
        response
    }

    /// Resolves a 0-based pick from the pending suggestion list
    pub async fn handle_choice(&mut self, index: usize) -> BotResponse {
        let Some(state) = self.suggestions.as_ref() else {
            return BotResponse::error(INVALID_CHOICE);
        };
        let picked = match state.resolve(index) {
            Choice::Invalid => {
                tracing::debug!(index, "choice out of range");
                return BotResponse::error(INVALID_CHOICE);
            }
            Choice::NoneOfThese => None,
            Choice::Recipe { title, document } => Some((title.to_string(), document.to_string())),
        };
        let question = state.original_question().to_string();
        self.suggestions = None;

        match picked {
            Some((title, document)) => self.deliver_recipe(&question, title, document).await,
            None => self.respond(&question, NOTHING_CHOSEN).await,
        }
    }

    async fn handle_message(&mut self, input: &str) -> BotResponse {
        let context = self.memory.context_string(self.settings.context_turns);
        let classified = with_llm_deadline(
            self.settings.llm_timeout,
            classify(self.services.llm.as_ref(), input, &context),
        )
        .await;
        let label = match classified {
            Ok(raw) => IntentLabel::parse(&raw),
            Err(error) => return classification_error(&error),
        };
        tracing::info!(label = label.as_str(), "routing message");

        match &label {
            IntentLabel::VideoSearch => return self.handle_video(input).await,
            IntentLabel::WebSearch => return self.handle_web(input, None).await,
            IntentLabel::CalendarEvent => return self.handle_calendar(input).await,
            IntentLabel::NotFoodRelated
            | IntentLabel::FoodGeneralized
            | IntentLabel::ChatHistory
            | IntentLabel::Dish(_) => {}
        }

        if self.offered_web_search() {
            if !label.is_conversational() {
                return self.handle_web(input, None).await;
            }
            let last_bot = self.memory.last_assistant().unwrap_or_default().to_string();
            let cleaned = with_llm_deadline(
                self.settings.llm_timeout,
                extract_cleaned_query(self.services.llm.as_ref(), input, &last_bot, &label),
            )
            .await;
            match cleaned {
                Ok(CleanedQuery::Web(query)) => return self.handle_web(input, Some(query)).await,
                Ok(CleanedQuery::Video(query)) => return self.search_videos(&query).await,
                Ok(CleanedQuery::None) => {}
                Err(error) => tracing::warn!(%error, "follow-up query extraction failed"),
            }
        }

        match label {
            IntentLabel::Dish(name) => self.handle_dish(input, &name).await,
            conversational => {
                self.selected_title = None;
                self.respond(input, conversational.as_str()).await
            }
        }
    }

    fn offered_web_search(&self) -> bool {
        self.memory.last_assistant().is_some_and(|reply| {
            let lowered = reply.to_lowercase();
            WEB_OFFER_MARKERS.iter().any(|marker| lowered.contains(marker))
        })
    }

    async fn handle_dish(&mut self, input: &str, name: &str) -> BotResponse {
        let index = Arc::clone(&self.services.recipes);
        let budget = self.settings.retrieval_timeout;

        let known = with_timeout(
            "knowledge base check",
            budget,
            is_in_knowledge_base(index.as_ref(), name, self.settings.kb_threshold),
        )
        .await;
        match known {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(dish = name, "not in knowledge base, generating freely");
                let request = format!("هاتلي وصفة {} بالتفصيل", name);
                return self.respond(input, &request).await;
            }
            Err(error) => {
                tracing::warn!(%error, dish = name, "knowledge base check failed");
                return BotResponse::error(RETRIEVAL_FAILED);
            }
        }

        let candidates =
            match with_timeout("recipe retrieval", budget, search_recipes(index.as_ref(), name)).await {
                Ok(candidates) => candidates,
                Err(error) => {
                    tracing::warn!(%error, dish = name, "recipe retrieval failed");
                    return BotResponse::error(RETRIEVAL_FAILED);
                }
            };

        if let (Some(limit), Some(best)) = (self.settings.auto_select_distance, candidates.first()) {
            if best.distance <= limit {
                let (title, document) = (best.title.clone(), best.document.clone());
                tracing::info!(%title, distance = best.distance, "auto-selecting close match");
                return self.deliver_recipe(input, title, document).await;
            }
        }

        let Some(state) = SuggestionState::new(input, candidates) else {
            return self.respond(input, NO_RECIPES_FOUND).await;
        };
        let suggestions = state.options();
        self.suggestions = Some(state);
        BotResponse::Suggestions {
            message: CHOOSE_PROMPT.to_string(),
            suggestions,
        }
    }

    async fn deliver_recipe(&mut self, question: &str, title: String, document: String) -> BotResponse {
        self.selected_title = Some(title.clone());
        match self.generate(question, &document).await {
            Ok(message) => BotResponse::Response {
                message,
                selected_title: Some(title),
                full_recipe: Some(document),
                source_url: None,
                web_results: None,
            },
            Err(response) => response,
        }
    }

    async fn handle_video(&mut self, input: &str) -> BotResponse {
        let context = self
            .selected_title
            .clone()
            .or_else(|| self.memory.last_assistant().map(str::to_string));
        let extracted = with_llm_deadline(
            self.settings.llm_timeout,
            extract_video_query(self.services.llm.as_ref(), input, context.as_deref()),
        )
        .await;
        let query = match extracted {
            Ok(query) if !query.is_empty() => query,
            Ok(_) => input.to_string(),
            Err(error) => {
                tracing::warn!(%error, "video query extraction failed");
                return BotResponse::error(VIDEO_QUERY_FAILED);
            }
        };
        self.search_videos(&query).await
    }

    async fn search_videos(&mut self, query: &str) -> BotResponse {
        self.selected_title = None;
        let found = with_timeout(
            "video search",
            self.settings.search_timeout,
            self.services.search.video_search(query),
        )
        .await;
        match found {
            Ok(videos) if videos.is_empty() => BotResponse::error(NO_VIDEOS),
            Ok(videos) => BotResponse::Video {
                title: query.to_string(),
                videos,
            },
            Err(error) => {
                tracing::warn!(%error, query, "video search failed");
                BotResponse::error(VIDEO_QUERY_FAILED)
            }
        }
    }

    /// Searches the web, reads the top pages and answers from them.
    ///
    /// When the answer itself cannot be generated the raw results are
    /// returned instead.
    async fn handle_web(&mut self, input: &str, query: Option<String>) -> BotResponse {
        let query = match query {
            Some(query) => query,
            None => {
                let context = self.memory.context_string(self.settings.context_turns);
                let extracted = with_llm_deadline(
                    self.settings.llm_timeout,
                    extract_web_query(self.services.llm.as_ref(), input, &context),
                )
                .await;
                match extracted {
                    Ok(query) if !query.is_empty() => query,
                    Ok(_) => input.to_string(),
                    Err(error) => {
                        tracing::warn!(%error, "web query extraction failed");
                        return BotResponse::error(WEB_FAILED);
                    }
                }
            }
        };

        let found = with_timeout(
            "web search",
            self.settings.search_timeout,
            self.services.search.web_search(&query),
        )
        .await;
        let results = match found {
            Ok(results) if results.is_empty() => return BotResponse::error(NO_WEB_RESULTS),
            Ok(results) => results,
            Err(error) => {
                tracing::warn!(%error, %query, "web search failed");
                return BotResponse::error(WEB_FAILED);
            }
        };

        let (context, source_url) = self.gather_pages(&results).await;
        match self.generate(input, &context).await {
            Ok(message) => BotResponse::Response {
                message,
                selected_title: None,
                full_recipe: None,
                source_url,
                web_results: Some(results),
            },
            Err(response) => {
                tracing::info!(?response, "answer from web pages failed, returning raw results");
                BotResponse::Web {
                    title: query,
                    results,
                }
            }
        }
    }

    async fn gather_pages(&self, results: &[WebResult]) -> (String, Option<String>) {
        let mut blocks = vec!["Here's information gathered from web pages:".to_string()];
        let mut source_url = None;

        for result in results.iter().take(PAGES_TO_SCRAPE) {
            match self.services.search.scrape_page(&result.link).await {
                ScrapedPage::Success {
                    url,
                    title,
                    content,
                } => {
                    tracing::debug!(%url, "page scraped");
                    blocks.push(format!("Source: {}\nTitle: {}\nContent:\n{}", url, title, content));
                    source_url.get_or_insert(url);
                }
                ScrapedPage::Failed { url, error } => {
                    tracing::debug!(%url, %error, "scrape failed, using snippet");
                    blocks.push(format!(
                        "Source: {}\nTitle: {}\nContent:\n{}{}",
                        result.link, result.title, result.snippet, SCRAPE_FALLBACK_NOTE
                    ));
                }
            }
        }

        (blocks.join("\n\n"), source_url)
    }

    async fn handle_calendar(&mut self, input: &str) -> BotResponse {
        // The user may have linked the calendar after this session started
        match self.services.profiles.calendar_connected(&self.user_id).await {
            Ok(connected) => self.profile.calendar_connected = connected,
            Err(error) => tracing::warn!(%error, "could not refresh calendar status"),
        }
        if self.profile.calendar_connected {
            self.confirm_calendar_credentials().await;
        }
        self.refresh_prompt();

        if !self.profile.calendar_connected {
            self.memory.push_exchange(input, CALENDAR_DISCONNECTED);
            return BotResponse::message(CALENDAR_DISCONNECTED);
        }

        let now = self.now();
        let last_bot = self.memory.last_assistant().unwrap_or_default().to_string();
        let parsed = with_llm_deadline(
            self.settings.llm_timeout,
            parse_calendar_request(self.services.llm.as_ref(), input, &last_bot, now),
        )
        .await;
        let action = match parsed {
            Ok(action) => action,
            Err(error) => {
                tracing::warn!(%error, "calendar request parsing failed");
                return BotResponse::error(CALENDAR_FAILED);
            }
        };

        let reply = calendar::execute(
            self.services.calendar.as_deref(),
            &self.user_id,
            &action,
            now,
            self.settings.calendar_timeout,
        )
        .await;
        self.memory.push_exchange(input, reply.clone());
        BotResponse::message(reply)
    }

    /// A profile can claim a connection whose tokens are gone
    async fn confirm_calendar_credentials(&mut self) {
        let Some(calendar) = self.services.calendar.clone() else {
            return;
        };
        let status = with_timeout(
            "calendar status",
            self.settings.calendar_timeout,
            calendar.connection_status(&self.user_id),
        )
        .await;
        match status {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(user_id = %self.user_id, "calendar flagged as connected but has no credentials");
                self.profile.calendar_connected = false;
            }
            Err(error) => tracing::warn!(%error, "could not check calendar credentials"),
        }
    }

    async fn respond(&mut self, input: &str, retrieved: &str) -> BotResponse {
        match self.generate(input, retrieved).await {
            Ok(message) => BotResponse::message(message),
            Err(response) => response,
        }
    }

    /// Asks the model for the reply and records the exchange once it is final
    async fn generate(&mut self, input: &str, retrieved: &str) -> Result<String, BotResponse> {
        self.refresh_prompt();
        let user_turn = format!("Retrieved Data: {}\nUser Question: {}", retrieved, input);

        let mut messages = Vec::with_capacity(self.memory.len() + 2);
        messages.push(ChatMessage::system(self.system_prompt.clone()));
        messages.extend(self.memory.turns().iter().cloned());
        messages.push(ChatMessage::user(user_turn.clone()));

        let reply = with_llm_deadline(
            self.settings.llm_timeout,
            self.services.llm.complete(&messages, self.settings.temperature),
        )
        .await
        .map_err(|error| generation_error(&error))?;

        let reply = reply.trim().to_string();
        if reply.is_empty() {
            tracing::warn!("model returned an empty reply");
            return Err(BotResponse::error(EMPTY_REPLY));
        }
        self.memory.push_exchange(user_turn, reply.clone());
        Ok(reply)
    }

    fn now(&self) -> DateTime<Tz> {
        now_in(self.settings.timezone)
    }

    fn refresh_prompt(&mut self) {
        self.system_prompt = render_system_prompt(&self.profile, self.mode, &self.now());
    }
}
