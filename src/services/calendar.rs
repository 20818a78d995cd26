use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use chrono_tz::Tz;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;

use crate::config::CalendarConfig;
use crate::services::dates::parse_rfc3339_in;
use crate::services::profiles::UserLocks;
use crate::storage::{CalendarCredential, StorageManager};

/// Refresh this long before the provider's stated expiry
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Start or end of a Google Calendar event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EventTime {
    #[serde(rename = "dateTime", default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    /// Set instead of `date_time` for all-day events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl EventTime {
    pub fn at(value: DateTime<Tz>) -> Self {
        Self {
            date_time: Some(value.to_rfc3339()),
            date: None,
        }
    }

    #[cfg(test)]
    pub fn all_day(date: NaiveDate) -> Self {
        Self {
            date_time: None,
            date: Some(date.format("%Y-%m-%d").to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub start: EventTime,
    #[serde(default)]
    pub end: EventTime,
}

/// Resolved wall-clock span of an event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventTiming {
    Timed {
        start: DateTime<Tz>,
        end: DateTime<Tz>,
    },
    /// `end` is exclusive, as Google sends it
    AllDay { start: NaiveDate, end: NaiveDate },
}

impl CalendarEvent {
    /// `None` when the event has no parseable start
    pub fn timing(&self, tz: &Tz) -> Option<EventTiming> {
        if let Some(start) = self.start.date_time.as_deref() {
            let start = parse_rfc3339_in(start, tz)?;
            let end = self
                .end
                .date_time
                .as_deref()
                .and_then(|end| parse_rfc3339_in(end, tz))
                .unwrap_or(start);
            return Some(EventTiming::Timed { start, end });
        }

        let start = parse_date(self.start.date.as_deref()?)?;
        let end = self
            .end
            .date
            .as_deref()
            .and_then(parse_date)
            .unwrap_or_else(|| start + ChronoDuration::days(1));
        Some(EventTiming::AllDay { start, end })
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

/// A new event to insert
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    pub summary: String,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub description: Option<String>,
    pub location: Option<String>,
}

/// Partial edit; only `Some` fields are sent
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventUpdates {
    pub summary: Option<String>,
    pub start: Option<DateTime<Tz>>,
    pub end: Option<DateTime<Tz>>,
    pub description: Option<String>,
    pub location: Option<String>,
}

impl EventUpdates {
    pub fn is_empty(&self) -> bool {
        self.summary.is_none()
            && self.start.is_none()
            && self.end.is_none()
            && self.description.is_none()
            && self.location.is_none()
    }
}

/// Result of a partial edit
#[derive(Debug, Clone, PartialEq)]
pub enum EventEdit {
    Updated(CalendarEvent),
    NotFound,
    Rejected,
}

/// A user's primary calendar
#[async_trait]
pub trait CalendarService: Send + Sync {
    /// Events starting from `start`, ordered by start time.
    /// `end = None` leaves the window open.
    async fn list_events(
        &self,
        user_id: &str,
        start: DateTime<Tz>,
        end: Option<DateTime<Tz>>,
        max_results: usize,
    ) -> Result<Vec<CalendarEvent>>;

    /// `None` when the provider rejected the event
    async fn create_event(&self, user_id: &str, draft: &EventDraft) -> Result<Option<CalendarEvent>>;

    async fn update_event(
        &self,
        user_id: &str,
        event_id: &str,
        updates: &EventUpdates,
    ) -> Result<EventEdit>;

    /// `false` when the event was not found or could not be removed
    async fn delete_event(&self, user_id: &str, event_id: &str) -> Result<bool>;

    async fn connection_status(&self, user_id: &str) -> Result<bool>;
}

/// Where OAuth tokens live
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load_credential(&self, user_id: &str) -> Result<Option<CalendarCredential>>;

    async fn save_credential(&self, user_id: &str, credential: &CalendarCredential) -> Result<()>;
}

#[async_trait]
impl CredentialStore for StorageManager {
    async fn load_credential(&self, user_id: &str) -> Result<Option<CalendarCredential>> {
        self.load_calendar_credential(user_id).await
    }

    async fn save_credential(&self, user_id: &str, credential: &CalendarCredential) -> Result<()> {
        self.save_calendar_credential(user_id, credential).await
    }
}

#[derive(Debug, Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<CalendarEvent>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
}

/// Google Calendar v3 over REST
pub struct GoogleCalendarClient {
    http: Client,
    credentials: Arc<dyn CredentialStore>,
    locks: UserLocks,
    api_base: String,
    token_url: String,
    client_id: String,
    client_secret: String,
    timezone: Tz,
}

impl GoogleCalendarClient {
    pub fn new(
        config: &CalendarConfig,
        timezone: Tz,
        credentials: Arc<dyn CredentialStore>,
        locks: UserLocks,
    ) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            credentials,
            locks,
            api_base: config.api_base.clone(),
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            timezone,
        })
    }

    fn events_url(&self, event_id: Option<&str>) -> Result<Url> {
        let mut url = Url::parse(&self.api_base)?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| eyre!("calendar api base cannot hold a path: {}", self.api_base))?;
            segments.pop_if_empty().extend(["calendars", "primary", "events"]);
            if let Some(id) = event_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    fn is_expired(credential: &CalendarCredential, now: DateTime<Utc>) -> bool {
        credential
            .expires_at
            .as_deref()
            .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
            .is_some_and(|expiry| {
                expiry.with_timezone(&Utc) <= now + ChronoDuration::seconds(EXPIRY_MARGIN_SECS)
            })
    }

    /// Returns a usable bearer token, refreshing it first when it is stale
    async fn access_token(&self, user_id: &str) -> Result<String> {
        let credential = self
            .credentials
            .load_credential(user_id)
            .await?
            .ok_or_else(|| eyre!("Google Calendar is not connected for this user"))?;

        if !Self::is_expired(&credential, Utc::now()) {
            return Ok(credential.access_token);
        }

        let lock = self.locks.lock_for(user_id);
        let _guard = lock.lock().await;

        // Another turn may have refreshed while we waited
        let credential = self
            .credentials
            .load_credential(user_id)
            .await?
            .ok_or_else(|| eyre!("Google Calendar is not connected for this user"))?;
        if !Self::is_expired(&credential, Utc::now()) {
            return Ok(credential.access_token);
        }

        let refreshed = self.refresh(&credential).await?;
        self.credentials.save_credential(user_id, &refreshed).await?;
        tracing::info!(user_id, "refreshed calendar token");
        Ok(refreshed.access_token)
    }

    async fn refresh(&self, credential: &CalendarCredential) -> Result<CalendarCredential> {
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .ok_or_else(|| eyre!("calendar token expired and no refresh token is stored"))?;

        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(eyre!("token refresh failed ({}): {}", status, body));
        }

        let token: TokenResponse = response.json().await?;
        Ok(CalendarCredential {
            access_token: token.access_token,
            refresh_token: token
                .refresh_token
                .or_else(|| credential.refresh_token.clone()),
            expires_at: token
                .expires_in
                .map(|secs| (Utc::now() + ChronoDuration::seconds(secs)).to_rfc3339()),
        })
    }

    fn time_body(&self, value: DateTime<Tz>) -> Value {
        json!({
            "dateTime": value.to_rfc3339(),
            "timeZone": self.timezone.name(),
        })
    }
}

#[async_trait]
impl CalendarService for GoogleCalendarClient {
    async fn list_events(
        &self,
        user_id: &str,
        start: DateTime<Tz>,
        end: Option<DateTime<Tz>>,
        max_results: usize,
    ) -> Result<Vec<CalendarEvent>> {
        let token = self.access_token(user_id).await?;

        let mut query = vec![
            ("timeMin", start.to_rfc3339()),
            ("maxResults", max_results.to_string()),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
        ];
        if let Some(end) = end {
            query.push(("timeMax", end.to_rfc3339()));
        }

        let response = self
            .http
            .get(self.events_url(None)?)
            .bearer_auth(token)
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(eyre!("Failed to list events ({}): {}", status, body));
        }

        let list: EventList = response.json().await?;
        Ok(list.items)
    }

    async fn create_event(&self, user_id: &str, draft: &EventDraft) -> Result<Option<CalendarEvent>> {
        let token = self.access_token(user_id).await?;

        let mut body = json!({
            "summary": draft.summary,
            "start": self.time_body(draft.start),
            "end": self.time_body(draft.end),
            "reminders": {
                "useDefault": false,
                "overrides": [
                    {"method": "email", "minutes": 24 * 60},
                    {"method": "popup", "minutes": 10},
                ],
            },
        });
        if let Some(fields) = body.as_object_mut() {
            if let Some(description) = &draft.description {
                fields.insert("description".to_string(), json!(description));
            }
            if let Some(location) = &draft.location {
                fields.insert("location".to_string(), json!(location));
            }
        }

        let response = self
            .http
            .post(self.events_url(None)?)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, %body, "calendar rejected new event");
            return Ok(None);
        }

        Ok(Some(response.json().await?))
    }

    async fn update_event(
        &self,
        user_id: &str,
        event_id: &str,
        updates: &EventUpdates,
    ) -> Result<EventEdit> {
        let token = self.access_token(user_id).await?;

        let mut body = Map::new();
        if let Some(summary) = &updates.summary {
            body.insert("summary".to_string(), json!(summary));
        }
        if let Some(start) = updates.start {
            body.insert("start".to_string(), self.time_body(start));
        }
        if let Some(end) = updates.end {
            body.insert("end".to_string(), self.time_body(end));
        }
        if let Some(description) = &updates.description {
            body.insert("description".to_string(), json!(description));
        }
        if let Some(location) = &updates.location {
            body.insert("location".to_string(), json!(location));
        }

        let response = self
            .http
            .patch(self.events_url(Some(event_id))?)
            .bearer_auth(token)
            .json(&Value::Object(body))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            tracing::info!(event_id, "event to edit was not found");
            return Ok(EventEdit::NotFound);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, event_id, %body, "calendar rejected event edit");
            return Ok(EventEdit::Rejected);
        }

        Ok(EventEdit::Updated(response.json().await?))
    }

    async fn delete_event(&self, user_id: &str, event_id: &str) -> Result<bool> {
        let token = self.access_token(user_id).await?;

        let response = self
            .http
            .delete(self.events_url(Some(event_id))?)
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(true);
        }
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            tracing::info!(event_id, "event to delete was not found");
        } else {
            tracing::warn!(%status, event_id, "calendar rejected event deletion");
        }
        Ok(false)
    }

    async fn connection_status(&self, user_id: &str) -> Result<bool> {
        Ok(self.credentials.load_credential(user_id).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Mutex;
    use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct MemoryCredentials {
        stored: Mutex<Option<CalendarCredential>>,
    }

    #[async_trait]
    impl CredentialStore for MemoryCredentials {
        async fn load_credential(&self, _user_id: &str) -> Result<Option<CalendarCredential>> {
            Ok(self.stored.lock().unwrap().clone())
        }

        async fn save_credential(&self, _user_id: &str, credential: &CalendarCredential) -> Result<()> {
            *self.stored.lock().unwrap() = Some(credential.clone());
            Ok(())
        }
    }

    fn credential(expires_at: Option<String>) -> CalendarCredential {
        CalendarCredential {
            access_token: "old-token".to_string(),
            refresh_token: Some("refresh-me".to_string()),
            expires_at,
        }
    }

    fn client_for(server: &MockServer, store: Arc<MemoryCredentials>) -> GoogleCalendarClient {
        let config = CalendarConfig {
            api_base: format!("{}/calendar/v3", server.uri()),
            token_url: format!("{}/token", server.uri()),
            client_id: "cid".to_string(),
            client_secret: "secret".to_string(),
            ..CalendarConfig::default()
        };
        GoogleCalendarClient::new(&config, chrono_tz::Africa::Cairo, store, UserLocks::new()).unwrap()
    }

    fn cairo(y: i32, m: u32, d: u32, h: u32) -> DateTime<Tz> {
        chrono_tz::Africa::Cairo.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_event_timing_timed_and_all_day() {
        let tz = chrono_tz::Africa::Cairo;
        let timed = CalendarEvent {
            id: "1".to_string(),
            summary: "اجتماع".to_string(),
            start: EventTime::at(cairo(2025, 7, 30, 17)),
            end: EventTime::at(cairo(2025, 7, 30, 18)),
        };
        assert_eq!(
            timed.timing(&tz),
            Some(EventTiming::Timed {
                start: cairo(2025, 7, 30, 17),
                end: cairo(2025, 7, 30, 18)
            })
        );

        let day = NaiveDate::from_ymd_opt(2025, 7, 30).unwrap();
        let all_day = CalendarEvent {
            id: "2".to_string(),
            summary: "إجازة".to_string(),
            start: EventTime::all_day(day),
            end: EventTime::default(),
        };
        assert_eq!(
            all_day.timing(&tz),
            Some(EventTiming::AllDay {
                start: day,
                end: NaiveDate::from_ymd_opt(2025, 7, 31).unwrap()
            })
        );
    }

    #[test]
    fn test_events_url_escapes_id() {
        let store = Arc::new(MemoryCredentials::default());
        let config = CalendarConfig::default();
        let client = GoogleCalendarClient::new(&config, chrono_tz::Africa::Cairo, store, UserLocks::new()).unwrap();
        assert_eq!(
            client.events_url(Some("a b")).unwrap().as_str(),
            "https://www.googleapis.com/calendar/v3/calendars/primary/events/a%20b"
        );
    }

    #[tokio::test]
    async fn test_list_events_sends_window_and_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendar/v3/calendars/primary/events"))
            .and(header("authorization", "Bearer old-token"))
            .and(query_param("singleEvents", "true"))
            .and(query_param("orderBy", "startTime"))
            .and(query_param("timeMax", "2025-07-31T00:00:00+03:00"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{
                    "id": "e1",
                    "summary": "اجتماع",
                    "start": {"dateTime": "2025-07-30T17:00:00+03:00"},
                    "end": {"dateTime": "2025-07-30T18:00:00+03:00"}
                }]
            })))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryCredentials::default());
        store.save_credential("u1", &credential(None)).await.unwrap();
        let client = client_for(&server, store);

        let events = client
            .list_events("u1", cairo(2025, 7, 30, 0), Some(cairo(2025, 7, 31, 0)), 10)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].summary, "اجتماع");
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_and_saved() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "new-token",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/calendar/v3/calendars/primary/events/e1"))
            .and(header("authorization", "Bearer new-token"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryCredentials::default());
        let expired = (Utc::now() - ChronoDuration::hours(1)).to_rfc3339();
        store.save_credential("u1", &credential(Some(expired))).await.unwrap();
        let client = client_for(&server, store.clone());

        assert!(client.delete_event("u1", "e1").await.unwrap());
        let saved = store.load_credential("u1").await.unwrap().unwrap();
        assert_eq!(saved.access_token, "new-token");
        assert_eq!(saved.refresh_token.as_deref(), Some("refresh-me"));
    }

    #[tokio::test]
    async fn test_delete_missing_event_is_false() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryCredentials::default());
        store.save_credential("u1", &credential(None)).await.unwrap();
        let client = client_for(&server, store);
        assert!(!client.delete_event("u1", "gone").await.unwrap());
    }

    #[tokio::test]
    async fn test_update_sends_only_present_fields() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/calendar/v3/calendars/primary/events/e1"))
            .and(body_json(json!({"summary": "غداء العيلة"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "e1",
                "summary": "غداء العيلة",
                "start": {"dateTime": "2025-07-30T14:00:00+03:00"},
                "end": {"dateTime": "2025-07-30T15:00:00+03:00"}
            })))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryCredentials::default());
        store.save_credential("u1", &credential(None)).await.unwrap();
        let client = client_for(&server, store);

        let updates = EventUpdates {
            summary: Some("غداء العيلة".to_string()),
            ..EventUpdates::default()
        };
        let EventEdit::Updated(updated) = client.update_event("u1", "e1", &updates).await.unwrap()
        else {
            panic!("edit was not applied");
        };
        assert_eq!(updated.summary, "غداء العيلة");
    }

    #[tokio::test]
    async fn test_update_distinguishes_missing_from_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/calendar/v3/calendars/primary/events/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/calendar/v3/calendars/primary/events/locked"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryCredentials::default());
        store.save_credential("u1", &credential(None)).await.unwrap();
        let client = client_for(&server, store);

        let updates = EventUpdates {
            summary: Some("عشاء".to_string()),
            ..EventUpdates::default()
        };
        assert_eq!(
            client.update_event("u1", "gone", &updates).await.unwrap(),
            EventEdit::NotFound
        );
        assert_eq!(
            client.update_event("u1", "locked", &updates).await.unwrap(),
            EventEdit::Rejected
        );
    }

    #[tokio::test]
    async fn test_not_connected_without_credential() {
        let server = MockServer::start().await;
        let client = client_for(&server, Arc::new(MemoryCredentials::default()));
        assert!(!client.connection_status("u1").await.unwrap());
        assert!(client.list_events("u1", cairo(2025, 7, 30, 0), None, 10).await.is_err());
    }
}
