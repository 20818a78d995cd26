use chrono::{DateTime, Duration};
use chrono_tz::Tz;
use serde_json::Value;

use crate::agents::{ChatMessage, LlmClient, LlmError};
use crate::app::chat::agent::json::extract_json_block;
use crate::app::prompts::calendar_parser_prompt;
use crate::services::calendar::EventUpdates;
use crate::services::dates::{TimeFrame, parse_event_datetime};

pub const DEFAULT_MAX_RESULTS: usize = 10;
const MAX_RESULTS_CAP: usize = 50;

/// How the user referred to an existing event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventTarget {
    Id(String),
    Summary(String),
}

impl EventTarget {
    pub fn label(&self) -> &str {
        match self {
            EventTarget::Id(value) | EventTarget::Summary(value) => value,
        }
    }
}

/// Parsed `create_event` details; missing pieces stay `None`
#[derive(Debug, Clone, PartialEq)]
pub struct CreateRequest {
    pub summary: Option<String>,
    pub start: Option<DateTime<Tz>>,
    pub end: Option<DateTime<Tz>>,
    pub description: Option<String>,
    pub location: Option<String>,
}

/// A calendar request after model parsing and date post-processing
#[derive(Debug, Clone, PartialEq)]
pub enum CalendarAction {
    ListEvents {
        time_frame: Option<TimeFrame>,
        max_results: usize,
    },
    CreateEvent(CreateRequest),
    EditEvent {
        target: Option<EventTarget>,
        updates: EventUpdates,
    },
    DeleteEvent {
        target: Option<EventTarget>,
    },
    Unknown,
    Unrecognized(String),
}

fn text_field(details: &Value, key: &str) -> Option<String> {
    details
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn target_from(details: &Value) -> Option<EventTarget> {
    text_field(details, "event_id")
        .map(EventTarget::Id)
        .or_else(|| text_field(details, "summary").map(EventTarget::Summary))
}

fn datetime_field(details: &Value, key: &str, now: DateTime<Tz>) -> Option<DateTime<Tz>> {
    text_field(details, key).and_then(|value| parse_event_datetime(&value, now))
}

fn max_results_from(value: Option<&Value>) -> usize {
    value
        .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok())))
        .and_then(|n| usize::try_from(n).ok())
        .filter(|n| *n > 0)
        .map_or(DEFAULT_MAX_RESULTS, |n| n.min(MAX_RESULTS_CAP))
}

/// Turns a parser reply into a [`CalendarAction`].
///
/// Anything that is not a JSON object with an `action` is `Unknown`.
pub fn interpret_reply(reply: &str, now: DateTime<Tz>) -> CalendarAction {
    let Some(parsed) = extract_json_block(reply) else {
        tracing::debug!(reply, "calendar parser reply was not JSON");
        return CalendarAction::Unknown;
    };
    let Some(action) = text_field(&parsed, "action") else {
        return CalendarAction::Unknown;
    };
    let empty = Value::Object(serde_json::Map::new());
    let details = parsed.get("details").filter(|d| d.is_object()).unwrap_or(&empty);

    match action.as_str() {
        "list_events" => {
            let time_frame = text_field(details, "time_frame")
                .or_else(|| text_field(&parsed, "time_frame"))
                .and_then(|value| TimeFrame::parse(&value))
                .or_else(|| {
                    text_field(details, "specific_date").and_then(|value| TimeFrame::parse(&value))
                });
            let max_results =
                max_results_from(details.get("max_results").or_else(|| parsed.get("max_results")));
            CalendarAction::ListEvents {
                time_frame,
                max_results,
            }
        }
        "create_event" => {
            let start = datetime_field(details, "start_time", now);
            let end = datetime_field(details, "end_time", now)
                .or_else(|| start.map(|start| start + Duration::hours(1)));
            CalendarAction::CreateEvent(CreateRequest {
                summary: text_field(details, "summary"),
                start,
                end,
                description: text_field(details, "description"),
                location: text_field(details, "location"),
            })
        }
        "edit_event" => {
            let changes = details.get("updates").filter(|u| u.is_object()).unwrap_or(&empty);
            let updates = EventUpdates {
                summary: text_field(changes, "summary"),
                start: datetime_field(changes, "start_time", now),
                end: datetime_field(changes, "end_time", now),
                description: text_field(changes, "description")
                    .or_else(|| text_field(details, "description")),
                location: text_field(changes, "location")
                    .or_else(|| text_field(details, "location")),
            };
            CalendarAction::EditEvent {
                target: target_from(details),
                updates,
            }
        }
        "delete_event" => CalendarAction::DeleteEvent {
            target: target_from(details),
        },
        "unknown_calendar_intent" => CalendarAction::Unknown,
        other => CalendarAction::Unrecognized(other.to_string()),
    }
}

/// Asks the model to structure a calendar request, then post-processes dates
pub async fn parse_calendar_request(
    llm: &dyn LlmClient,
    user_input: &str,
    last_bot_response: &str,
    now: DateTime<Tz>,
) -> Result<CalendarAction, LlmError> {
    let system = calendar_parser_prompt(
        &now.format("%Y-%m-%d").to_string(),
        &now.format("%H:%M").to_string(),
        now.timezone().name(),
        &now.format("%:z").to_string(),
    );
    let messages = [
        ChatMessage::system(system),
        ChatMessage::user(format!(
            "آخر رد من المساعد: {}\nرسالة المستخدم: {}",
            last_bot_response, user_input
        )),
    ];

    let reply = llm.complete(&messages, 0.0).await?;
    let action = interpret_reply(&reply, now);
    tracing::debug!(?action, "calendar request parsed");
    Ok(action)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testing::FakeLlm;
    use chrono::{NaiveDate, TimeZone, Timelike};

    fn now() -> DateTime<Tz> {
        chrono_tz::Africa::Cairo
            .with_ymd_and_hms(2025, 7, 29, 14, 30, 0)
            .unwrap()
    }

    #[test]
    fn test_list_events_with_time_frame() {
        let action = interpret_reply(
            r#"{"action": "list_events", "details": {"time_frame": "this week", "max_results": "5"}}"#,
            now(),
        );
        assert_eq!(
            action,
            CalendarAction::ListEvents {
                time_frame: Some(TimeFrame::ThisWeek),
                max_results: 5
            }
        );
    }

    #[test]
    fn test_list_events_specific_date_and_missing_frame() {
        let action = interpret_reply(
            r#"{"action": "list_events", "details": {"specific_date": "2025-08-02"}}"#,
            now(),
        );
        assert_eq!(
            action,
            CalendarAction::ListEvents {
                time_frame: Some(TimeFrame::Date(NaiveDate::from_ymd_opt(2025, 8, 2).unwrap())),
                max_results: DEFAULT_MAX_RESULTS
            }
        );

        let vague = interpret_reply(
            r#"{"action": "list_events", "details": {"time_frame": "someday"}}"#,
            now(),
        );
        assert_eq!(
            vague,
            CalendarAction::ListEvents {
                time_frame: None,
                max_results: DEFAULT_MAX_RESULTS
            }
        );
    }

    #[test]
    fn test_create_event_defaults_end_to_one_hour() {
        let action = interpret_reply(
            "```json\n{\"action\": \"create_event\", \"details\": {\"summary\": \"اجتماع\", \"start_time\": \"2025-07-30T17:00:00+03:00\"}}\n```",
            now(),
        );
        let CalendarAction::CreateEvent(request) = action else {
            panic!("expected create");
        };
        assert_eq!(request.summary.as_deref(), Some("اجتماع"));
        let start = request.start.unwrap();
        assert_eq!((start.hour(), start.minute()), (17, 0));
        assert_eq!(request.end.unwrap() - start, Duration::hours(1));
    }

    #[test]
    fn test_create_event_resolves_relative_day() {
        let action = interpret_reply(
            r#"{"action": "create_event", "details": {"summary": "دكتور", "start_time": "بكرة 09:30"}}"#,
            now(),
        );
        let CalendarAction::CreateEvent(request) = action else {
            panic!("expected create");
        };
        let start = request.start.unwrap();
        assert_eq!(start.date_naive(), NaiveDate::from_ymd_opt(2025, 7, 30).unwrap());
        assert_eq!((start.hour(), start.minute()), (9, 30));
    }

    fn cairo(y: i32, m: u32, d: u32, h: u32) -> DateTime<Tz> {
        chrono_tz::Africa::Cairo.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_parser_prompt_carries_the_seasonal_offset() {
        let reply = r#"{"action": "create_event", "details": {"summary": "اجتماع", "start_time": "2026-01-15T17:00:00+03:00"}}"#;
        let winter_llm = FakeLlm::with_replies(vec![Ok(reply.to_string())]);
        let winter = parse_calendar_request(
            &winter_llm,
            "اجتماع بكرة الساعة 5 مساءً",
            "",
            cairo(2026, 1, 14, 10),
        )
        .await
        .unwrap();
        let CalendarAction::CreateEvent(request) = winter else {
            panic!("expected create");
        };
        assert_eq!(request.start, Some(cairo(2026, 1, 15, 17)));
        assert_eq!(request.end, Some(cairo(2026, 1, 15, 18)));
        let system = &winter_llm.calls()[0].messages[0].content;
        assert!(system.contains("UTC+02:00"));
        assert!(!system.contains("+03:00"));

        let summer_reply = r#"{"action": "create_event", "details": {"summary": "اجتماع", "start_time": "2025-07-15T17:00:00"}}"#;
        let summer_llm = FakeLlm::with_replies(vec![Ok(summer_reply.to_string())]);
        let summer = parse_calendar_request(&summer_llm, "اجتماع بكرة 5", "", cairo(2025, 7, 14, 10))
            .await
            .unwrap();
        let CalendarAction::CreateEvent(request) = summer else {
            panic!("expected create");
        };
        assert_eq!(request.start, Some(cairo(2025, 7, 15, 17)));
        assert!(summer_llm.calls()[0].messages[0].content.contains("UTC+03:00"));
    }

    #[test]
    fn test_edit_and_delete_targets() {
        let edit = interpret_reply(
            r#"{"action": "edit_event", "details": {"summary": "اجتماع", "updates": {"start_time": "2025-07-30T18:00:00+03:00"}}}"#,
            now(),
        );
        let CalendarAction::EditEvent { target, updates } = edit else {
            panic!("expected edit");
        };
        assert_eq!(target, Some(EventTarget::Summary("اجتماع".to_string())));
        assert_eq!(updates.start.map(|s| s.hour()), Some(18));
        assert!(updates.summary.is_none());

        assert_eq!(
            interpret_reply(
                r#"{"action": "delete_event", "details": {"event_id": "abc", "summary": "x"}}"#,
                now()
            ),
            CalendarAction::DeleteEvent {
                target: Some(EventTarget::Id("abc".to_string()))
            }
        );
    }

    #[test]
    fn test_unknown_and_unrecognized_actions() {
        assert_eq!(interpret_reply("مش فاهم", now()), CalendarAction::Unknown);
        assert_eq!(interpret_reply(r#"{"details": {}}"#, now()), CalendarAction::Unknown);
        assert_eq!(
            interpret_reply(r#"{"action": "unknown_calendar_intent", "details": {}}"#, now()),
            CalendarAction::Unknown
        );
        assert_eq!(
            interpret_reply(r#"{"action": "share_calendar"}"#, now()),
            CalendarAction::Unrecognized("share_calendar".to_string())
        );
    }
}
