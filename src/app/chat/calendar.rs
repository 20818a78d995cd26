//! Runs parsed calendar actions against the user's calendar and words the
//! outcome in Egyptian Arabic. Collaborator failures never escape: each one
//! is logged and turned into a message.

use chrono::{DateTime, NaiveTime};
use chrono_tz::Tz;
use color_eyre::Result;
use std::time::Duration;

use crate::app::chat::agent::calendar::{
    CalendarAction, CreateRequest, DEFAULT_MAX_RESULTS, EventTarget,
};
use crate::services::calendar::{
    CalendarEvent, CalendarService, EventDraft, EventEdit, EventTiming, EventUpdates,
};
use crate::services::dates::{DateRange, TimeFrame, display_date, display_time, localize};
use crate::services::with_timeout;

pub const NOT_REACHABLE: &str =
    "🚫 لا يمكنني الوصول لتقويم جوجل الخاص بك. يرجى التأكد من ربط حسابك.";
pub const ASK_TIME_FRAME: &str =
    "يرجى تحديد الفترة الزمنية التي ترغب في عرض المواعيد فيها (مثل اليوم، بكرة، هذا الأسبوع).";
pub const LIST_FAILED: &str =
    "🚫 حصلت مشكلة وأنا بحاول أجيب المواعيد بتاعتك. يرجى المحاولة مرة أخرى.";
pub const CREATE_NEEDS_DETAILS: &str =
    "ممكن تديني تفاصيل أكتر لإنشاء الحدث؟ (الاسم، تاريخ ووقت البدء والانتهاء بالضبط)";
pub const CREATE_REJECTED: &str = "فشلت في إضافة الحدث لتقويمك. يرجى المحاولة مرة أخرى.";
pub const CREATE_FAILED: &str =
    "🚫 حصلت مشكلة وأنا بحاول أضيف الحدث لتقويمك. يرجى المحاولة مرة أخرى.";
pub const EDIT_NEEDS_DETAILS: &str =
    "ممكن تديني تفاصيل أكتر لتعديل الحدث؟ (الاسم، تاريخ ووقت البدء والانتهاء بالضبط)";
pub const EDIT_NEEDS_CHANGES: &str = "عايز تعدل إيه في الميعاد بالظبط؟ (الاسم، الوقت، المكان أو الوصف)";
pub const EDIT_REJECTED: &str = "فشلت في تعديل الحدث في تقويمك. يرجى المحاولة مرة أخرى.";
pub const EDIT_FAILED: &str =
    "🚫 حصلت مشكلة وأنا بحاول أعمل التعديل لتقويمك. يرجى المحاولة مرة أخرى.";
pub const DELETE_NEEDS_DETAILS: &str =
    "ممكن تديني تفاصيل أكتر لمسح الحدث؟ (زي الاسم أو معرّف الحدث)";
pub const DELETE_REJECTED: &str =
    "🚫 مقدرتش ألاقي أو أحذف الحدث. تأكد من إن الاسم أو المعرّف صحيح.";
pub const DELETE_FAILED: &str =
    "🚫 حصلت مشكلة وأنا بحاول أمسح الحدث من تقويمك. ممكن تحاول مرة تانية.";
pub const UNKNOWN_ACTION: &str =
    "❓ لم أفهم نوع العملية المطلوبة في التقويم. هل تريد معرفة مواعيدك، إضافة حدث، أو شيء آخر؟";
pub const UNRECOGNIZED_ACTION: &str = "❓ لم أفهم نوع العملية المطلوبة في التقويم.";

const ALL_DAY: &str = "طوال اليوم";
const UNTITLED: &str = "بدون عنوان";
const MISSING: &str = "...";

fn not_found(summary: &str) -> String {
    format!("🚫 مقدرتش ألاقي حدث اسمه \"{}\" في تقويمك.", summary)
}

/// Executes one parsed action and returns the reply text.
///
/// `service` is `None` when no calendar backend is configured.
pub async fn execute(
    service: Option<&dyn CalendarService>,
    user_id: &str,
    action: &CalendarAction,
    now: DateTime<Tz>,
    budget: Duration,
) -> String {
    let service = match (action, service) {
        (CalendarAction::Unknown, _) => return UNKNOWN_ACTION.to_string(),
        (CalendarAction::Unrecognized(name), _) => {
            tracing::warn!(action = %name, "unhandled calendar action");
            return UNRECOGNIZED_ACTION.to_string();
        }
        (_, None) => return NOT_REACHABLE.to_string(),
        (_, Some(service)) => service,
    };
    let calendar = Calendar {
        service,
        user_id,
        now,
        budget,
    };

    match action {
        CalendarAction::ListEvents {
            time_frame,
            max_results,
        } => calendar.list(*time_frame, *max_results).await,
        CalendarAction::CreateEvent(request) => calendar.create(request).await,
        CalendarAction::EditEvent { target, updates } => {
            calendar.edit(target.as_ref(), updates).await
        }
        CalendarAction::DeleteEvent { target } => calendar.delete(target.as_ref()).await,
        CalendarAction::Unknown | CalendarAction::Unrecognized(_) => UNKNOWN_ACTION.to_string(),
    }
}

struct Calendar<'a> {
    service: &'a dyn CalendarService,
    user_id: &'a str,
    now: DateTime<Tz>,
    budget: Duration,
}

impl Calendar<'_> {
    async fn list(&self, time_frame: Option<TimeFrame>, max_results: usize) -> String {
        let Some((frame, range)) =
            time_frame.and_then(|frame| frame.range(self.now).map(|range| (frame, range)))
        else {
            return ASK_TIME_FRAME.to_string();
        };

        let call = self
            .service
            .list_events(self.user_id, range.start, Some(range.end), max_results);
        let events = match with_timeout("calendar list", self.budget, call).await {
            Ok(events) => events,
            Err(error) => {
                tracing::warn!(%error, user_id = self.user_id, "failed to list calendar events");
                return LIST_FAILED.to_string();
            }
        };

        let tz = self.now.timezone();
        let lines: Vec<String> = events
            .iter()
            .filter_map(|event| render_event(event, &tz, frame, &range))
            .collect();

        if lines.is_empty() {
            return format!("مفيش عندك مواعيد {}.", frame.arabic_label());
        }
        format!(
            "المواعيد اللي عندك {}:\n{}",
            frame.arabic_label(),
            lines.join("\n")
        )
    }

    async fn create(&self, request: &CreateRequest) -> String {
        let (Some(summary), Some(start), Some(end)) =
            (request.summary.as_ref(), request.start, request.end)
        else {
            return CREATE_NEEDS_DETAILS.to_string();
        };

        let draft = EventDraft {
            summary: summary.clone(),
            start,
            end,
            description: request.description.clone(),
            location: request.location.clone(),
        };
        let call = self.service.create_event(self.user_id, &draft);
        match with_timeout("calendar create", self.budget, call).await {
            Ok(Some(created)) => {
                tracing::info!(event_id = %created.id, "calendar event created");
                format!(
                    "تمت إضافة \"{}\" لتقويمك.\nهيبدأ يوم {} الساعة {} وهينتهي الساعة {}.",
                    summary,
                    display_date(start.date_naive()),
                    display_time(&start),
                    display_time(&end)
                )
            }
            Ok(None) => CREATE_REJECTED.to_string(),
            Err(error) => {
                tracing::warn!(%error, user_id = self.user_id, "failed to create calendar event");
                CREATE_FAILED.to_string()
            }
        }
    }

    async fn edit(&self, target: Option<&EventTarget>, updates: &EventUpdates) -> String {
        let Some(target) = target else {
            return EDIT_NEEDS_DETAILS.to_string();
        };
        if updates.is_empty() {
            return EDIT_NEEDS_CHANGES.to_string();
        }

        let event_id = match self.resolve(target).await {
            Ok(Some(id)) => id,
            Ok(None) => return not_found(target.label()),
            Err(error) => {
                tracing::warn!(%error, "failed to look up event to edit");
                return EDIT_FAILED.to_string();
            }
        };

        let call = self.service.update_event(self.user_id, &event_id, updates);
        match with_timeout("calendar edit", self.budget, call).await {
            Ok(EventEdit::Updated(_)) => {
                let name = updates.summary.as_deref().unwrap_or(target.label());
                let start_date = updates
                    .start
                    .map_or_else(|| MISSING.to_string(), |start| display_date(start.date_naive()));
                let start_time = updates
                    .start
                    .map_or_else(|| MISSING.to_string(), |start| display_time(&start));
                let end_time = updates
                    .end
                    .map_or_else(|| MISSING.to_string(), |end| display_time(&end));
                format!(
                    "تم تعديل الميعاد \"{}\" في تقويمك.\nهيبدأ يوم {} الساعة {} وهينتهي الساعة {}.",
                    name, start_date, start_time, end_time
                )
            }
            Ok(EventEdit::NotFound) => not_found(target.label()),
            Ok(EventEdit::Rejected) => EDIT_REJECTED.to_string(),
            Err(error) => {
                tracing::warn!(%error, %event_id, "failed to edit calendar event");
                EDIT_FAILED.to_string()
            }
        }
    }

    async fn delete(&self, target: Option<&EventTarget>) -> String {
        let Some(target) = target else {
            return DELETE_NEEDS_DETAILS.to_string();
        };

        let event_id = match self.resolve(target).await {
            Ok(Some(id)) => id,
            Ok(None) => return not_found(target.label()),
            Err(error) => {
                tracing::warn!(%error, "failed to look up event to delete");
                return DELETE_FAILED.to_string();
            }
        };

        let call = self.service.delete_event(self.user_id, &event_id);
        match with_timeout("calendar delete", self.budget, call).await {
            Ok(true) => format!("✅ تم حذف الحدث \"{}\" من تقويمك.", target.label()),
            Ok(false) => DELETE_REJECTED.to_string(),
            Err(error) => {
                tracing::warn!(%error, %event_id, "failed to delete calendar event");
                DELETE_FAILED.to_string()
            }
        }
    }

    /// Event id for `target`. Summaries match case-insensitively against
    /// the next upcoming events; the earliest match wins.
    async fn resolve(&self, target: &EventTarget) -> Result<Option<String>> {
        let summary = match target {
            EventTarget::Id(id) => return Ok(Some(id.clone())),
            EventTarget::Summary(summary) => summary.to_lowercase(),
        };
        let call = self
            .service
            .list_events(self.user_id, self.now, None, DEFAULT_MAX_RESULTS);
        let events = with_timeout("calendar lookup", self.budget, call).await?;
        Ok(events
            .into_iter()
            .find(|event| event.summary.to_lowercase().contains(&summary))
            .map(|event| event.id))
    }
}

/// One `- summary (when)` line, or `None` when the event is not fully
/// inside `range`
fn render_event(
    event: &CalendarEvent,
    tz: &Tz,
    frame: TimeFrame,
    range: &DateRange,
) -> Option<String> {
    let (day, when) = match event.timing(tz)? {
        EventTiming::Timed { start, end } => {
            if !range.contains_span(start, end) {
                return None;
            }
            let when = format!("من {} إلى {}", display_time(&start), display_time(&end));
            (start.date_naive(), when)
        }
        EventTiming::AllDay { start, end } => {
            let span_start = localize(tz, start.and_time(NaiveTime::MIN))?;
            let span_end = localize(tz, end.and_time(NaiveTime::MIN))?;
            if !range.contains_span(span_start, span_end) {
                return None;
            }
            (start, ALL_DAY.to_string())
        }
    };

    let prefix = if !frame.is_single_day() || day != range.start.date_naive() {
        format!("يوم {} ", display_date(day))
    } else {
        String::new()
    };
    let summary = if event.summary.trim().is_empty() {
        UNTITLED
    } else {
        event.summary.as_str()
    };
    Some(format!("- {} ({}{})", summary, prefix, when))
}
