use chrono::{
    DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike,
};
use chrono_tz::Tz;

use crate::services::retrieval::strip_diacritics;

const ARABIC_WEEKDAYS: [&str; 7] = [
    "الاثنين",
    "الثلاثاء",
    "الأربعاء",
    "الخميس",
    "الجمعة",
    "السبت",
    "الأحد",
];

const ARABIC_MONTHS: [&str; 12] = [
    "يناير",
    "فبراير",
    "مارس",
    "أبريل",
    "مايو",
    "يونيو",
    "يوليو",
    "أغسطس",
    "سبتمبر",
    "أكتوبر",
    "نوفمبر",
    "ديسمبر",
];

/// Default hour for events that name a day but no time
const DEFAULT_EVENT_HOUR: u32 = 9;
const UPCOMING_DAYS: i64 = 30;

/// Half-open `[start, end)` range in the target timezone
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DateRange {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

impl DateRange {
    /// True when `[start, end]` of an event sits fully inside this range
    pub fn contains_span(&self, start: DateTime<Tz>, end: DateTime<Tz>) -> bool {
        start >= self.start && end <= self.end
    }
}

/// Relative calendar windows a user can ask about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFrame {
    Today,
    Tomorrow,
    ThisWeek,
    NextWeek,
    ThisMonth,
    NextMonth,
    /// From now until thirty days ahead
    Upcoming,
    /// One explicit civil day
    Date(NaiveDate),
}

impl TimeFrame {
    /// Parses the parser's `time_frame` value (English keys, common Egyptian
    /// phrasings, or an explicit `YYYY-MM-DD`)
    pub fn parse(value: &str) -> Option<Self> {
        let lowered = value.trim().to_lowercase();
        let normalized = lowered.replace(['_', '-'], " ");
        let frame = match normalized.as_str() {
            "today" | "النهاردة" | "النهارده" | "اليوم" => Self::Today,
            "tomorrow" | "بكرة" | "بكره" | "غدا" | "غداً" => Self::Tomorrow,
            "this week" | "الأسبوع ده" | "هذا الأسبوع" => Self::ThisWeek,
            "next week" | "الأسبوع الجاي" | "الأسبوع القادم" => Self::NextWeek,
            "this month" | "الشهر ده" | "هذا الشهر" => Self::ThisMonth,
            "next month" | "الشهر الجاي" | "الشهر القادم" => Self::NextMonth,
            "upcoming" | "الجاي" | "اللي جاي" => Self::Upcoming,
            _ => {
                let date = NaiveDate::parse_from_str(lowered.as_str(), "%Y-%m-%d").ok()?;
                Self::Date(date)
            }
        };
        Some(frame)
    }

    /// Resolves this frame to an absolute range anchored at `now`
    pub fn range(self, now: DateTime<Tz>) -> Option<DateRange> {
        let tz = now.timezone();
        let today = now.date_naive();
        let (start_day, end_day) = match self {
            Self::Today => (today, today + Duration::days(1)),
            Self::Tomorrow => (today + Duration::days(1), today + Duration::days(2)),
            Self::ThisWeek => {
                let monday = week_start(today);
                (monday, monday + Duration::days(7))
            }
            Self::NextWeek => {
                let monday = week_start(today) + Duration::days(7);
                (monday, monday + Duration::days(7))
            }
            Self::ThisMonth => month_bounds(today.year(), today.month())?,
            Self::NextMonth => {
                let (year, month) = next_month(today.year(), today.month());
                month_bounds(year, month)?
            }
            Self::Upcoming => {
                return Some(DateRange {
                    start: now,
                    end: now + Duration::days(UPCOMING_DAYS),
                });
            }
            Self::Date(date) => (date, date + Duration::days(1)),
        };
        Some(DateRange {
            start: local_midnight(&tz, start_day)?,
            end: local_midnight(&tz, end_day)?,
        })
    }

    /// Whether this frame covers exactly one civil day
    pub fn is_single_day(self) -> bool {
        matches!(self, Self::Today | Self::Tomorrow | Self::Date(_))
    }

    /// Egyptian-Arabic phrase used in list replies
    pub fn arabic_label(self) -> String {
        match self {
            Self::Today => "النهاردة".to_string(),
            Self::Tomorrow => "بكرة".to_string(),
            Self::ThisWeek => "هذا الأسبوع".to_string(),
            Self::NextWeek => "الأسبوع الجاي".to_string(),
            Self::ThisMonth => "هذا الشهر".to_string(),
            Self::NextMonth => "الشهر الجاي".to_string(),
            Self::Upcoming => "الأيام الجاية".to_string(),
            Self::Date(date) => format!("يوم {}", display_date(date)),
        }
    }
}

/// Parses a timezone name such as `Africa/Cairo`
pub fn parse_timezone(name: &str) -> color_eyre::Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|error| color_eyre::eyre::eyre!("Unknown timezone '{}': {}", name, error))
}

/// Current wall-clock time in `tz`
pub fn now_in(tz: Tz) -> DateTime<Tz> {
    chrono::Utc::now().with_timezone(&tz)
}

/// Maps a local wall-clock time onto `tz`, stepping over DST gaps
pub fn localize(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
}

fn local_midnight(tz: &Tz, date: NaiveDate) -> Option<DateTime<Tz>> {
    localize(tz, date.and_time(NaiveTime::MIN))
}

/// Monday of the week containing `date`
fn week_start(date: NaiveDate) -> NaiveDate {
    let days_from_monday = i64::from(date.weekday().num_days_from_monday());
    date - Duration::days(days_from_monday)
}

// Month range helpers

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

/// First day of the month and first day of the following month
fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let (next_year, following) = next_month(year, month);
    let end = NaiveDate::from_ymd_opt(next_year, following, 1)?;
    Some((start, end))
}

// Relative day words

/// Lowercased words of `text` with Arabic diacritics removed
fn day_words(text: &str) -> Vec<String> {
    strip_diacritics(&text.to_lowercase())
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolves "today"/"tomorrow"/"day after tomorrow" words (English or
/// Egyptian Arabic) appearing as whole words in `text`
pub fn resolve_relative_day(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let words = day_words(text);
    let has = |candidates: &[&str]| words.iter().any(|word| candidates.contains(&word.as_str()));
    let has_pair = |first: &str, seconds: &[&str]| {
        words
            .windows(2)
            .any(|pair| matches!(pair, [a, b] if a == first && seconds.contains(&b.as_str())))
    };

    if has_pair("بعد", &TOMORROW_WORDS) || has_pair("after", &["tomorrow"]) {
        return Some(today + Duration::days(2));
    }
    if has(&TOMORROW_WORDS) {
        return Some(today + Duration::days(1));
    }
    if has(&TODAY_WORDS) {
        return Some(today);
    }
    None
}

const TOMORROW_WORDS: [&str; 5] = ["tomorrow", "بكرة", "بكره", "بكرا", "غدا"];
const TODAY_WORDS: [&str; 4] = ["today", "النهاردة", "النهارده", "اليوم"];

// Clock times

const PM_MARKERS: [&str; 6] = ["pm", "p.m.", "م", "مساء", "مساءا", "بالليل"];
const AM_MARKERS: [&str; 6] = ["am", "a.m.", "ص", "صباحا", "صباح", "الصبح"];
const CLOCK_FILLERS: [&str; 3] = ["at", "الساعة", "الساعه"];

#[derive(Debug, Clone, Copy, PartialEq)]
enum Meridiem {
    Am,
    Pm,
}

fn meridiem(word: &str) -> Option<Meridiem> {
    if PM_MARKERS.contains(&word) {
        Some(Meridiem::Pm)
    } else if AM_MARKERS.contains(&word) {
        Some(Meridiem::Am)
    } else {
        None
    }
}

/// `17:00`, `5:00` or `5:00pm`
fn clock_token(word: &str) -> Option<(NaiveTime, Option<Meridiem>)> {
    let (digits, marker) = match word.strip_suffix("pm") {
        Some(rest) => (rest, Some(Meridiem::Pm)),
        None => match word.strip_suffix("am") {
            Some(rest) => (rest, Some(Meridiem::Am)),
            None => (word, None),
        },
    };
    NaiveTime::parse_from_str(digits, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(digits, "%H:%M"))
        .ok()
        .map(|time| (time, marker))
}

fn apply_meridiem(time: NaiveTime, marker: Option<Meridiem>) -> NaiveTime {
    match marker {
        Some(Meridiem::Pm) if time.hour() < 12 => time + Duration::hours(12),
        Some(Meridiem::Am) if time.hour() == 12 => time - Duration::hours(12),
        _ => time,
    }
}

/// A clock time found in free text
#[derive(Debug, Clone, Copy, PartialEq)]
struct ClockReading {
    time: NaiveTime,
    /// Nothing but the time, its AM/PM marker and filler words
    standalone: bool,
}

fn read_clock(text: &str) -> Option<ClockReading> {
    let mut time = None;
    let mut marker = None;
    let mut standalone = true;

    let lowered = strip_diacritics(&text.to_lowercase());
    for word in lowered.split(|c: char| c.is_whitespace() || c == ',').filter(|w| !w.is_empty()) {
        if time.is_none() {
            if let Some((found, attached)) = clock_token(word) {
                time = Some(found);
                marker = marker.or(attached);
                continue;
            }
        }
        if let Some(found) = meridiem(word) {
            marker = marker.or(Some(found));
        } else if !CLOCK_FILLERS.contains(&word) {
            standalone = false;
        }
    }

    time.map(|time| ClockReading {
        time: apply_meridiem(time, marker),
        standalone,
    })
}

/// Parses an event timestamp produced by the calendar parser.
///
/// Accepts ISO datetimes, a bare date (defaults to 09:00), a bare clock
/// time (today), or a whole-word relative day with an optional clock time.
/// Timestamps are read as local wall-clock time in `now`'s timezone; an
/// attached offset is ignored so a stale one cannot move the event.
/// Anything else is `None` rather than a guess.
pub fn parse_event_datetime(value: &str, now: DateTime<Tz>) -> Option<DateTime<Tz>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let tz = now.timezone();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return localize(&tz, parsed.naive_local());
    }

    let naive_formats = [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];
    for format in naive_formats {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return localize(&tz, naive);
        }
    }

    let default_time = NaiveTime::from_hms_opt(DEFAULT_EVENT_HOUR, 0, 0)?;
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return localize(&tz, date.and_time(default_time));
    }

    let today = now.date_naive();
    let clock = read_clock(trimmed);
    if let Some(day) = resolve_relative_day(trimmed, today) {
        let time = clock.map_or(default_time, |reading| reading.time);
        return localize(&tz, day.and_time(time));
    }
    match clock {
        Some(ClockReading {
            time,
            standalone: true,
        }) => localize(&tz, today.and_time(time)),
        _ => None,
    }
}

/// Parses an RFC3339 timestamp from the calendar API into `tz`
pub fn parse_rfc3339_in(value: &str, tz: &Tz) -> Option<DateTime<Tz>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|parsed| parsed.with_timezone(tz))
}

// Display helpers

/// 12-hour clock with `ص`/`م` markers, e.g. `5:00 م`
pub fn display_time<T: Timelike>(time: &T) -> String {
    let hour = time.hour();
    let minute = time.minute();
    let (hour_12, period) = match hour {
        0 => (12, "ص"),
        1..=11 => (hour, "ص"),
        12 => (12, "م"),
        _ => (hour - 12, "م"),
    };
    format!("{}:{:02} {}", hour_12, minute, period)
}

/// Arabic long date, e.g. `الأربعاء 30 يوليو 2025`
pub fn display_date(date: NaiveDate) -> String {
    let weekday_index = date.weekday().num_days_from_monday() as usize;
    let month_index = date.month0() as usize;
    let weekday = ARABIC_WEEKDAYS.get(weekday_index).copied().unwrap_or_default();
    let month = ARABIC_MONTHS.get(month_index).copied().unwrap_or_default();
    format!("{} {} {} {}", weekday, date.day(), month, date.year())
}
