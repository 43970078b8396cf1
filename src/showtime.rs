//! Showtime labels: parsing free text into timestamps and formatting them back.
//!
//! A label combines an optional weekday and date with a mandatory `HH:MM`
//! time, e.g. `"Τρίτη 11 Μαρ. 20:00"`, `"Κυριακή 9 21:30"` or `"18:15"`.
//! Resolution never looks further ahead than the reference year, except for
//! a January label read in December.

use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::{Match, Regex};
use serde::Serialize;
use tracing::debug;

/// Month abbreviations, January first.
pub static GREEK_MONTHS: [&str; 12] = [
    "Ιαν", "Φεβ", "Μαρ", "Απρ", "Μαΐ", "Ιουν", "Ιουλ", "Αυγ", "Σεπ", "Οκτ", "Νοε", "Δεκ",
];

/// Weekday names, Monday first.
pub static GREEK_WEEKDAYS: [&str; 7] = [
    "Δευτέρα",
    "Τρίτη",
    "Τετάρτη",
    "Πέμπτη",
    "Παρασκευή",
    "Σάββατο",
    "Κυριακή",
];

pub const TOMORROW_LABEL: &str = "Αύριο";

static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2}):(\d{2})").expect("time pattern compiles"));

// Optional day name, day number, optional month token.
static DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:(\p{Greek}+)[.,]?\s*)?(\d{1,2})(?:\s*([\p{Greek}.]+))?")
        .expect("date pattern compiles")
});

/// How much of the date came from the label itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Confidence {
    /// Day number and month both read from the label.
    Exact,
    /// Day number read, month and year taken from the reference time.
    MonthInferred,
    /// No date in the label, the reference day is assumed.
    FallbackToday,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedShowtime {
    pub timestamp: NaiveDateTime,
    pub confidence: Confidence,
}

/// Sort key of a showtime; labels without a time sort after every timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SortValue {
    At(NaiveDateTime),
    Last,
}

/// The pieces of a label, borrowed from the raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Tokens<'a> {
    time: NaiveTime,
    day_name: Option<&'a str>,
    day: Option<u32>,
    month_token: Option<&'a str>,
    /// 1-based, only for abbreviations found in [`GREEK_MONTHS`].
    month: Option<u32>,
}

impl<'a> Tokens<'a> {
    fn scan(raw: &'a str) -> Option<Self> {
        let (time, span) = TIME_RE.captures_iter(raw).find_map(|caps| {
            let hour: u32 = caps[1].parse().ok()?;
            let minute: u32 = caps[2].parse().ok()?;
            let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
            caps.get(0).map(|m| (time, m))
        })?;

        // The time token is cut out first so its hour never reads as a day number.
        let date = DATE_RE
            .captures(&raw[..span.start()])
            .or_else(|| DATE_RE.captures(&raw[span.end()..]));

        let mut tokens = Tokens {
            time,
            day_name: None,
            day: None,
            month_token: None,
            month: None,
        };
        if let Some(caps) = date {
            tokens.day_name = caps.get(1).map(|m| m.as_str());
            tokens.day = caps.get(2).and_then(|m| m.as_str().parse().ok());
            tokens.month_token = caps.get(3).map(trim_month).filter(|m| !m.is_empty());
            tokens.month = tokens.month_token.and_then(month_number);
        }
        Some(tokens)
    }

    fn resolve(&self, now: NaiveDateTime) -> ResolvedShowtime {
        let today = now.date();
        let date = match (self.day, self.month) {
            (Some(day), Some(month)) => {
                let year = if today.month() == 12 && month == 1 {
                    today.year() + 1
                } else {
                    today.year()
                };
                day_of_month(year, month, day).map(|d| (d, Confidence::Exact))
            }
            (Some(day), None) => day_of_month(today.year(), today.month(), day)
                .map(|d| (d, Confidence::MonthInferred)),
            _ => None,
        };
        let (date, confidence) = date.unwrap_or((today, Confidence::FallbackToday));

        ResolvedShowtime {
            timestamp: date.and_time(self.time),
            confidence,
        }
    }
}

fn trim_month<'a>(m: Match<'a>) -> &'a str {
    m.as_str().trim_matches('.')
}

fn month_number(token: &str) -> Option<u32> {
    let token = token.replace('.', "").to_lowercase();
    GREEK_MONTHS
        .iter()
        .position(|m| m.to_lowercase() == token)
        .map(|i| i as u32 + 1)
}

/// Day `day` counted from the first of the month; out-of-range days spill
/// into the neighbouring month.
fn day_of_month(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    match day {
        0 => first.pred_opt(),
        _ => first.checked_add_days(Days::new(u64::from(day - 1))),
    }
}

/// Resolves a showtime label against `now`.
///
/// Returns `None` when the label has no `HH:MM` token.
pub fn parse(raw: &str, now: NaiveDateTime) -> Option<ResolvedShowtime> {
    Tokens::scan(raw).map(|t| t.resolve(now))
}

/// Renders a label relative to `now`: bare time for today, `Αύριο HH:MM` for
/// tomorrow, a dated label otherwise.
pub fn format(raw: &str, now: NaiveDateTime) -> Option<String> {
    let tokens = Tokens::scan(raw)?;
    let resolved = tokens.resolve(now).timestamp;
    let time = tokens.time.format("%H:%M");
    let date = resolved.date();
    let today = now.date();

    if date == today {
        return Some(time.to_string());
    }
    if today.succ_opt() == Some(date) {
        return Some(format!("{TOMORROW_LABEL} {time}"));
    }

    let label = match (tokens.day_name, tokens.day) {
        (Some(day_name), Some(day)) => {
            let month = tokens
                .month_token
                .unwrap_or(GREEK_MONTHS[date.month0() as usize]);
            format!("{day_name} {day} {month}")
        }
        _ => date_label(date),
    };
    Some(format!("{label} {time}"))
}

/// `"Τετάρτη 12 Μαρ"`.
pub fn date_label(date: NaiveDate) -> String {
    let weekday = GREEK_WEEKDAYS[date.weekday().num_days_from_monday() as usize];
    format!(
        "{} {} {}",
        weekday,
        date.day(),
        GREEK_MONTHS[date.month0() as usize]
    )
}

/// A raw showtime string together with its resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShowtimeRecord {
    pub raw: String,
    pub resolved: Option<ResolvedShowtime>,
}

impl ShowtimeRecord {
    pub fn new(raw: impl Into<String>, now: NaiveDateTime) -> Self {
        let raw = raw.into();
        let resolved = parse(&raw, now);
        if resolved.is_none() {
            debug!(raw = %raw, "showtime without HH:MM, sorting last");
        }
        Self { raw, resolved }
    }

    pub fn sort_value(&self) -> SortValue {
        match self.resolved {
            Some(r) => SortValue::At(r.timestamp),
            None => SortValue::Last,
        }
    }

    /// False for labels shown as raw text only.
    pub fn is_parseable(&self) -> bool {
        self.resolved.is_some()
    }

    /// Relative label, or the raw text when it could not be parsed.
    pub fn label(&self, now: NaiveDateTime) -> String {
        format(&self.raw, now).unwrap_or_else(|| self.raw.clone())
    }
}
