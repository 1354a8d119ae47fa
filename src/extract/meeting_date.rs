use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use serde_json::Value;
use tracing::debug;

use crate::client::RawDocument;
use crate::types::MarketConfig;
use crate::utils::time::parse_day_month_year;

const DATE: &str = r"(\d{1,2}(?:st|nd|rd|th)?\s+[A-Za-z]{3,9}\.?,?\s+\d{4})";

/// Labelled-date patterns, highest priority first. Only the first match of
/// each pattern is considered.
static DATE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        format!(r"(?i)next\s+(?:rba\s+)?meeting:?\s*{DATE}"),
        format!(r"(?i){DATE}\s+rba"),
        format!(r"(?i)meeting\s+date:?\s*{DATE}"),
        format!(r"(?i)(?:mon|tues|wednes|thurs|fri|satur|sun)day,?\s+{DATE}"),
    ]
    .iter()
    .map(|p| Regex::new(p).expect("meeting date pattern is a valid regex"))
    .collect()
});

/// Where the returned meeting date came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DateOrigin {
    Document,
    Calendar,
    Default,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeetingDate {
    pub date: NaiveDate,
    pub origin: DateOrigin,
}

impl MeetingDate {
    pub fn extracted(&self) -> bool {
        self.origin == DateOrigin::Document
    }
}

/// Finds the next scheduled decision date; never fails.
#[derive(Clone, Debug)]
pub struct MeetingDateExtractor {
    calendar: Vec<NaiveDate>,
    default: NaiveDate,
}

impl MeetingDateExtractor {
    pub fn new(mut calendar: Vec<NaiveDate>, default: NaiveDate) -> Self {
        calendar.sort();
        Self { calendar, default }
    }

    pub fn from_config(cfg: &MarketConfig) -> Self {
        Self::new(cfg.meeting_calendar.clone(), cfg.default_next_meeting)
    }

    pub fn extract(&self, document: &RawDocument, today: NaiveDate) -> MeetingDate {
        let found = match document {
            RawDocument::Html(html) => {
                let text = Html::parse_document(html)
                    .root_element()
                    .text()
                    .collect::<Vec<_>>()
                    .join(" ");
                search_text(&text)
            }
            RawDocument::Json(value) => from_json(value),
        };

        match found {
            Some(date) => MeetingDate {
                date,
                origin: DateOrigin::Document,
            },
            None => {
                debug!(target: "extract", "no meeting date in document, using configured schedule");
                self.scheduled(today)
            }
        }
    }

    /// First calendar meeting on or after `today`, else the configured default.
    pub fn scheduled(&self, today: NaiveDate) -> MeetingDate {
        match self.calendar.iter().find(|d| **d >= today) {
            Some(date) => MeetingDate {
                date: *date,
                origin: DateOrigin::Calendar,
            },
            None => MeetingDate {
                date: self.default,
                origin: DateOrigin::Default,
            },
        }
    }
}

/// Try each labelled pattern in turn; an unparseable date moves on to the next.
pub fn search_text(text: &str) -> Option<NaiveDate> {
    DATE_PATTERNS.iter().find_map(|re| {
        let raw = re.captures(text)?.get(1)?.as_str();
        let parsed = parse_day_month_year(raw);
        if parsed.is_none() {
            debug!(target: "extract", raw, "matched meeting date did not parse");
        }
        parsed
    })
}

fn from_json(value: &Value) -> Option<NaiveDate> {
    if let Some(date) = value
        .get("next_meeting_date")
        .or_else(|| value.get("nextMeeting"))
        .and_then(Value::as_str)
        .and_then(|s| NaiveDate::parse_from_str(s.get(..10)?, "%Y-%m-%d").ok())
    {
        return Some(date);
    }
    let mut strings = Vec::new();
    collect_strings(value, &mut strings);
    search_text(&strings.join(" "))
}

fn collect_strings<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn extractor() -> MeetingDateExtractor {
        MeetingDateExtractor::new(vec![d(2025, 8, 12), d(2025, 7, 8)], d(2026, 2, 17))
    }

    fn html(body: &str) -> RawDocument {
        RawDocument::Html(format!("<html><body>{body}</body></html>"))
    }

    #[test]
    fn labelled_next_meeting() {
        let got = extractor().extract(
            &html("<p>Next RBA Meeting: 8 July 2025</p>"),
            d(2025, 6, 1),
        );
        assert_eq!(got, MeetingDate { date: d(2025, 7, 8), origin: DateOrigin::Document });
    }

    #[test]
    fn date_split_across_elements() {
        let got = extractor().extract(
            &html("<div>Meeting Date:</div><span>12 Aug 2025</span>"),
            d(2025, 6, 1),
        );
        assert_eq!(got.date, d(2025, 8, 12));
        assert!(got.extracted());
    }

    #[test]
    fn date_before_rba_keyword_and_weekday() {
        assert_eq!(search_text("Decision on 30 September 2025 RBA board"), Some(d(2025, 9, 30)));
        assert_eq!(search_text("Tuesday, 18th November 2025"), Some(d(2025, 11, 18)));
    }

    #[test]
    fn unparseable_match_falls_through_to_next_pattern() {
        // First pattern matches an impossible date; the weekday pattern still succeeds.
        let text = "Next meeting: 41 Smarch 2025. Tuesday 16 December 2025";
        assert_eq!(search_text(text), Some(d(2025, 12, 16)));
    }

    #[test]
    fn no_match_uses_calendar_then_default() {
        let ex = extractor();
        let none = html("<p>Rates</p>");
        assert_eq!(
            ex.extract(&none, d(2025, 7, 9)),
            MeetingDate { date: d(2025, 8, 12), origin: DateOrigin::Calendar }
        );
        assert_eq!(ex.extract(&none, d(2025, 7, 8)).date, d(2025, 7, 8));
        assert_eq!(
            ex.extract(&none, d(2025, 9, 1)),
            MeetingDate { date: d(2026, 2, 17), origin: DateOrigin::Default }
        );
    }

    #[test]
    fn json_field_then_text() {
        let ex = extractor();
        assert_eq!(
            ex.extract(&RawDocument::Json(json!({"next_meeting_date": "2025-11-18"})), d(2025, 1, 1))
                .date,
            d(2025, 11, 18)
        );
        assert_eq!(
            ex.extract(
                &RawDocument::Json(json!({"meta": {"note": "Next meeting 16 Dec 2025"}})),
                d(2025, 1, 1)
            )
            .date,
            d(2025, 12, 16)
        );
        assert_eq!(
            ex.extract(&RawDocument::Json(json!({"next_meeting_date": null})), d(2025, 1, 1))
                .origin,
            DateOrigin::Calendar
        );
    }
}
