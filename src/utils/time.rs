use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use chrono_tz::Tz;

/// Express a UTC instant in the market timezone, keeping the offset explicit.
pub fn to_market_time(ts: DateTime<Utc>, tz: Tz) -> DateTime<FixedOffset> {
    ts.with_timezone(&tz).fixed_offset()
}

/// Calendar date in the market timezone for a UTC instant.
pub fn market_date(ts: DateTime<Utc>, tz: Tz) -> NaiveDate {
    ts.with_timezone(&tz).date_naive()
}

/// Parse text like `8 July 2025`, `18th Feb 2025` or `1 April, 2025`.
pub fn parse_day_month_year(raw: &str) -> Option<NaiveDate> {
    let cleaned: Vec<String> = raw
        .split_whitespace()
        .map(|part| part.trim_matches(|c: char| c == ',' || c == '.'))
        .filter(|part| !part.is_empty())
        .map(strip_ordinal)
        .collect();
    if cleaned.len() != 3 {
        return None;
    }
    let text = cleaned.join(" ");
    NaiveDate::parse_from_str(&text, "%d %B %Y")
        .or_else(|_| NaiveDate::parse_from_str(&text, "%d %b %Y"))
        .ok()
}

fn strip_ordinal(part: &str) -> String {
    let lower = part.to_ascii_lowercase();
    for suffix in ["st", "nd", "rd", "th"] {
        if let Some(num) = lower.strip_suffix(suffix) {
            if !num.is_empty() && num.chars().all(|c| c.is_ascii_digit()) {
                return num.to_string();
            }
        }
    }
    part.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_time_keeps_sydney_offset() {
        let ts = DateTime::parse_from_rfc3339("2025-07-01T02:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let local = to_market_time(ts, chrono_tz::Australia::Sydney);
        assert_eq!(local.to_rfc3339(), "2025-07-01T12:00:00+10:00");

        let summer = DateTime::parse_from_rfc3339("2025-01-10T02:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let local = to_market_time(summer, chrono_tz::Australia::Sydney);
        assert_eq!(local.offset().local_minus_utc(), 11 * 3600);
    }

    #[test]
    fn test_market_date_crosses_midnight() {
        let ts = DateTime::parse_from_rfc3339("2025-07-01T15:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            market_date(ts, chrono_tz::Australia::Sydney),
            NaiveDate::from_ymd_opt(2025, 7, 2).unwrap()
        );
    }

    #[test]
    fn test_parse_day_month_year_variants() {
        let expected = NaiveDate::from_ymd_opt(2025, 7, 8).unwrap();
        assert_eq!(parse_day_month_year("8 July 2025"), Some(expected));
        assert_eq!(parse_day_month_year("08 Jul 2025"), Some(expected));
        assert_eq!(parse_day_month_year("8th July, 2025"), Some(expected));
        assert_eq!(parse_day_month_year("31 February 2025"), None);
        assert_eq!(parse_day_month_year("8 Julember 2025"), None);
        assert_eq!(parse_day_month_year("July 2025"), None);
    }
}
