use once_cell::sync::Lazy;
use regex::Regex;

/// Any `<number>%`, with an optional leading sign.
static PERCENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([+-]?)(\d+(?:\.\d+)?)\s*%").expect("percent pattern is a valid regex")
});

/// A rate written in parentheses, e.g. `(3.85%)`.
static PAREN_RATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\(\s*(\d+(?:\.\d+)?)\s*%\s*\)").expect("rate pattern is a valid regex")
});

/// Collapse runs of whitespace (including nbsp) into single spaces.
pub fn normalize_ws(s: &str) -> String {
    s.split(|c: char| c.is_whitespace() || c == '\u{a0}')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn signed_value(caps: &regex::Captures<'_>) -> Option<f64> {
    let value: f64 = caps.get(2)?.as_str().parse().ok()?;
    match caps.get(1).map(|m| m.as_str()) {
        Some("-") => Some(-value),
        _ => Some(value),
    }
}

/// First percentage in `text`; signed so negative readings can be rejected.
pub fn parse_probability(text: &str) -> Option<f64> {
    PERCENT.captures(text).and_then(|caps| signed_value(&caps))
}

/// Last percentage in `text` with the byte offset where it starts.
pub fn last_percentage(text: &str) -> Option<(f64, usize)> {
    let caps = PERCENT.captures_iter(text).last()?;
    let start = caps.get(0)?.start();
    Some((signed_value(&caps)?, start))
}

/// Absolute rate level mentioned in an outcome label.
///
/// Prefers a parenthesised figure; otherwise the first unsigned decimal
/// percentage. Signed figures such as `-0.25%` describe a move, not a level.
pub fn parse_rate(text: &str) -> Option<f64> {
    if let Some(rate) = PAREN_RATE
        .captures(text)
        .and_then(|caps| caps.get(1)?.as_str().parse().ok())
    {
        return Some(rate);
    }
    PERCENT
        .captures_iter(text)
        .filter(|caps| caps.get(1).map_or(true, |m| m.as_str().is_empty()))
        .filter_map(|caps| caps.get(2))
        .filter(|m| m.as_str().contains('.'))
        .find_map(|m| m.as_str().parse().ok())
}
