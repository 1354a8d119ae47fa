//! Keyword table mapping outcome labels to a move in the cash rate.
//!
//! Rules are evaluated top to bottom and the first match wins. Signed or
//! sized moves (`+0.50%`, `Hike 50bp`, `-0.25%`) sit above bare keywords
//! (`cut`, `hike`). A size only counts when it is not part of an absolute
//! level: `3.50%` is a rate, `0.50%` and `-.50%` are moves.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::utils::math::round2;

pub struct RateRule {
    /// Coarse bucket name shared by day-over-day comparisons.
    pub bucket: &'static str,
    pub pattern: Regex,
    /// Change applied to the current cash rate, in percentage points.
    pub delta: f64,
    /// The label itself states the size of the move.
    pub sized: bool,
}

fn rule(bucket: &'static str, pattern: &str, delta: f64, sized: bool) -> RateRule {
    RateRule {
        bucket,
        pattern: Regex::new(pattern).expect("rate rule pattern is a valid regex"),
        delta,
        sized,
    }
}

const BP: &str = r"\s*(?:bps?|basis points?)\b";
const UP: &str = r"(?:hike|raise|increase)";

pub static RATE_RULES: Lazy<Vec<RateRule>> = Lazy::new(|| {
    vec![
        rule("hold", r"(?i)\b(?:hold|no change|unchanged|steady)\b", 0.0, true),
        rule(
            "hike50",
            &format!(
                r"(?i)\+\s*0?\.50?\b|\+\s*50{BP}|\b{UP}\b\D*(?:0?\.50?\b|50{BP})|(?:^|[^\d.])50{BP}\s*{UP}\b"
            ),
            0.50,
            true,
        ),
        rule(
            "hike25",
            &format!(
                r"(?i)\+\s*0?\.25\b|\+\s*25{BP}|\b{UP}\b\D*(?:0?\.25\b|25{BP})|(?:^|[^\d.])25{BP}\s*{UP}\b"
            ),
            0.25,
            true,
        ),
        rule(
            "cut50",
            &format!(r"(?i)(?:^|[^\d.])0?\.50?\b|(?:^|[^\d.])50(?:{BP}|\b)"),
            -0.50,
            true,
        ),
        rule(
            "cut25",
            &format!(r"(?i)(?:^|[^\d.])0?\.25\b|(?:^|[^\d.])25(?:{BP}|\b)"),
            -0.25,
            true,
        ),
        rule("cut25", r"(?i)\bcut\b", -0.25, false),
        rule("hike25", &format!(r"(?i)\b{UP}\b"), 0.25, false),
    ]
});

static PARENTHESISED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\([^)]*\)").expect("parenthesis pattern is a valid regex"));

/// First rule whose pattern matches `text`.
pub fn match_rule(text: &str) -> Option<&'static RateRule> {
    RATE_RULES.iter().find(|r| r.pattern.is_match(text))
}

/// Infer the target rate of a row that carries no explicit rate.
pub fn infer_rate(description: &str, current_rate: f64) -> Option<f64> {
    match_rule(description).map(|r| round2(current_rate + r.delta))
}

/// Bucket an outcome for day-over-day comparison.
///
/// Parenthesised text (usually the absolute target rate) is ignored when
/// matching keywords. Labels matching no sized rule, such as `Cut to 3.50%`,
/// are bucketed by the distance between `target_rate` and `current_rate`.
pub fn bucket_for(description: &str, target_rate: f64, current_rate: f64) -> String {
    let label = PARENTHESISED.replace_all(description, " ");
    match match_rule(&label).filter(|r| r.sized) {
        Some(r) => r.bucket.to_string(),
        None => bucket_from_move(target_rate - current_rate),
    }
}

fn bucket_from_move(delta: f64) -> String {
    let bps = (delta * 100.0).round() as i64;
    match bps {
        0 => "hold".to_string(),
        b if b < 0 => format!("cut{}", -b),
        b => format!("hike{b}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_rate_from_keywords() {
        assert_eq!(infer_rate("Hold", 3.85), Some(3.85));
        assert_eq!(infer_rate("No change", 3.85), Some(3.85));
        assert_eq!(infer_rate("-0.25%", 3.85), Some(3.60));
        assert_eq!(infer_rate("Cut 25bp", 3.85), Some(3.60));
        assert_eq!(infer_rate("-0.50%", 3.85), Some(3.35));
        assert_eq!(infer_rate("50 bps cut", 3.85), Some(3.35));
        assert_eq!(infer_rate("+0.25%", 3.85), Some(4.10));
        assert_eq!(infer_rate("Rate hike", 3.85), Some(4.10));
        assert_eq!(infer_rate("+0.50%", 3.85), Some(4.35));
        assert_eq!(infer_rate("Hike 50bp", 3.85), Some(4.35));
        assert_eq!(infer_rate("50 basis points hike", 3.85), Some(4.35));
        assert_eq!(infer_rate("Raise 25 bps", 3.85), Some(4.10));
        assert_eq!(infer_rate("Emergency meeting", 3.85), None);
    }

    #[test]
    fn first_matching_rule_wins() {
        // "cut" alone would map to 25bp; the 50bp rule sits above it.
        assert_eq!(match_rule("Cut 50bp").map(|r| r.bucket), Some("cut50"));
        assert_eq!(match_rule("Cut").map(|r| r.bucket), Some("cut25"));
        assert_eq!(match_rule("Hold, no cut").map(|r| r.bucket), Some("hold"));
    }

    #[test]
    fn bucket_ignores_parenthesised_rate() {
        assert_eq!(bucket_for("Hold (3.85%)", 3.85, 3.85), "hold");
        assert_eq!(bucket_for("-0.25% (3.50%)", 3.50, 3.75), "cut25");
        assert_eq!(bucket_for("-0.50% (3.35%)", 3.35, 3.85), "cut50");
        assert_eq!(bucket_for("+0.25% (4.10%)", 4.10, 3.85), "hike25");
    }

    #[test]
    fn bucket_falls_back_to_rate_distance() {
        assert_eq!(bucket_for("3.85%", 3.85, 3.85), "hold");
        assert_eq!(bucket_for("3.10%", 3.10, 3.85), "cut75");
        assert_eq!(bucket_for("4.35%", 4.35, 3.85), "hike50");
    }

    #[test]
    fn absolute_levels_are_not_moves() {
        assert_eq!(bucket_for("Cut to 3.50%", 3.50, 3.75), "cut25");
        assert_eq!(bucket_for("Cut to 3.25%", 3.25, 3.75), "cut50");
        assert_eq!(bucket_for("3.50%", 3.50, 3.75), "cut25");
        assert_eq!(bucket_for("Hike to 4.50%", 4.50, 3.75), "hike75");
        assert_eq!(bucket_for("Hike to 4.25%", 4.25, 3.75), "hike50");
        assert!(match_rule("3.50%").is_none());
        assert!(match_rule("4.25%").is_none());
    }

    #[test]
    fn bare_keywords_defer_to_rate_distance() {
        assert_eq!(bucket_for("Cut", 3.35, 3.85), "cut50");
        assert_eq!(bucket_for("Rate hike", 4.10, 3.85), "hike25");
        assert_eq!(bucket_for("+0.50% (4.35%)", 4.35, 3.85), "hike50");
    }
}
