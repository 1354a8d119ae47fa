use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::debug;

use crate::client::RawDocument;
use crate::snapshot::{upsert_outcome, RateOutcome};
use crate::utils::math::is_valid_probability;

use super::rules::infer_rate;
use super::text::{last_percentage, normalize_ws, parse_probability, parse_rate};

/// HTML structures that may hold the probability rows, highest priority first.
struct HtmlSignature {
    name: &'static str,
    selector: &'static str,
    /// Only accept a match whose visible text mentions an outcome keyword.
    needs_keyword: bool,
}

const HTML_SIGNATURES: &[HtmlSignature] = &[
    HtmlSignature {
        name: "probability-table",
        selector: "table.rate-probability-table",
        needs_keyword: false,
    },
    HtmlSignature {
        name: "rate-tracker-data",
        selector: "#rate-tracker-data",
        needs_keyword: false,
    },
    HtmlSignature {
        name: "keyword-table",
        selector: "table",
        needs_keyword: true,
    },
];

const OUTCOME_KEYWORDS: &[&str] = &["hold", "no change", "cut", "hike", "probability"];

/// Row selectors inside a matched structure, first non-empty one wins.
const ROW_SELECTORS: &[&str] = &["tr", "li", "[data-outcome]", ".outcome"];

/// JSON record layouts: (array key, description key, rate key, probability key).
const JSON_SIGNATURES: &[(&str, &str, &str, &str)] = &[
    ("outcomes", "description", "target_rate", "probability"),
    ("probabilities", "outcome", "rate", "probability"),
];

/// Outcome rows found in one document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OutcomeExtraction {
    pub outcomes: Vec<RateOutcome>,
    /// Name of the matched structure; `None` when no signature matched.
    pub structure: Option<&'static str>,
}

/// Locates and parses rate outcomes, tolerating layout variation.
#[derive(Clone, Debug)]
pub struct OutcomeExtractor {
    current_rate: f64,
}

impl OutcomeExtractor {
    pub fn new(current_rate: f64) -> Self {
        Self { current_rate }
    }

    pub fn extract(&self, document: &RawDocument) -> OutcomeExtraction {
        match document {
            RawDocument::Html(html) => self.extract_html(html),
            RawDocument::Json(value) => self.extract_json(value),
        }
    }

    fn extract_html(&self, html: &str) -> OutcomeExtraction {
        let doc = Html::parse_document(html);

        for sig in HTML_SIGNATURES {
            let Ok(selector) = Selector::parse(sig.selector) else {
                continue;
            };
            let found = doc.select(&selector).find(|el| {
                !sig.needs_keyword || {
                    let text = el.text().collect::<String>().to_lowercase();
                    OUTCOME_KEYWORDS.iter().any(|k| text.contains(k))
                }
            });
            if let Some(structure) = found {
                debug!(target: "extract", structure = sig.name, "probability structure found");
                return OutcomeExtraction {
                    outcomes: self.parse_rows(structure),
                    structure: Some(sig.name),
                };
            }
        }

        debug!(target: "extract", "no probability structure found");
        OutcomeExtraction::default()
    }

    fn parse_rows(&self, structure: ElementRef<'_>) -> Vec<RateOutcome> {
        let mut outcomes = Vec::new();
        let rows = ROW_SELECTORS
            .iter()
            .filter_map(|s| Selector::parse(s).ok())
            .map(|sel| structure.select(&sel).collect::<Vec<_>>())
            .find(|rows| !rows.is_empty())
            .unwrap_or_default();

        for row in rows {
            if let Some(outcome) = self.parse_html_row(row) {
                upsert_outcome(&mut outcomes, outcome);
            }
        }
        outcomes
    }

    fn parse_html_row(&self, row: ElementRef<'_>) -> Option<RateOutcome> {
        let cells: Vec<String> = Selector::parse("td")
            .ok()
            .map(|td| {
                row.select(&td)
                    .map(|c| normalize_ws(&c.text().collect::<String>()))
                    .collect()
            })
            .unwrap_or_default();

        let (description, probability) = if cells.len() >= 2 {
            (cells[0].clone(), parse_probability(&cells[1])?)
        } else {
            let text = normalize_ws(&row.text().collect::<String>());
            let (probability, start) = last_percentage(&text)?;
            let description = text[..start]
                .trim()
                .trim_end_matches(|c: char| matches!(c, ':' | '|' | '-' | '–'))
                .trim()
                .to_string();
            (description, probability)
        };

        self.build(description, None, probability)
    }

    fn extract_json(&self, value: &Value) -> OutcomeExtraction {
        for &(key, desc_key, rate_key, prob_key) in JSON_SIGNATURES {
            let Some(records) = value.get(key).and_then(Value::as_array) else {
                continue;
            };
            let mut outcomes = Vec::new();
            for record in records {
                let Some(description) = record.get(desc_key).and_then(Value::as_str) else {
                    continue;
                };
                let Some(probability) = record.get(prob_key).and_then(json_percent) else {
                    continue;
                };
                let rate = record.get(rate_key).and_then(json_percent);
                if let Some(outcome) = self.build(normalize_ws(description), rate, probability) {
                    upsert_outcome(&mut outcomes, outcome);
                }
            }
            return OutcomeExtraction {
                outcomes,
                structure: Some(key),
            };
        }
        OutcomeExtraction::default()
    }

    /// Validate one row and derive its rate when the source left it out.
    fn build(&self, description: String, rate: Option<f64>, probability: f64) -> Option<RateOutcome> {
        if description.is_empty() {
            return None;
        }
        if !is_valid_probability(probability) {
            debug!(target: "extract", %description, probability, "probability out of range, row dropped");
            return None;
        }
        let rate = rate
            .filter(|r| r.is_finite())
            .or_else(|| parse_rate(&description))
            .or_else(|| infer_rate(&description, self.current_rate));
        let Some(rate) = rate.filter(|r| r.is_finite()) else {
            debug!(target: "extract", %description, "no rate for row, row dropped");
            return None;
        };
        Some(RateOutcome::new(description, rate, probability))
    }
}

/// Finite number or `"97%"`-style string.
fn json_percent(v: &Value) -> Option<f64> {
    let value = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_probability(s).or_else(|| s.trim().parse().ok()),
        _ => None,
    };
    value.filter(|x| x.is_finite())
}
