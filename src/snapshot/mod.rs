use chrono::{DateTime, FixedOffset, NaiveDate};

pub mod delta;
pub mod normalize;

pub use delta::{BucketChange, DailyDelta, Direction};
pub use normalize::Normalizer;

use crate::utils::math::implied_odds;

/// One possible decision outcome at the next meeting.
#[derive(Clone, Debug, PartialEq)]
pub struct RateOutcome {
    /// Label as found in the source, e.g. "Hold (3.85%)".
    pub description: String,
    /// Cash rate implied by this outcome, in percent.
    pub target_rate: f64,
    /// Market-implied probability, 0-100.
    pub probability: f64,
    pub implied_odds: f64,
}

impl RateOutcome {
    pub fn new(description: impl Into<String>, target_rate: f64, probability: f64) -> Self {
        Self {
            description: description.into(),
            target_rate,
            probability,
            implied_odds: implied_odds(probability),
        }
    }
}

/// Point-in-time normalized result of one pipeline run.
#[derive(Clone, Debug, PartialEq)]
pub struct MarketSnapshot {
    pub next_meeting: NaiveDate,
    pub source: String,
    /// Always expressed in the market timezone.
    pub fetched_at: DateTime<FixedOffset>,
    pub outcomes: Vec<RateOutcome>,
}

impl MarketSnapshot {
    /// Market-local calendar day this snapshot belongs to.
    pub fn market_day(&self) -> NaiveDate {
        self.fetched_at.date_naive()
    }
}

/// Insert `outcome`, replacing an earlier one with the same description in place.
pub fn upsert_outcome(outcomes: &mut Vec<RateOutcome>, outcome: RateOutcome) {
    match outcomes
        .iter_mut()
        .find(|o| o.description == outcome.description)
    {
        Some(existing) => *existing = outcome,
        None => outcomes.push(outcome),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_outcome_derives_implied_odds() {
        let hold = RateOutcome::new("Hold (3.85%)", 3.85, 3.0);
        assert_eq!(hold.implied_odds, 33.33);
        let never = RateOutcome::new("-0.50% (3.35%)", 3.35, 0.0);
        assert_eq!(never.implied_odds, 0.0);
    }

    #[test]
    fn upsert_keeps_first_position_last_value() {
        let mut outcomes = vec![
            RateOutcome::new("Hold", 3.85, 10.0),
            RateOutcome::new("Cut", 3.60, 90.0),
        ];
        upsert_outcome(&mut outcomes, RateOutcome::new("Hold", 3.85, 12.0));
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].description, "Hold");
        assert_eq!(outcomes[0].probability, 12.0);
    }
}
