use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::snapshot::{MarketSnapshot, RateOutcome};

/// On-disk form of one outcome in `market-odds.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeRow {
    pub outcome: String,
    pub rate: f64,
    pub probability: f64,
    pub implied_odds: f64,
}

/// On-disk form of a snapshot. Field names are consumed by the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRow {
    pub next_meeting: NaiveDate,
    pub source: String,
    pub last_update: DateTime<FixedOffset>,
    pub probabilities: Vec<OutcomeRow>,
}

impl From<&RateOutcome> for OutcomeRow {
    fn from(o: &RateOutcome) -> Self {
        Self {
            outcome: o.description.clone(),
            rate: o.target_rate,
            probability: o.probability,
            implied_odds: o.implied_odds,
        }
    }
}

impl From<OutcomeRow> for RateOutcome {
    fn from(row: OutcomeRow) -> Self {
        Self {
            description: row.outcome,
            target_rate: row.rate,
            probability: row.probability,
            implied_odds: row.implied_odds,
        }
    }
}

impl From<&MarketSnapshot> for SnapshotRow {
    fn from(s: &MarketSnapshot) -> Self {
        Self {
            next_meeting: s.next_meeting,
            source: s.source.clone(),
            last_update: s.fetched_at,
            probabilities: s.outcomes.iter().map(OutcomeRow::from).collect(),
        }
    }
}

impl From<SnapshotRow> for MarketSnapshot {
    fn from(row: SnapshotRow) -> Self {
        Self {
            next_meeting: row.next_meeting,
            source: row.source,
            fetched_at: row.last_update,
            outcomes: row.probabilities.into_iter().map(RateOutcome::from).collect(),
        }
    }
}
