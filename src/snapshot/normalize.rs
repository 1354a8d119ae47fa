use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::client::SourceKind;
use crate::types::{AppConfig, FallbackOutcome};
use crate::utils::time::to_market_time;

use super::{MarketSnapshot, RateOutcome};

/// Turns extracted fields into a schema-complete [`MarketSnapshot`].
///
/// An empty outcome list is replaced by the configured fallback set and the
/// source is relabelled as cached, so downstream readers never see an empty
/// probability list.
#[derive(Clone, Debug)]
pub struct Normalizer {
    fallback: Vec<RateOutcome>,
    source_label: String,
    tz: Tz,
}

impl Normalizer {
    pub fn new(fallback: &[FallbackOutcome], source_label: impl Into<String>, tz: Tz) -> Self {
        Self {
            fallback: fallback
                .iter()
                .map(|o| RateOutcome::new(o.description.clone(), o.rate, o.probability))
                .collect(),
            source_label: source_label.into(),
            tz,
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(
            &cfg.fallback.outcomes,
            cfg.market.source_label.clone(),
            cfg.market.timezone,
        )
    }

    pub fn fallback_source(&self) -> String {
        SourceKind::Cached.label(&self.source_label)
    }

    pub fn normalize(
        &self,
        outcomes: Vec<RateOutcome>,
        next_meeting: NaiveDate,
        source: String,
        now: DateTime<Utc>,
    ) -> MarketSnapshot {
        let (outcomes, source) = if outcomes.is_empty() {
            (self.fallback.clone(), self.fallback_source())
        } else {
            (outcomes, source)
        };

        MarketSnapshot {
            next_meeting,
            source,
            fetched_at: to_market_time(now, self.tz),
            outcomes,
        }
    }

    /// The record served when nothing has been persisted yet.
    pub fn fallback_snapshot(&self, next_meeting: NaiveDate, now: DateTime<Utc>) -> MarketSnapshot {
        self.normalize(Vec::new(), next_meeting, self.fallback_source(), now)
    }
}
