//! One acquisition-to-persistence cycle.
//!
//! Stages run in order: Acquiring, Extracting, Normalizing, Persisting.
//! Document problems never abort a run; they are recorded as
//! [`Degradation`]s and the run continues to normalization with whatever
//! it has, down to nothing. Only persistence errors fail a run.

use std::fmt;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, error, info, warn};

use crate::client::{AcquireError, Acquirer};
use crate::extract::{MeetingDateExtractor, OutcomeExtractor};
use crate::monitoring::metrics::METRICS;
use crate::snapshot::{DailyDelta, MarketSnapshot, Normalizer, RateOutcome};
use crate::storage::{StateStore, StoreError, StoreResult};
use crate::types::AppConfig;
use crate::utils::time::market_date;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Acquiring,
    Extracting,
    Normalizing,
    Persisting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Idle => "idle",
            Stage::Acquiring => "acquiring",
            Stage::Extracting => "extracting",
            Stage::Normalizing => "normalizing",
            Stage::Persisting => "persisting",
        };
        f.write_str(s)
    }
}

/// Recoverable problems met during a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Degradation {
    /// No strategy returned a document.
    AcquisitionFailed,
    /// No known structure in the document.
    StructureNotFound,
    /// Structure present but no valid rows.
    ExtractionEmpty,
    /// Meeting date came from configuration.
    DateExtractionFailed,
}

/// What a completed run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub snapshot: MarketSnapshot,
    pub delta: DailyDelta,
    pub degradations: Vec<Degradation>,
    pub strategy: Option<&'static str>,
}

impl RunReport {
    pub fn used_fallback(&self) -> bool {
        self.degradations.iter().any(|d| {
            matches!(
                d,
                Degradation::AcquisitionFailed
                    | Degradation::StructureNotFound
                    | Degradation::ExtractionEmpty
            )
        })
    }
}

pub struct Pipeline {
    acquirer: Acquirer,
    outcomes: OutcomeExtractor,
    dates: MeetingDateExtractor,
    normalizer: Normalizer,
    store: StateStore,
    current_rate: f64,
    tz: Tz,
}

impl Pipeline {
    pub fn new(
        acquirer: Acquirer,
        outcomes: OutcomeExtractor,
        dates: MeetingDateExtractor,
        normalizer: Normalizer,
        store: StateStore,
        current_rate: f64,
        tz: Tz,
    ) -> Self {
        Self {
            acquirer,
            outcomes,
            dates,
            normalizer,
            store,
            current_rate,
            tz,
        }
    }

    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        Ok(Self::new(
            Acquirer::from_config(cfg)?,
            OutcomeExtractor::new(cfg.market.current_rate),
            MeetingDateExtractor::from_config(&cfg.market),
            Normalizer::from_config(cfg),
            StateStore::from_config(&cfg.storage),
            cfg.market.current_rate,
            cfg.market.timezone,
        ))
    }

    fn enter(stage: Stage) {
        debug!(target: "pipeline", stage = %stage, "entering stage");
    }

    pub async fn run_cycle(&self) -> StoreResult<RunReport> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run one cycle as if the clock read `now`.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> StoreResult<RunReport> {
        let today = market_date(now, self.tz);
        let mut degradations = Vec::new();

        Self::enter(Stage::Acquiring);
        info!(target: "pipeline", strategies = ?self.acquirer.strategy_names(), %today, "run started");
        let acquired = self
            .acquirer
            .acquire(|doc| !self.outcomes.extract(doc).outcomes.is_empty())
            .await;

        Self::enter(Stage::Extracting);
        let (outcomes, meeting, source, strategy): (Vec<RateOutcome>, _, _, _) = match acquired {
            Ok(acquired) => {
                let extraction = self.outcomes.extract(&acquired.document);
                match (extraction.structure, extraction.outcomes.is_empty()) {
                    (None, _) => degradations.push(Degradation::StructureNotFound),
                    (Some(_), true) => degradations.push(Degradation::ExtractionEmpty),
                    _ => {}
                }
                let meeting = self.dates.extract(&acquired.document, today);
                info!(
                    target: "pipeline",
                    strategy = acquired.strategy,
                    structure = extraction.structure.unwrap_or("none"),
                    outcomes = extraction.outcomes.len(),
                    meeting = %meeting.date,
                    "document extracted"
                );
                (
                    extraction.outcomes,
                    meeting,
                    acquired.source,
                    Some(acquired.strategy),
                )
            }
            Err(err) => {
                if !matches!(err, AcquireError::Exhausted) {
                    warn!(target: "pipeline", error = %err, "unexpected acquisition error");
                }
                degradations.push(Degradation::AcquisitionFailed);
                (
                    Vec::new(),
                    self.dates.scheduled(today),
                    self.normalizer.fallback_source(),
                    None,
                )
            }
        };
        if !meeting.extracted() {
            degradations.push(Degradation::DateExtractionFailed);
        }

        Self::enter(Stage::Normalizing);
        let snapshot = self.normalizer.normalize(outcomes, meeting.date, source, now);
        if !degradations.is_empty() {
            warn!(
                target: "pipeline",
                degradations = ?degradations,
                source = %snapshot.source,
                "run degraded"
            );
        }

        Self::enter(Stage::Persisting);
        let persisted = {
            let store = self.store.clone();
            let snapshot = snapshot.clone();
            tokio::task::spawn_blocking(move || store.merge_and_persist(&snapshot))
                .await
                .map_err(|e| StoreError::Task(e.to_string()))
                .and_then(|res| res)
        };
        let persisted = match persisted {
            Ok(p) => p,
            Err(err) => {
                METRICS.record_persistence_failure(&err.to_string());
                error!(target: "pipeline", error = %err, "persistence failed, run aborted");
                Self::enter(Stage::Idle);
                return Err(err);
            }
        };

        let delta = DailyDelta::between(persisted.previous.as_ref(), &snapshot, self.current_rate);
        let report = RunReport {
            snapshot,
            delta,
            degradations,
            strategy,
        };
        METRICS.record_run(&report.snapshot.source, report.used_fallback());
        Self::enter(Stage::Idle);
        Ok(report)
    }
}
