//! Read-only HTTP surface over the persisted snapshot.
//!
//! Readers never take the writer's lease: the state file only changes by
//! atomic rename, so a read sees either the old or the new document.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::extract::MeetingDateExtractor;
use crate::monitoring::metrics::METRICS;
use crate::snapshot::{DailyDelta, MarketSnapshot, Normalizer};
use crate::storage::models::SnapshotRow;
use crate::storage::{HistoryArchive, StateStore};
use crate::types::AppConfig;
use crate::utils::time::market_date;

/// Snapshot as served, with per-bucket movement since the previous day.
#[derive(Debug, Serialize)]
pub struct SnapshotView {
    #[serde(flatten)]
    pub row: SnapshotRow,
    pub changes: DailyDelta,
}

#[derive(Debug, Serialize)]
pub struct HistoryView {
    pub history: Vec<SnapshotRow>,
}

pub struct ReadService {
    store: StateStore,
    history: HistoryArchive,
    normalizer: Normalizer,
    dates: MeetingDateExtractor,
    current_rate: f64,
    tz: Tz,
    max_staleness: Duration,
}

impl ReadService {
    pub fn new(
        store: StateStore,
        history: HistoryArchive,
        normalizer: Normalizer,
        dates: MeetingDateExtractor,
        current_rate: f64,
        tz: Tz,
        max_staleness: Duration,
    ) -> Self {
        Self {
            store,
            history,
            normalizer,
            dates,
            current_rate,
            tz,
            max_staleness,
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(
            StateStore::from_config(&cfg.storage),
            HistoryArchive::new(cfg.storage.history_dir.clone()),
            Normalizer::from_config(cfg),
            MeetingDateExtractor::from_config(&cfg.market),
            cfg.market.current_rate,
            cfg.market.timezone,
            Duration::from_secs(cfg.server.max_staleness_secs),
        )
    }

    /// Persisted snapshot, or the fallback record if nothing readable exists.
    pub fn current(&self) -> MarketSnapshot {
        match self.store.current() {
            Some(snapshot) => {
                let ts = snapshot.fetched_at.timestamp();
                METRICS.observe_last_run(u64::try_from(ts).unwrap_or(0));
                snapshot
            }
            None => {
                let now = Utc::now();
                let meeting = self.dates.scheduled(market_date(now, self.tz));
                self.normalizer.fallback_snapshot(meeting.date, now)
            }
        }
    }

    pub fn current_view(&self) -> SnapshotView {
        let current = self.current();
        let previous = match self.history.latest_before(current.market_day()) {
            Ok(prev) => prev,
            Err(e) => {
                warn!(target: "api", error = %e, "history unavailable, reporting no change");
                None
            }
        };
        SnapshotView {
            changes: DailyDelta::between(previous.as_ref(), &current, self.current_rate),
            row: SnapshotRow::from(&current),
        }
    }

    pub fn history_view(&self) -> HistoryView {
        let entries = match self.history.entries() {
            Ok(entries) => entries,
            Err(e) => {
                warn!(target: "api", error = %e, "history unavailable");
                Vec::new()
            }
        };
        HistoryView {
            history: entries.iter().map(SnapshotRow::from).collect(),
        }
    }

    pub fn health(&self) -> (bool, Value) {
        if let Some(snapshot) = self.store.current() {
            METRICS.observe_last_run(u64::try_from(snapshot.fetched_at.timestamp()).unwrap_or(0));
        }
        let healthy = METRICS.is_healthy(self.max_staleness);
        let body = json!({
            "status": if healthy { "ok" } else { "stale" },
            "metrics": METRICS.snapshot(),
        });
        (healthy, body)
    }
}

type Shared = Arc<ReadService>;

async fn probabilities(State(svc): State<Shared>) -> impl IntoResponse {
    Json(svc.current_view())
}

async fn history(State(svc): State<Shared>) -> impl IntoResponse {
    Json(svc.history_view())
}

async fn health(State(svc): State<Shared>) -> impl IntoResponse {
    let (healthy, body) = svc.health();
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

pub fn router(service: ReadService) -> Router {
    Router::new()
        .route("/api/rba-probabilities", get(probabilities))
        .route("/api/rba-probabilities/history", get(history))
        .route("/health", get(health))
        .with_state(Arc::new(service))
}

pub async fn serve(cfg: &AppConfig, bind: &str) -> anyhow::Result<()> {
    let app = router(ReadService::from_config(cfg));
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(target: "api", bind = %bind, "read api listening");
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::RateOutcome;
    use crate::types::FallbackConfig;
    use chrono::{DateTime, NaiveDate};
    use tempfile::tempdir;

    fn snap(ts: &str, hold: f64) -> MarketSnapshot {
        MarketSnapshot {
            next_meeting: NaiveDate::from_ymd_opt(2025, 7, 8).unwrap(),
            source: "ASX RBA Rate Tracker".to_string(),
            fetched_at: DateTime::parse_from_rfc3339(ts).unwrap(),
            outcomes: vec![
                RateOutcome::new("Hold (3.85%)", 3.85, hold),
                RateOutcome::new("-0.25% (3.60%)", 3.60, 100.0 - hold),
            ],
        }
    }

    fn service(dir: &std::path::Path) -> ReadService {
        ReadService::new(
            StateStore::new(
                dir.join("market-odds.json"),
                Duration::from_secs(1),
                Duration::from_secs(60),
            ),
            HistoryArchive::new(dir.join("history")),
            Normalizer::new(
                &FallbackConfig::default().outcomes,
                "ASX RBA Rate Tracker",
                chrono_tz::Australia::Sydney,
            ),
            MeetingDateExtractor::new(Vec::new(), NaiveDate::from_ymd_opt(2025, 7, 8).unwrap()),
            3.85,
            chrono_tz::Australia::Sydney,
            Duration::from_secs(3600),
        )
    }

    #[test]
    fn empty_store_serves_fallback_record() {
        let dir = tempdir().unwrap();
        let view = service(dir.path()).current_view();
        assert_eq!(view.row.source, "ASX RBA Rate Tracker (Cached)");
        assert_eq!(view.row.probabilities.len(), 2);
        assert_eq!(view.changes.get("hold").unwrap().change, 0.0);

        let body = serde_json::to_value(&view).unwrap();
        assert!(body.get("nextMeeting").is_some());
        assert!(body.get("lastUpdate").is_some());
        assert!(body.get("changes").is_some());
    }

    #[test]
    fn changes_compare_against_previous_day() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path());
        let yesterday = snap("2025-07-01T09:00:00+10:00", 15.0);
        let today = snap("2025-07-02T09:00:00+10:00", 3.0);
        svc.history.record(&yesterday).unwrap();
        svc.history.record(&today).unwrap();
        svc.store.merge_and_persist(&today).unwrap();

        let view = svc.current_view();
        let hold = view.changes.get("hold").unwrap();
        assert_eq!(hold.change, -12.0);
        assert_eq!(view.changes.get("cut25").unwrap().change, 12.0);

        let history = svc.history_view();
        assert_eq!(history.history.len(), 2);
        assert_eq!(history.history[0].probabilities[0].probability, 15.0);
    }
}
