use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::snapshot::MarketSnapshot;
use crate::types::StorageConfig;

use super::history::HistoryArchive;
use super::lease::FileLease;
use super::models::SnapshotRow;
use super::{write_atomic, StoreResult};

/// Durable state: a JSON object that may carry fields owned by other writers.
pub type PersistedState = Map<String, Value>;

/// Apply every top-level field of `update` on top of `existing`.
pub fn merge_state(mut existing: PersistedState, update: PersistedState) -> PersistedState {
    for (key, value) in update {
        existing.insert(key, value);
    }
    existing
}

/// Result of one read-merge-write cycle.
#[derive(Debug, Clone)]
pub struct PersistOutcome {
    pub state: PersistedState,
    /// Snapshot decoded from the state before the merge, if any.
    pub previous: Option<MarketSnapshot>,
}

/// Current-snapshot file, e.g. `data/market-odds.json`, optionally paired
/// with a per-day history archive written under the same lease.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
    lease_timeout: Duration,
    stale_lease: Duration,
    history: Option<HistoryArchive>,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>, lease_timeout: Duration, stale_lease: Duration) -> Self {
        Self {
            path: path.into(),
            lease_timeout,
            stale_lease,
            history: None,
        }
    }

    pub fn with_history(mut self, history: HistoryArchive) -> Self {
        self.history = Some(history);
        self
    }

    pub fn from_config(cfg: &StorageConfig) -> Self {
        Self::new(
            cfg.state_path.clone(),
            Duration::from_secs(cfg.lease_timeout_secs),
            Duration::from_secs(cfg.stale_lease_secs),
        )
        .with_history(HistoryArchive::new(cfg.history_dir.clone()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lease_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    /// Read persisted state. A missing or corrupt file reads as empty state.
    pub fn load(&self) -> PersistedState {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Map::new(),
            Err(e) => {
                warn!(target: "storage", path = %self.path.display(), error = %e, "unreadable state, treating as empty");
                return Map::new();
            }
        };
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                warn!(target: "storage", path = %self.path.display(), "state is not a JSON object, treating as empty");
                Map::new()
            }
            Err(e) => {
                warn!(target: "storage", path = %self.path.display(), error = %e, "corrupt state, treating as empty");
                Map::new()
            }
        }
    }

    /// The snapshot fields of `state`, if they decode.
    pub fn snapshot_of(state: &PersistedState) -> Option<MarketSnapshot> {
        serde_json::from_value::<SnapshotRow>(Value::Object(state.clone()))
            .ok()
            .map(MarketSnapshot::from)
    }

    pub fn current(&self) -> Option<MarketSnapshot> {
        Self::snapshot_of(&self.load())
    }

    /// Merge `snapshot` into the persisted state under an exclusive lease.
    ///
    /// The history entry is written first; any failure leaves the state
    /// file untouched. Blocking; callers on the async runtime should use
    /// `spawn_blocking`.
    pub fn merge_and_persist(&self, snapshot: &MarketSnapshot) -> StoreResult<PersistOutcome> {
        let _lease = FileLease::acquire(&self.lease_path(), self.lease_timeout, self.stale_lease)?;

        let existing = self.load();
        let previous = Self::snapshot_of(&existing);

        let update = match serde_json::to_value(SnapshotRow::from(snapshot))? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let merged = merge_state(existing, update);

        let bytes = serde_json::to_vec_pretty(&merged)?;
        if let Some(history) = &self.history {
            history.record(snapshot)?;
        }
        write_atomic(&self.path, &bytes)?;

        info!(
            target: "storage",
            path = %self.path.display(),
            outcomes = snapshot.outcomes.len(),
            source = %snapshot.source,
            "state persisted"
        );
        Ok(PersistOutcome {
            state: merged,
            previous,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::RateOutcome;
    use chrono::{DateTime, NaiveDate};
    use serde_json::json;
    use tempfile::tempdir;

    fn obj(v: Value) -> PersistedState {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    fn snap(hold: f64) -> MarketSnapshot {
        MarketSnapshot {
            next_meeting: NaiveDate::from_ymd_opt(2025, 7, 8).unwrap(),
            source: "ASX RBA Rate Tracker".to_string(),
            fetched_at: DateTime::parse_from_rfc3339("2025-07-02T09:30:00+10:00").unwrap(),
            outcomes: vec![
                RateOutcome::new("Hold (3.85%)", 3.85, hold),
                RateOutcome::new("-0.25% (3.60%)", 3.60, 100.0 - hold),
            ],
        }
    }

    fn store(dir: &Path) -> StateStore {
        StateStore::new(
            dir.join("market-odds.json"),
            Duration::from_secs(1),
            Duration::from_secs(60),
        )
    }

    #[test]
    fn merge_preserves_unrelated_fields() {
        let merged = merge_state(obj(json!({"a": 1, "b": 2})), obj(json!({"b": 3, "c": 4})));
        assert_eq!(Value::Object(merged), json!({"a": 1, "b": 3, "c": 4}));
    }

    #[test]
    fn missing_and_corrupt_state_load_empty() {
        let dir = tempdir().unwrap();
        let s = store(dir.path());
        assert!(s.load().is_empty());

        std::fs::write(s.path(), b"{ not json").unwrap();
        assert!(s.load().is_empty());

        std::fs::write(s.path(), b"[1, 2]").unwrap();
        assert!(s.load().is_empty());
    }

    #[test]
    fn persist_keeps_foreign_fields_and_reports_previous() {
        let dir = tempdir().unwrap();
        let s = store(dir.path());
        std::fs::write(s.path(), br#"{"notes": "kept", "source": "old"}"#).unwrap();

        let first = s.merge_and_persist(&snap(15.0)).unwrap();
        assert!(first.previous.is_none());
        assert_eq!(first.state["notes"], json!("kept"));
        assert_eq!(first.state["source"], json!("ASX RBA Rate Tracker"));

        let second = s.merge_and_persist(&snap(3.0)).unwrap();
        assert_eq!(second.previous, Some(snap(15.0)));
        assert_eq!(s.current(), Some(snap(3.0)));
        assert!(!dir.path().join("market-odds.json.lock").exists());
    }

    #[test]
    fn persisting_same_snapshot_twice_is_idempotent() {
        let dir = tempdir().unwrap();
        let s = store(dir.path());
        std::fs::write(s.path(), br#"{"custom": [1, 2, 3]}"#).unwrap();

        let once = s.merge_and_persist(&snap(40.0)).unwrap().state;
        let on_disk_once = std::fs::read(s.path()).unwrap();
        let twice = s.merge_and_persist(&snap(40.0)).unwrap().state;
        let on_disk_twice = std::fs::read(s.path()).unwrap();

        assert_eq!(once, twice);
        assert_eq!(on_disk_once, on_disk_twice);
    }

    #[test]
    fn persist_records_history_entry() {
        let dir = tempdir().unwrap();
        let s = store(dir.path()).with_history(HistoryArchive::new(dir.path().join("history")));
        s.merge_and_persist(&snap(15.0)).unwrap();
        assert!(dir
            .path()
            .join("history")
            .join("prob_history_20250702.json")
            .exists());
    }

    #[test]
    fn unwritable_history_leaves_state_untouched() {
        let dir = tempdir().unwrap();
        let s = store(dir.path());
        s.merge_and_persist(&snap(15.0)).unwrap();
        let before = std::fs::read(s.path()).unwrap();

        std::fs::write(dir.path().join("history"), b"not a directory").unwrap();
        let s = s.with_history(HistoryArchive::new(dir.path().join("history")));
        assert!(s.merge_and_persist(&snap(3.0)).is_err());

        assert_eq!(std::fs::read(s.path()).unwrap(), before);
        assert!(!dir.path().join("market-odds.json.lock").exists());
    }

    #[test]
    fn held_lease_fails_persistence_without_touching_state() {
        let dir = tempdir().unwrap();
        let s = StateStore::new(
            dir.path().join("market-odds.json"),
            Duration::from_millis(100),
            Duration::from_secs(3600),
        );
        s.merge_and_persist(&snap(15.0)).unwrap();
        let before = std::fs::read(s.path()).unwrap();

        std::fs::write(dir.path().join("market-odds.json.lock"), b"").unwrap();
        let err = s.merge_and_persist(&snap(3.0)).unwrap_err();
        assert!(matches!(err, crate::storage::StoreError::LeaseTimeout(_)));
        assert_eq!(std::fs::read(s.path()).unwrap(), before);
    }
}
