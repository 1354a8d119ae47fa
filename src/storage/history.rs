use std::path::PathBuf;

use chrono::NaiveDate;
use tracing::warn;

use crate::snapshot::MarketSnapshot;

use super::models::SnapshotRow;
use super::{io_err, write_atomic, StoreResult};

const PREFIX: &str = "prob_history_";
const SUFFIX: &str = ".json";

/// Append-only archive with one snapshot file per market-local day.
///
/// Files are named `prob_history_YYYYMMDD.json`; a later run on the same
/// day replaces that day's entry.
#[derive(Debug, Clone)]
pub struct HistoryArchive {
    dir: PathBuf,
}

impl HistoryArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn entry_path(&self, day: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{PREFIX}{}{SUFFIX}", day.format("%Y%m%d")))
    }

    pub fn record(&self, snapshot: &MarketSnapshot) -> StoreResult<PathBuf> {
        let path = self.entry_path(snapshot.market_day());
        let bytes = serde_json::to_vec_pretty(&SnapshotRow::from(snapshot))?;
        write_atomic(&path, &bytes)?;
        Ok(path)
    }

    /// Archived days in ascending order.
    pub fn days(&self) -> StoreResult<Vec<NaiveDate>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&self.dir)(e)),
        };

        let mut days: Vec<NaiveDate> = entries
            .filter_map(Result::ok)
            .filter_map(|e| {
                let name = e.file_name();
                let stem = name.to_str()?.strip_prefix(PREFIX)?.strip_suffix(SUFFIX)?;
                NaiveDate::parse_from_str(stem, "%Y%m%d").ok()
            })
            .collect();
        days.sort();
        Ok(days)
    }

    pub fn load(&self, day: NaiveDate) -> Option<MarketSnapshot> {
        let path = self.entry_path(day);
        let bytes = std::fs::read(&path).ok()?;
        match serde_json::from_slice::<SnapshotRow>(&bytes) {
            Ok(row) => Some(row.into()),
            Err(e) => {
                warn!(target: "storage", path = %path.display(), error = %e, "skipping corrupt history entry");
                None
            }
        }
    }

    /// Every readable entry, oldest first.
    pub fn entries(&self) -> StoreResult<Vec<MarketSnapshot>> {
        Ok(self
            .days()?
            .into_iter()
            .filter_map(|day| self.load(day))
            .collect())
    }

    /// Latest readable entry from a day strictly before `day`.
    pub fn latest_before(&self, day: NaiveDate) -> StoreResult<Option<MarketSnapshot>> {
        Ok(self
            .days()?
            .into_iter()
            .rev()
            .filter(|d| *d < day)
            .find_map(|d| self.load(d)))
    }
}
