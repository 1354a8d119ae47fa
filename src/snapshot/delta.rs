use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::extract::rules::bucket_for;
use crate::utils::math::round2;

use super::MarketSnapshot;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Unchanged,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BucketChange {
    /// Signed change in percentage points.
    pub change: f64,
    pub direction: Direction,
}

impl BucketChange {
    fn new(change: f64) -> Self {
        let change = round2(change);
        let direction = if change > 0.0 {
            Direction::Up
        } else if change < 0.0 {
            Direction::Down
        } else {
            Direction::Unchanged
        };
        // Avoid serializing -0.0.
        let change = if change == 0.0 { 0.0 } else { change };
        Self { change, direction }
    }
}

/// Day-over-day probability change per coarse outcome bucket.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DailyDelta(pub BTreeMap<String, BucketChange>);

impl DailyDelta {
    /// Compare `current` against `previous` bucket by bucket.
    ///
    /// A bucket missing from one side counts as probability 0. Without a
    /// previous snapshot every current bucket is reported as unchanged.
    pub fn between(
        previous: Option<&MarketSnapshot>,
        current: &MarketSnapshot,
        current_rate: f64,
    ) -> Self {
        let now = bucket_totals(current, current_rate);
        let Some(previous) = previous else {
            return Self(
                now.into_keys()
                    .map(|bucket| (bucket, BucketChange::new(0.0)))
                    .collect(),
            );
        };
        let before = bucket_totals(previous, current_rate);

        let mut changes = BTreeMap::new();
        for bucket in now.keys().chain(before.keys()) {
            if changes.contains_key(bucket) {
                continue;
            }
            let new_p = now.get(bucket).copied().unwrap_or(0.0);
            let old_p = before.get(bucket).copied().unwrap_or(0.0);
            changes.insert(bucket.clone(), BucketChange::new(new_p - old_p));
        }
        Self(changes)
    }

    pub fn get(&self, bucket: &str) -> Option<&BucketChange> {
        self.0.get(bucket)
    }
}

/// Compact log form, e.g. `cut25 +12.00 up, hold -12.00 down`.
impl fmt::Display for DailyDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (bucket, c)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            let direction = match c.direction {
                Direction::Up => "up",
                Direction::Down => "down",
                Direction::Unchanged => "unchanged",
            };
            write!(f, "{bucket} {:+.2} {direction}", c.change)?;
        }
        Ok(())
    }
}

/// Total probability per bucket; several outcomes may share one bucket.
pub fn bucket_totals(snapshot: &MarketSnapshot, current_rate: f64) -> BTreeMap<String, f64> {
    let mut totals = BTreeMap::new();
    for o in &snapshot.outcomes {
        *totals
            .entry(bucket_for(&o.description, o.target_rate, current_rate))
            .or_insert(0.0) += o.probability;
    }
    totals
}
