use crate::ChunkTask;

/// Folds per-chunk counters into job-wide totals.
///
/// Counters are stored on the chunks themselves; the aggregator keeps the
/// running sums so a progress event costs O(1).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgressAggregator {
    total_records: u64,
    scanned: u64,
    kept: u64,
}

impl ProgressAggregator {
    pub fn new(total_records: u64) -> Self {
        Self {
            total_records,
            ..Self::default()
        }
    }

    /// Applies the latest counters reported for `chunk`.
    ///
    /// Returns `false` and leaves everything untouched when the report would
    /// move either counter backwards.
    pub fn apply(&mut self, chunk: &mut ChunkTask, scanned: u64, kept: u64) -> bool {
        if scanned < chunk.scanned || kept < chunk.kept {
            return false;
        }
        self.scanned += scanned - chunk.scanned;
        self.kept += kept - chunk.kept;
        chunk.scanned = scanned;
        chunk.kept = kept;
        true
    }

    pub fn total_records(&self) -> u64 {
        self.total_records
    }

    pub fn scanned(&self) -> u64 {
        self.scanned
    }

    pub fn kept(&self) -> u64 {
        self.kept
    }

    /// Percentage for a job that has not reached a terminal state.
    pub fn percent(&self) -> u8 {
        running_percent(self.scanned, self.total_records)
    }
}

/// `scanned / total`, as a percentage clamped to `0..=99`.
pub fn running_percent(scanned: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = u128::from(scanned.min(total)) * 100 / u128::from(total);
    pct.min(99) as u8
}
