use crate::item::WorkItem;
use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedItem {
    pub id: WorkItem,
    pub reason: String,
}

/// Summary of one run, computed once the pool has drained.
///
/// `succeeded`, `failed` and `total` count the whole checkpoint, so a resumed
/// run includes items finished by earlier runs.
#[derive(Debug, Clone, Serialize)]
pub struct RunStatistics {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped_completed: usize,
    pub skipped_failed: usize,
    pub processed: usize,
    pub remaining: usize,
    pub pages_processed: u64,
    pub records: usize,
    #[serde(serialize_with = "as_secs")]
    pub duration: Duration,
    pub interrupted: bool,
    pub failures: Vec<FailedItem>,
}

fn as_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl RunStatistics {
    /// Pages per second over this run's wall time.
    pub fn throughput(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.pages_processed as f64 / secs
        } else {
            0.0
        }
    }

    pub fn secs_per_item(&self) -> f64 {
        if self.processed > 0 {
            self.duration.as_secs_f64() / self.processed as f64
        } else {
            0.0
        }
    }

    /// Process exit signal: success iff nothing is in the failed set.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        writeln!(f, "{rule}")?;
        if self.interrupted {
            writeln!(f, "PROCESSING INTERRUPTED ({} not started)", self.remaining)?;
        } else {
            writeln!(f, "PROCESSING COMPLETE")?;
        }
        writeln!(f, "{rule}")?;
        writeln!(f, "Total files processed: {}", self.total)?;
        writeln!(f, "Successful: {}", self.succeeded)?;
        writeln!(f, "Failed: {}", self.failed)?;
        if self.skipped_completed + self.skipped_failed > 0 {
            writeln!(
                f,
                "Skipped (resumed): {} completed, {} failed",
                self.skipped_completed, self.skipped_failed
            )?;
        }
        writeln!(f, "Total pages processed: {}", self.pages_processed)?;
        writeln!(f, "Processing time: {:.2} seconds", self.duration.as_secs_f64())?;
        writeln!(f, "Average time per file: {:.2} seconds", self.secs_per_item())?;
        writeln!(f, "Pages per second: {:.2}", self.throughput())?;
        writeln!(f, "CSV records: {}", self.records)?;

        if !self.failures.is_empty() {
            writeln!(f)?;
            writeln!(f, "Failed files:")?;
            for item in &self.failures {
                writeln!(f, "  - {}: {}", item.id, item.reason)?;
            }
        }
        Ok(())
    }
}
