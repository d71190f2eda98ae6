// ============================================================
// Layer 6 - Evaluation History
// ============================================================
// Appends one CSV row per validation pass so a run can be
// plotted afterwards:
//
//   epoch,step,recall_at_1,recall_at_2,recall_at_5,saved
//   0,250,0.412000,0.583000,0.801000,true
//   0,500,0.431000,0.601000,0.812000,true
//
// The file is only ever appended to, so several runs into the
// same checkpoint directory end up in one history.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::ml::evaluator::RecallReport;

const HEADER: &str = "epoch,step,recall_at_1,recall_at_2,recall_at_5,saved";

/// One row of the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub epoch:       usize,
    pub step:        usize,
    pub recall_at_1: f64,
    pub recall_at_2: f64,
    pub recall_at_5: f64,
    /// Whether this evaluation produced a new checkpoint
    pub saved:       bool,
}

impl EvaluationRecord {
    pub fn new(epoch: usize, step: usize, report: &RecallReport, saved: bool) -> Self {
        Self {
            epoch,
            step,
            recall_at_1: report.recall[0],
            recall_at_2: report.recall[1],
            recall_at_5: report.recall[2],
            saved,
        }
    }
}

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Open `<dir>/metrics.csv`, writing the header if the file is new.
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create '{}'", dir.display()))?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "{HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, r: &EvaluationRecord) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        writeln!(
            f,
            "{},{},{:.6},{:.6},{:.6},{}",
            r.epoch, r.step, r.recall_at_1, r.recall_at_2, r.recall_at_5, r.saved,
        )?;
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn report(r5: f64) -> RecallReport {
        RecallReport { recall: [0.25, 0.5, r5], predictions: vec![0], groups: 4 }
    }

    #[test]
    fn test_appends_rows_after_header() {
        let dir    = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(dir.path()).unwrap();
        logger.log(&EvaluationRecord::new(0, 3, &report(0.75), true)).unwrap();
        logger.log(&EvaluationRecord::new(1, 0, &report(0.5), false)).unwrap();

        let text = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], HEADER);
        assert_eq!(lines[1], "0,3,0.250000,0.500000,0.750000,true");
        assert_eq!(lines[2], "1,0,0.250000,0.500000,0.500000,false");
    }

    #[test]
    fn test_reopening_keeps_existing_history() {
        let dir = tempfile::tempdir().unwrap();
        MetricsLogger::new(dir.path())
            .unwrap()
            .log(&EvaluationRecord::new(0, 1, &report(0.1), true))
            .unwrap();
        let logger = MetricsLogger::new(dir.path()).unwrap();
        let text   = fs::read_to_string(logger.csv_path()).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
