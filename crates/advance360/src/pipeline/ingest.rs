//! Data-load phase: parses monthly usage extracts (CSV, fixed schema) into
//! [`MonthlyUsageRecord`]s. Rows that fail to parse are skipped with a
//! warning and counted; they never fail the phase.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::domain::MonthlyUsageRecord;

/// Extract files a run should load, relative to the configured data
/// directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileSelection {
    #[serde(default)]
    pub monthly_files: Vec<String>,
}

impl FileSelection {
    pub fn is_empty(&self) -> bool {
        self.monthly_files.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("extract file not found: {0}")]
    FileNotFound(PathBuf),
    #[error("failed to read extract: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of loading one or more extracts.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub records: Vec<MonthlyUsageRecord>,
    pub rows_skipped: usize,
}

/// Parses one extract. The header row is mapped by name, so column order in
/// the extract does not matter.
pub fn load_monthly_csv<R: Read>(reader: R) -> Result<LoadOutcome, IngestError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut outcome = LoadOutcome::default();
    for (row_index, row) in csv_reader.deserialize::<MonthlyUsageRecord>().enumerate() {
        match row {
            Ok(record) => outcome.records.push(record),
            Err(err) => {
                outcome.rows_skipped += 1;
                warn!(row = row_index + 1, %err, "skipping malformed extract row");
            }
        }
    }
    Ok(outcome)
}

/// Loads every file in the selection, concatenating records across months.
pub fn load_selection(
    data_dir: &Path,
    selection: &FileSelection,
) -> Result<LoadOutcome, IngestError> {
    let mut combined = LoadOutcome::default();
    for relative in &selection.monthly_files {
        let path = data_dir.join(relative);
        if !path.is_file() {
            return Err(IngestError::FileNotFound(path));
        }
        let file = File::open(&path)?;
        let outcome = load_monthly_csv(file)?;
        combined.rows_skipped += outcome.rows_skipped;
        combined.records.extend(outcome.records);
    }
    Ok(combined)
}
