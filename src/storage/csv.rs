//! CSV job log.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::ProverError;
use crate::core::schema::{JobRecord, JobStatus};

/// CSV column headers in deterministic order.
pub const CSV_HEADERS: &[&str] = &[
    "timestamp",
    "job_id",
    "kind",
    "engine",
    "status",
    "input_count",
    "elapsed_ms",
    "digests",
    "pending_slots",
    "error",
];

/// Appends one row per job; the header is written when the file is new or empty.
#[derive(Debug, Clone)]
pub struct CsvJobLog {
    path: PathBuf,
}

impl CsvJobLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        CsvJobLog {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, records: &[JobRecord]) -> Result<(), ProverError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ProverError::Message(format!("failed to create directory: {e}")))?;
            }
        }

        let has_header = std::fs::metadata(&self.path)
            .map(|m| m.len() > 0)
            .unwrap_or(false);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| ProverError::Message(format!("failed to open file: {e}")))?;

        write_rows(records, file, !has_header)
    }
}

/// Write records as CSV to any writer.
pub fn write_rows<W: Write>(
    records: &[JobRecord],
    writer: W,
    header: bool,
) -> Result<(), ProverError> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    if header {
        csv_writer
            .write_record(CSV_HEADERS)
            .map_err(|e| ProverError::Message(format!("failed to write CSV headers: {e}")))?;
    }

    for record in records {
        csv_writer
            .write_record(record_to_row(record))
            .map_err(|e| ProverError::Message(format!("failed to write CSV row: {e}")))?;
    }

    csv_writer
        .flush()
        .map_err(|e| ProverError::Message(format!("failed to flush CSV writer: {e}")))?;
    Ok(())
}

fn record_to_row(record: &JobRecord) -> Vec<String> {
    let status = match record.status {
        JobStatus::Succeeded => "succeeded",
        JobStatus::Failed => "failed",
        JobStatus::Cancelled => "cancelled",
    };
    vec![
        record.timestamp.clone(),
        record.job_id.to_string(),
        record.kind.to_string(),
        record.engine.name.clone(),
        status.to_string(),
        record.input_count.to_string(),
        record
            .elapsed_ms
            .map(|v| format!("{:.3}", v))
            .unwrap_or_default(),
        record.digests.join(" "),
        record.pending_slots.to_string(),
        record
            .failure
            .as_ref()
            .map(|f| f.message.clone())
            .unwrap_or_default(),
    ]
}
