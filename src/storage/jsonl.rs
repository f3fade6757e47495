//! JSONL (JSON Lines) history of job records.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::ProverError;
use crate::core::HashKind;
use crate::core::schema::{JobRecord, SCHEMA_VERSION};

/// Append-only JSONL store for job records, one JSON object per line.
#[derive(Debug, Clone)]
pub struct JsonlWriter {
    path: PathBuf,
}

impl JsonlWriter {
    /// The file is created on first append.
    pub fn new(path: impl AsRef<Path>) -> Self {
        JsonlWriter {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record.
    ///
    /// # Errors
    /// Fails on a schema version mismatch or any I/O / serialization error.
    pub fn append(&self, record: &JobRecord) -> Result<(), ProverError> {
        if record.schema_version != SCHEMA_VERSION {
            return Err(ProverError::Message(format!(
                "schema version mismatch: record has v{}, expected v{}",
                record.schema_version, SCHEMA_VERSION
            )));
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ProverError::Message(format!("failed to create directory: {e}")))?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| ProverError::Message(format!("failed to open file: {e}")))?;

        let json = serde_json::to_string(record)
            .map_err(|e| ProverError::Message(format!("failed to serialize record: {e}")))?;

        writeln!(file, "{}", json)
            .map_err(|e| ProverError::Message(format!("failed to write record: {e}")))?;

        Ok(())
    }

    pub fn append_all(&self, records: &[JobRecord]) -> Result<(), ProverError> {
        records.iter().try_for_each(|r| self.append(r))
    }

    pub fn read_all(&self) -> Result<Vec<JobRecord>, ProverError> {
        self.read_filtered(None)
    }

    /// Read records, optionally keeping only one hash kind.
    ///
    /// # Errors
    /// Fails if the file is missing or any non-empty line does not parse.
    pub fn read_filtered(&self, kind: Option<HashKind>) -> Result<Vec<JobRecord>, ProverError> {
        if !self.path.exists() {
            return Err(ProverError::Message(format!(
                "file not found: {}",
                self.path.display()
            )));
        }

        let file = File::open(&self.path)
            .map_err(|e| ProverError::Message(format!("failed to open file: {e}")))?;

        let reader = BufReader::new(file);
        let mut records = Vec::new();

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result.map_err(|e| {
                ProverError::Message(format!("failed to read line {}: {e}", line_num + 1))
            })?;

            if line.trim().is_empty() {
                continue;
            }

            let record: JobRecord = serde_json::from_str(&line).map_err(|e| {
                ProverError::Message(format!("failed to parse line {}: {e}", line_num + 1))
            })?;

            if kind.is_some_and(|k| record.kind != k) {
                continue;
            }
            records.push(record);
        }

        Ok(records)
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Number of records, zero if the file does not exist yet.
    pub fn count(&self) -> Result<usize, ProverError> {
        if !self.exists() {
            return Ok(0);
        }
        Ok(self.read_all()?.len())
    }
}
