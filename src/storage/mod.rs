//! Storage layer for job records.
//!
//! Records are appended to a JSONL history and, optionally, a flat CSV log.

pub mod csv;
pub mod jsonl;

// Re-export key types
pub use self::csv::{CSV_HEADERS, CsvJobLog};
pub use jsonl::JsonlWriter;
