//! Submission metadata spreadsheet
//!
//! A CSV export with one row per submission. Identifiers carry a textual
//! prefix (`pn8250`) that is stripped before parsing.

mod pending;

pub use pending::{load_wanted, select_pending, PendingSelection};

use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::naming::DocumentId;

/// Metadata loading errors
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Column `{0}` not found in metadata table")]
    MissingColumn(String),

    #[error("Line {line}: identifier `{value}` is not a number after stripping the prefix")]
    Format { line: u64, value: String },
}

/// Column layout of the submissions table
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub id_column: String,
    /// Token stripped from identifiers before parsing
    pub id_prefix: String,
    pub class_column: String,
    pub status_column: String,
}

impl Default for TableSchema {
    fn default() -> Self {
        Self {
            id_column: "Paper ID".into(),
            id_prefix: "pn".into(),
            class_column: "Primary Subcommittee Selection".into(),
            status_column: "Decision".into(),
        }
    }
}

impl TableSchema {
    /// Parse an identifier cell, stripping the prefix
    pub fn parse_id(&self, raw: &str) -> Option<DocumentId> {
        if self.id_prefix.is_empty() {
            return raw.parse().ok();
        }
        raw.replace(self.id_prefix.as_str(), "").parse().ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRow {
    pub id: DocumentId,
    /// Raw classification cell; empty if the column is absent
    pub classification: String,
    /// Decision/status cell, if the column exists and the cell is non-empty
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SubmissionTable {
    pub rows: Vec<SubmissionRow>,
    /// Whether the classification column was present
    pub has_classification: bool,
}

impl SubmissionTable {
    pub fn load(path: &Path, schema: &TableSchema) -> Result<Self, MetadataError> {
        let file = std::fs::File::open(path).map_err(|source| MetadataError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::from_reader(file, schema)?;
        debug!("Loaded {} submission rows from {}", table.rows.len(), path.display());
        Ok(table)
    }

    pub fn from_reader<R: Read>(reader: R, schema: &TableSchema) -> Result<Self, MetadataError> {
        let mut csv = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

        let headers = csv.headers()?.clone();
        let column = |name: &str| headers.iter().position(|h| h.trim() == name);

        let id_idx = column(&schema.id_column)
            .ok_or_else(|| MetadataError::MissingColumn(schema.id_column.clone()))?;
        let class_idx = column(&schema.class_column);
        let status_idx = column(&schema.status_column);

        let mut rows = Vec::new();
        for record in csv.records() {
            let record = record?;
            let line = record.position().map(|p| p.line()).unwrap_or_default();
            let raw_id = record.get(id_idx).unwrap_or_default();

            let id = schema.parse_id(raw_id).ok_or_else(|| MetadataError::Format {
                line,
                value: raw_id.to_string(),
            })?;

            let classification = class_idx
                .and_then(|i| record.get(i))
                .unwrap_or_default()
                .to_string();
            let status = status_idx
                .and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);

            rows.push(SubmissionRow {
                id,
                classification,
                status,
            });
        }

        Ok(Self {
            rows,
            has_classification: class_idx.is_some(),
        })
    }

    pub fn contains(&self, id: DocumentId) -> bool {
        self.rows.iter().any(|r| r.id == id)
    }
}
