//! Append-only log of downloads that were attempted and failed

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, TimeZone};

use super::FetchError;
use crate::config::ConfigError;
use crate::naming::DocumentId;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone)]
pub struct FailureLog {
    path: PathBuf,
}

impl FailureLog {
    /// Open (creating if absent) the log, proving it is writable
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| ConfigError::LogUnwritable {
                path: path.clone(),
                source,
            })?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, id: DocumentId) -> Result<(), FetchError> {
        self.record_at(id, Local::now())
    }

    pub fn record_at<Tz: TimeZone>(&self, id: DocumentId, at: DateTime<Tz>) -> Result<(), FetchError>
    where
        Tz::Offset: std::fmt::Display,
    {
        let line = format_entry(id, &at);
        let write_err = |source: std::io::Error| FetchError::FailureLog {
            path: self.path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(write_err)?;
        file.write_all(line.as_bytes()).map_err(write_err)?;
        Ok(())
    }
}

/// One log line, newline included
pub fn format_entry<Tz: TimeZone>(id: DocumentId, at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "{} - Failed to download document with ID: {}\n",
        at.format(TIMESTAMP_FORMAT),
        id
    )
}
