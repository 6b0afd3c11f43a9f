//! Download pass: log in, find each document, click download, verify.
//!
//! - [`detector`] polls the download directory for a finished file
//! - [`failure_log`] appends verified failures to a persistent log
//! - the locator walks the paginated listing for a matching row
//! - the trigger opens the report view and clicks its download control
//! - [`Session`] ties them together for an ordered list of identifiers

pub mod detector;
pub mod failure_log;
mod locator;
mod session;
mod trigger;

pub use detector::{CompletionDetector, CompletionRecord, PollState};
pub use failure_log::FailureLog;
pub use session::Session;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::browser::BrowserError;
use crate::naming::DocumentId;

/// Errors raised while fetching a single document or running the pass
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Document list did not load on page {page} within {waited:?}")]
    UiLoadTimeout { page: usize, waited: Duration },

    #[error("Document {id} not found after checking {pages} page(s)")]
    NotFound { id: DocumentId, pages: usize },

    #[error("Download of document {id} did not complete within {waited:?}")]
    DownloadTimeout { id: DocumentId, waited: Duration },

    #[error("Failed to click the download control: {0}")]
    ControlInteraction(String),

    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error("Login failed: {0}")]
    LoginFailed(String),

    #[error("Failed to write failure log {path}: {source}")]
    FailureLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read download directory {path}: {source}")]
    DownloadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// Whether this error must abort the whole pass rather than one identifier
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FetchError::LoginFailed(_) | FetchError::FailureLog { .. } | FetchError::DownloadDir { .. }
        )
    }
}

/// Why an identifier ended up failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    NotFound,
    UiLoadTimeout,
    ControlInteraction,
    Browser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Pending,
    Succeeded,
    TimedOut,
    Failed(FailureReason),
}

impl Outcome {
    /// Outcome for a recoverable per-identifier error
    fn from_error(error: &FetchError) -> Self {
        match error {
            FetchError::DownloadTimeout { .. } => Outcome::TimedOut,
            FetchError::NotFound { .. } => Outcome::Failed(FailureReason::NotFound),
            FetchError::UiLoadTimeout { .. } => Outcome::Failed(FailureReason::UiLoadTimeout),
            FetchError::ControlInteraction(_) => Outcome::Failed(FailureReason::ControlInteraction),
            _ => Outcome::Failed(FailureReason::Browser),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Pending => write!(f, "pending"),
            Outcome::Succeeded => write!(f, "downloaded"),
            Outcome::TimedOut => write!(f, "download timed out"),
            Outcome::Failed(FailureReason::NotFound) => write!(f, "not found in the listing"),
            Outcome::Failed(FailureReason::UiLoadTimeout) => write!(f, "listing did not load"),
            Outcome::Failed(FailureReason::ControlInteraction) => write!(f, "download control failed"),
            Outcome::Failed(FailureReason::Browser) => write!(f, "browser error"),
        }
    }
}

/// One identifier's trip through the pass
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub id: DocumentId,
    /// Report view URL, once the listing row was found
    pub report_url: Option<String>,
    pub outcome: Outcome,
}

impl DownloadTask {
    pub fn new(id: DocumentId) -> Self {
        Self {
            id,
            report_url: None,
            outcome: Outcome::Pending,
        }
    }
}

/// Outcomes of a fetch pass, in processing order
#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    pub outcomes: Vec<(DocumentId, Outcome)>,
}

impl RunSummary {
    pub fn record(&mut self, task: DownloadTask) {
        self.outcomes.push((task.id, task.outcome));
    }

    fn ids_where(&self, pred: impl Fn(&Outcome) -> bool) -> Vec<DocumentId> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| pred(outcome))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn succeeded(&self) -> Vec<DocumentId> {
        self.ids_where(|o| *o == Outcome::Succeeded)
    }

    pub fn timed_out(&self) -> Vec<DocumentId> {
        self.ids_where(|o| *o == Outcome::TimedOut)
    }

    pub fn not_found(&self) -> Vec<DocumentId> {
        self.ids_where(|o| *o == Outcome::Failed(FailureReason::NotFound))
    }

    /// Failures other than not-found
    pub fn failed(&self) -> Vec<DocumentId> {
        self.ids_where(|o| {
            matches!(o, Outcome::Failed(reason) if *reason != FailureReason::NotFound)
        })
    }
}
