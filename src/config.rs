//! Run configuration
//!
//! [`PortalProfile`] describes the external site (URLs, selectors, waits)
//! and is loaded from a JSON file. [`FetchSettings`] holds the local paths a
//! fetch pass reads and writes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::browser::By;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Portal profile not found: {0}")]
    PortalNotFound(PathBuf),

    #[error("Invalid portal profile {path}: {source}")]
    InvalidPortal {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Portal profile is missing `{0}`")]
    MissingUrl(&'static str),

    #[error("Credentials file not found: {0}")]
    CredentialsNotFound(PathBuf),

    #[error("Invalid credentials file {path}: {source}")]
    InvalidCredentials {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Download directory not found: {0}")]
    DownloadDirNotFound(PathBuf),

    #[error("Failure log {path} is not writable: {source}")]
    LogUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Timing value `{0}` must be greater than zero")]
    ZeroTiming(&'static str),
}

/// CSS/XPath selectors for the portal's UI surface
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Selectors {
    pub username_field: By,
    pub password_field: By,
    pub login_button: By,
    /// One element per document in the listing table
    pub document_row: By,
    /// Title span, looked up inside a row
    pub row_title: By,
    /// Link to the document's report view, looked up inside a row
    pub row_action: By,
    pub next_page: By,
    /// Control on the report view that starts the PDF download
    pub download_control: By,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            username_field: By::Id("username".into()),
            password_field: By::Id("password".into()),
            login_button: By::XPath(r#"//input[@value="Login"]"#.into()),
            document_row: By::Css(".document_row".into()),
            row_title: By::Css(".td_title .document_title".into()),
            row_action: By::Css("a.btn.btn-default-alt, a.btn.btn-primary".into()),
            next_page: By::LinkText("Next".into()),
            download_control: By::XPath(r#"//*[@id="sc2749"]"#.into()),
        }
    }
}

/// Bounded waits and settle delays, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// How long to wait for the listing rows to appear
    pub row_wait_secs: u64,
    /// How long to wait for the download control to become clickable
    pub control_wait_secs: u64,
    /// Upper bound on a single file download
    pub download_timeout_secs: u64,
    /// Interval between download directory listings
    pub download_poll_secs: u64,
    /// Pause after clicking "Next"
    pub page_settle_secs: u64,
    /// Pause after submitting the login form
    pub login_settle_secs: u64,
    /// Interval between element lookups inside a bounded wait, in milliseconds
    pub element_poll_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            row_wait_secs: 10,
            control_wait_secs: 15,
            download_timeout_secs: 120,
            download_poll_secs: 2,
            page_settle_secs: 3,
            login_settle_secs: 5,
            element_poll_ms: 500,
        }
    }
}

impl Timing {
    pub fn row_wait(&self) -> Duration {
        Duration::from_secs(self.row_wait_secs)
    }

    pub fn control_wait(&self) -> Duration {
        Duration::from_secs(self.control_wait_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn download_poll(&self) -> Duration {
        Duration::from_secs(self.download_poll_secs)
    }

    pub fn page_settle(&self) -> Duration {
        Duration::from_secs(self.page_settle_secs)
    }

    pub fn login_settle(&self) -> Duration {
        Duration::from_secs(self.login_settle_secs)
    }

    pub fn element_poll(&self) -> Duration {
        Duration::from_millis(self.element_poll_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.download_poll_secs == 0 {
            return Err(ConfigError::ZeroTiming("download_poll_secs"));
        }
        if self.element_poll_ms == 0 {
            return Err(ConfigError::ZeroTiming("element_poll_ms"));
        }
        Ok(())
    }
}

/// Everything the fetch pass needs to know about the external site
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortalProfile {
    #[serde(default)]
    pub login_url: String,

    /// Root of the paginated document listing
    #[serde(default)]
    pub listing_url: String,

    #[serde(default)]
    pub selectors: Selectors,

    #[serde(default)]
    pub timing: Timing,
}

impl PortalProfile {
    /// Load a profile from a JSON file and validate it
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::PortalNotFound(path.to_path_buf()))?;

        let profile: Self =
            serde_json::from_str(&content).map_err(|source| ConfigError::InvalidPortal {
                path: path.to_path_buf(),
                source,
            })?;

        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.login_url.trim().is_empty() {
            return Err(ConfigError::MissingUrl("login_url"));
        }
        if self.listing_url.trim().is_empty() {
            return Err(ConfigError::MissingUrl("listing_url"));
        }
        self.timing.validate()
    }
}

/// Local paths for a fetch pass
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Directory the browser saves downloads into
    pub download_dir: PathBuf,

    /// Append-only log of verified download failures
    pub failure_log: PathBuf,

    /// Page markup of the most recent control failure
    pub debug_dump: PathBuf,
}

impl FetchSettings {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            failure_log: PathBuf::from("failed.txt"),
            debug_dump: PathBuf::from("page_source.html"),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.download_dir.is_dir() {
            return Err(ConfigError::DownloadDirNotFound(self.download_dir.clone()));
        }
        Ok(())
    }
}
