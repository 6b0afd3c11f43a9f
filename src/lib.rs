//! docharvest - document portal harvester
//!
//! Logs into a document portal through WebDriver, pages through its listing
//! to download each wanted PDF, and sorts the results into per-category
//! zip archives using a submissions spreadsheet.

pub mod archive;
pub mod browser;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod fetch;
pub mod metadata;
pub mod naming;
