//! Document identifiers and the on-disk naming contract
//!
//! Every downloaded document lands in the download directory as
//! `{id}_doc.pdf`. The completion detector, the pending selector and the
//! archiver all key off this exact name.

use std::collections::BTreeSet;
use std::fmt;
use std::num::ParseIntError;
use std::path::Path;
use std::str::FromStr;

/// Suffix appended to the identifier to form the document file name
pub const FILE_SUFFIX: &str = "_doc.pdf";

/// Suffixes browsers use for downloads that are still in flight
/// (Firefox writes `.part`, Chromium writes `.crdownload`)
pub const PARTIAL_SUFFIXES: &[&str] = &[".part", ".crdownload"];

/// Numeric key naming one document on the portal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentId(u64);

impl DocumentId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    /// File name this document is saved under
    pub fn file_name(self) -> String {
        format!("{}{}", self.0, FILE_SUFFIX)
    }

    /// Whether a listing title's document-number prefix names this document
    ///
    /// Titles look like `8250-some paper.pdf`; the part before the first `-`
    /// is compared as a string against the identifier.
    pub fn matches_title(self, title: &str) -> bool {
        title_number(title) == self.0.to_string()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DocumentId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl From<u64> for DocumentId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Document-number prefix of a listing title
///
/// The title is trimmed; the prefix is not, so `8250 -x` yields `8250 `.
pub fn title_number(title: &str) -> &str {
    let title = title.trim();
    title.split('-').next().unwrap_or(title)
}

/// Recover the identifier from a file name following the naming contract
pub fn parse_file_name(name: &str) -> Option<DocumentId> {
    let stem = name.strip_suffix(FILE_SUFFIX)?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

/// Whether a directory entry is an in-progress browser download
pub fn is_partial_download(name: &str) -> bool {
    PARTIAL_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// Identifiers of every document already present in `dir`
///
/// Entries that do not follow the naming contract are ignored. A missing
/// directory yields an empty set.
pub fn downloaded_ids(dir: &Path) -> std::io::Result<BTreeSet<DocumentId>> {
    let mut ids = BTreeSet::new();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
        Err(e) => return Err(e),
    };

    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(id) = parse_file_name(&entry.file_name().to_string_lossy()) {
            ids.insert(id);
        }
    }

    Ok(ids)
}
