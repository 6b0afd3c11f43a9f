//! Sort downloaded documents into per-classification folders and zips
//!
//! Runs after the download pass, independently of the browser. Files are
//! copied, never moved, so the download directory stays intact.

mod bundle;

pub use bundle::zip_dir;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use indicatif::ProgressBar;
use tracing::{debug, info, warn};

use crate::metadata::{MetadataError, SubmissionRow, SubmissionTable, TableSchema};
use crate::naming::{downloaded_ids, DocumentId};

/// Directory name used for rows with an empty classification
pub const UNCLASSIFIED: &str = "unclassified";

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("Metadata table has no `{0}` column to group by")]
    NoClassification(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Failed to write zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Where the sort pass reads from and writes to
#[derive(Debug, Clone)]
pub struct SortLayout {
    /// Directory scanned for downloaded documents
    pub scan_dir: PathBuf,
    /// Directory documents are copied from (usually the scan directory)
    pub source_dir: PathBuf,
    /// Receives one subdirectory and one zip per classification
    pub output_dir: PathBuf,
}

impl SortLayout {
    pub fn new(download_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        let download_dir = download_dir.into();
        Self {
            scan_dir: download_dir.clone(),
            source_dir: download_dir,
            output_dir: output_dir.into(),
        }
    }
}

/// One classification's folder and archive
#[derive(Debug, Clone, Default)]
pub struct GroupReport {
    /// Classification value exactly as it appears in the metadata
    pub value: String,
    /// Directory and archive stem derived from `value`
    pub name: String,
    pub dir: PathBuf,
    pub archive: PathBuf,
    pub copied: Vec<DocumentId>,
    /// File names with no backing file in the source directory
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SortReport {
    pub groups: Vec<GroupReport>,
}

impl SortReport {
    /// Group for a classification value
    pub fn group(&self, value: &str) -> Option<&GroupReport> {
        self.groups.iter().find(|g| g.value == value)
    }
}

/// Directory-safe name for a classification value
///
/// Whitespace is kept, so values differing only in spacing stay apart. The
/// empty value cannot name a directory and becomes [`UNCLASSIFIED`]; path
/// separators become `_` and names made only of dots are neutralised so a
/// group cannot escape the output directory.
pub fn group_name(classification: &str) -> String {
    if classification.is_empty() {
        return UNCLASSIFIED.to_string();
    }
    let name = classification.replace(['/', '\\'], "_");
    if name.chars().all(|c| c == '.') {
        return "_".repeat(name.len());
    }
    name
}

/// Load the metadata table and sort the download directory by it
pub fn sort_from_file(
    metadata: &Path,
    schema: &TableSchema,
    layout: &SortLayout,
    progress: &ProgressBar,
) -> Result<SortReport, ArchiveError> {
    let table = SubmissionTable::load(metadata, schema)?;
    if !table.has_classification {
        return Err(ArchiveError::NoClassification(schema.class_column.clone()));
    }
    sort_documents(&table, layout, progress)
}

/// Copy each downloaded document into its classification folder, then zip
/// every folder
pub fn sort_documents(
    table: &SubmissionTable,
    layout: &SortLayout,
    progress: &ProgressBar,
) -> Result<SortReport, ArchiveError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| ArchiveError::Io { path, source }
    };

    std::fs::create_dir_all(&layout.output_dir).map_err(io_err(layout.output_dir.as_path()))?;
    let downloaded = downloaded_ids(&layout.scan_dir).map_err(io_err(layout.scan_dir.as_path()))?;
    debug!("{} documents in {}", downloaded.len(), layout.scan_dir.display());

    let groups = partition(table.rows.iter().filter(|r| downloaded.contains(&r.id)));
    progress.set_length(groups.len() as u64);

    let mut report = SortReport::default();
    let mut taken = HashSet::new();
    for (value, rows) in groups {
        let name = unique_name(group_name(&value), &mut taken);
        progress.set_message(name.clone());

        let dir = layout.output_dir.join(&name);
        std::fs::create_dir_all(&dir).map_err(io_err(dir.as_path()))?;

        let mut group = GroupReport {
            value,
            name: name.clone(),
            archive: layout.output_dir.join(format!("{}.zip", name)),
            ..Default::default()
        };

        for row in rows {
            let filename = row.id.file_name();
            let src = layout.source_dir.join(&filename);
            if !src.is_file() {
                warn!("File {} not found in {}", filename, layout.source_dir.display());
                progress.println(format!(
                    "File {} not found in {}",
                    filename,
                    layout.source_dir.display()
                ));
                group.missing.push(filename);
                continue;
            }
            let dest = dir.join(&filename);
            std::fs::copy(&src, &dest).map_err(io_err(dest.as_path()))?;
            group.copied.push(row.id);
        }

        let files = zip_dir(&dir, &group.archive)?;
        info!("Wrote {} ({} files)", group.archive.display(), files);

        group.dir = dir;
        report.groups.push(group);
        progress.inc(1);
    }

    Ok(report)
}

/// Bucket rows by raw classification value, in order of first appearance
fn partition<'a>(rows: impl Iterator<Item = &'a SubmissionRow>) -> Vec<(String, Vec<&'a SubmissionRow>)> {
    let mut groups: Vec<(String, Vec<&SubmissionRow>)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for row in rows {
        match index.get(row.classification.as_str()) {
            Some(&i) => groups[i].1.push(row),
            None => {
                index.insert(&row.classification, groups.len());
                groups.push((row.classification.clone(), vec![row]));
            }
        }
    }

    groups
}

/// `base`, or `base_2`, `base_3`... if distinct values sanitise to the same name
fn unique_name(base: String, taken: &mut HashSet<String>) -> String {
    if taken.insert(base.clone()) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}_{}", base, n);
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
