//! Which wanted documents still need downloading

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use super::{MetadataError, SubmissionTable, TableSchema};
use crate::naming::DocumentId;

/// The identifiers left to fetch and how the list was whittled down
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingSelection {
    pub ids: Vec<DocumentId>,
    pub original: usize,
    pub already_downloaded: usize,
    /// Dropped because their status starts with the excluded prefix
    pub excluded: usize,
    /// Wanted but absent from the submissions table
    pub unknown: usize,
}

/// Read the wanted-list CSV (a single identifier column)
pub fn load_wanted(path: &Path, schema: &TableSchema) -> Result<Vec<DocumentId>, MetadataError> {
    let table = SubmissionTable::load(path, schema)?;
    Ok(table.rows.into_iter().map(|r| r.id).collect())
}

/// Filter the wanted list down to what is worth fetching
///
/// Keeps wanted-list order and drops duplicates. An identifier is excluded
/// when every submission row for it has a status starting with
/// `exclude_prefix`; an empty prefix excludes nothing.
pub fn select_pending(
    wanted: &[DocumentId],
    table: &SubmissionTable,
    downloaded: &BTreeSet<DocumentId>,
    exclude_prefix: &str,
) -> PendingSelection {
    let mut selection = PendingSelection {
        original: wanted.len(),
        ..Default::default()
    };
    let mut seen = HashSet::new();

    for &id in wanted {
        if !seen.insert(id) {
            continue;
        }
        if downloaded.contains(&id) {
            selection.already_downloaded += 1;
            continue;
        }

        let mut rows = table.rows.iter().filter(|r| r.id == id).peekable();
        if rows.peek().is_none() {
            selection.unknown += 1;
            continue;
        }

        let keep = rows.any(|r| match &r.status {
            Some(status) if !exclude_prefix.is_empty() => !status.starts_with(exclude_prefix),
            _ => true,
        });
        if keep {
            selection.ids.push(id);
        } else {
            selection.excluded += 1;
        }
    }

    selection
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[u64]) -> Vec<DocumentId> {
        raw.iter().copied().map(DocumentId::new).collect()
    }

    fn table() -> SubmissionTable {
        let csv = "\
Paper ID,Primary Subcommittee Selection,Decision
pn1,A,AC
pn2,A,DR
pn3,B,
pn4,B,DR-late
pn5,C,R
";
        SubmissionTable::from_reader(csv.as_bytes(), &TableSchema::default()).unwrap()
    }

    #[test]
    fn test_select_pending() {
        let downloaded: BTreeSet<_> = ids(&[5]).into_iter().collect();
        let wanted = ids(&[3, 1, 2, 4, 5, 9, 3]);

        let selection = select_pending(&wanted, &table(), &downloaded, "DR");

        assert_eq!(selection.ids, ids(&[3, 1]));
        assert_eq!(selection.original, 7);
        assert_eq!(selection.already_downloaded, 1);
        assert_eq!(selection.excluded, 2);
        assert_eq!(selection.unknown, 1);
    }

    #[test]
    fn test_empty_prefix_excludes_nothing() {
        let selection = select_pending(&ids(&[1, 2, 4]), &table(), &BTreeSet::new(), "");
        assert_eq!(selection.ids, ids(&[1, 2, 4]));
        assert_eq!(selection.excluded, 0);
    }

    #[test]
    fn test_load_wanted() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("pull_papers.csv");
        std::fs::write(&path, "Paper ID\n12\n7\n").unwrap();

        let wanted = load_wanted(&path, &TableSchema::default()).unwrap();
        assert_eq!(wanted, ids(&[12, 7]));
    }
}
