//! Zip a directory tree

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;

use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::ArchiveError;

/// Write every entry under `src_dir` into a fresh zip at `zip_path`
///
/// Entry names are relative to `src_dir` with `/` separators. An existing
/// archive is overwritten. Returns the number of files stored.
pub fn zip_dir(src_dir: &Path, zip_path: &Path) -> Result<usize, ArchiveError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: io::Error| ArchiveError::Io { path, source }
    };

    let file = File::create(zip_path).map_err(io_err(zip_path))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut files = 0usize;
    for entry in WalkDir::new(src_dir).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let Ok(relative) = entry.path().strip_prefix(src_dir) else {
            continue;
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if entry.file_type().is_dir() {
            zip.add_directory(format!("{}/", name), options)?;
        } else {
            zip.start_file(name, options)?;
            let mut source = File::open(entry.path()).map_err(io_err(entry.path()))?;
            io::copy(&mut source, &mut zip).map_err(io_err(entry.path()))?;
            files += 1;
        }
    }

    zip.finish()?;
    Ok(files)
}
