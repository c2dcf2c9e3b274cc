//! Packaging of builder output into a zip archive.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::{ForgeError, Result};

/// What went into an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub files: usize,
    /// Uncompressed bytes.
    pub input_bytes: u64,
    /// Size of the finished archive.
    pub archive_bytes: u64,
}

/// Whether `dir` exists and contains at least one regular file.
pub fn has_output(dir: &Path) -> bool {
    dir.is_dir()
        && WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .any(|e| e.file_type().is_file())
}

/// Zip every file under `source_dir` into `archive_path`.
///
/// Entries are stored relative to `source_dir` with `/` separators, in
/// sorted order so identical trees produce identical archives. Symlinks are
/// skipped. Blocking; run it on the blocking pool.
pub fn build_archive(source_dir: &Path, archive_path: &Path) -> Result<ArchiveSummary> {
    let file = File::create(archive_path)
        .map_err(|e| ForgeError::io("creating archive", archive_path, e))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);

    let mut files = 0usize;
    let mut input_bytes = 0u64;

    for entry in WalkDir::new(source_dir).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        let relative = match path.strip_prefix(source_dir) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel,
            _ => continue,
        };
        let name = entry_name(relative);

        if entry.file_type().is_dir() {
            zip.add_directory(format!("{name}/"), options)?;
        } else if entry.file_type().is_file() {
            zip.start_file(name.as_str(), options)?;
            let mut source =
                File::open(path).map_err(|e| ForgeError::io("opening output file", path, e))?;
            let copied = std::io::copy(&mut source, &mut zip)
                .map_err(|e| ForgeError::io("writing archive entry", path, e))?;
            debug!("Archived {} ({} bytes)", name, copied);
            files += 1;
            input_bytes += copied;
        } else {
            warn!("Skipping non-regular file in builder output: {}", path.display());
        }
    }

    let mut writer = zip.finish()?;
    writer
        .flush()
        .map_err(|e| ForgeError::io("flushing archive", archive_path, e))?;
    drop(writer);

    let archive_bytes = std::fs::metadata(archive_path)
        .map_err(|e| ForgeError::io("reading archive metadata", archive_path, e))?
        .len();

    Ok(ArchiveSummary {
        files,
        input_bytes,
        archive_bytes,
    })
}

/// Zip entry name for a relative path.
fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
