//! Unit files on disk: discovery and pre-patch backups.
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};
use zip::CompressionMethod;
use zip::write::FileOptions;

pub const UNIT_EXTENSION: &str = "unit";

pub fn is_unit_file(p: &Path) -> bool {
    p.is_file() && p.extension().is_some_and(|ext| ext == UNIT_EXTENSION)
}

/// Entries below `dir` (excluding `dir` itself), with `/`-separated relative names.
fn entries(dir: &Path) -> io::Result<Vec<(String, DirEntry)>> {
    let mut out = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(io::Error::other)?;
        let Ok(rel) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let rel = rel.to_string_lossy().replace('\\', "/");
        out.push((rel, entry));
    }
    Ok(out)
}

/// Every `.unit` file below `dir`, sorted by path.
pub fn find_unit_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = entries(dir)?
        .into_iter()
        .map(|(_, e)| e.into_path())
        .filter(|p| is_unit_file(p))
        .collect();
    files.sort();
    Ok(files)
}

/// Zip `dir` into `<parent>/<name>_<timestamp>.zip` and return the archive path.
/// The directory itself is left untouched.
pub fn zip_backup_dir(dir: &Path) -> io::Result<PathBuf> {
    if !dir.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a directory", dir.display()),
        ));
    }
    let stem = dir
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "units".to_string());
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let dest = dir
        .parent()
        .unwrap_or(Path::new("."))
        .join(format!("{stem}_{stamp}.zip"));

    let mut archive = zip::ZipWriter::new(File::create(&dest)?);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);
    let mut files = 0usize;
    for (name, entry) in entries(dir)? {
        if entry.file_type().is_dir() {
            archive.add_directory(name, options)?;
            continue;
        }
        archive.start_file(name, options)?;
        io::copy(&mut File::open(entry.path())?, &mut archive)?;
        files += 1;
    }
    archive.finish()?;
    tracing::info!(backup = %dest.display(), files, "wrote unit backup");
    Ok(dest)
}
