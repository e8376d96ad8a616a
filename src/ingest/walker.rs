use chrono::{DateTime, SubsecRound, Utc};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{RagweaveError, Result};

/// A file to ingest: canonical path plus the metadata freshness is judged on.
#[derive(Debug, Clone, PartialEq)]
pub struct FileDescriptor {
    pub path: PathBuf,
    pub size: u64,
    /// Modification time truncated to microseconds, the precision stored
    pub modified: DateTime<Utc>,
}

impl FileDescriptor {
    /// Value of the `source` property for this file.
    pub fn source(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// Describe one regular file.
pub fn describe_file(path: &Path) -> Result<FileDescriptor> {
    let path = path
        .canonicalize()
        .map_err(|e| RagweaveError::Path(format!("{}: {}", path.display(), e)))?;
    let metadata = std::fs::metadata(&path)?;
    if !metadata.is_file() {
        return Err(RagweaveError::Path(format!(
            "{} is not a regular file",
            path.display()
        )));
    }
    let modified: DateTime<Utc> = metadata.modified()?.into();

    Ok(FileDescriptor {
        path,
        size: metadata.len(),
        modified: modified.trunc_subsecs(6),
    })
}

/// Depth-first sequence of the files under `path`, in file-name order.
///
/// A single file yields itself. A directory requires `recursive`; anything
/// else (missing path, socket, device) is a [`RagweaveError::Path`] raised
/// before any file is produced.
pub fn walk(
    path: &Path,
    recursive: bool,
) -> Result<Box<dyn Iterator<Item = Result<FileDescriptor>> + Send>> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        RagweaveError::Path(format!("{}: {}", path.display(), e))
    })?;

    if metadata.is_file() {
        return Ok(Box::new(std::iter::once(describe_file(path))));
    }

    if !metadata.is_dir() {
        return Err(RagweaveError::Path(format!(
            "{} is neither a file nor a directory",
            path.display()
        )));
    }

    if !recursive {
        return Err(RagweaveError::Path(format!(
            "{} is a directory; pass --recursive to ingest its contents",
            path.display()
        )));
    }

    let files = WalkDir::new(path)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) if entry.file_type().is_file() => Some(describe_file(entry.path())),
            Ok(_) => None,
            Err(e) => Some(Err(RagweaveError::Path(e.to_string()))),
        });
    Ok(Box::new(files))
}

/// `source` key for a path that may no longer exist on disk.
pub fn resolve_source(path: &Path) -> String {
    if let Ok(canonical) = path.canonicalize() {
        return canonical.to_string_lossy().into_owned();
    }
    if path.is_absolute() {
        return path.to_string_lossy().into_owned();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}
