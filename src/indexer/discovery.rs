// Source file discovery

use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::Config;
use crate::error::{Error, Result};

/// A discovered source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Project-relative path with forward slashes
    pub path: String,
    pub absolute: PathBuf,
}

/// Recursively lists source files under `root`, sorted by relative path.
///
/// Directories on the ignore list and every dot-entry below the root are
/// skipped. Fails only when the root itself cannot be walked.
pub fn discover(root: &Path, config: &Config) -> Result<Vec<SourceFile>> {
    let metadata = std::fs::metadata(root).map_err(|e| Error::io(root, e))?;
    if !metadata.is_dir() {
        return Err(Error::io(
            root,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "project root is not a directory"),
        ));
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_ignored(entry, config));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if !config.has_source_extension(name) {
            continue;
        }

        if let Some(path) = relative_path(root, entry.path()) {
            files.push(SourceFile {
                path,
                absolute: entry.path().to_path_buf(),
            });
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    debug!("Discovered {} source files under {}", files.len(), root.display());
    Ok(files)
}

fn is_ignored(entry: &DirEntry, config: &Config) -> bool {
    let name = entry.file_name().to_string_lossy();
    if name.starts_with('.') {
        return true;
    }
    entry.file_type().is_dir() && config.is_excluded_dir(&name)
}

/// Project-relative, forward-slash form of `path`, or `None` if it lies outside `root`
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?.to_string()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Lexically normalizes a forward-slash relative path, resolving `.` and `..`.
/// Returns `None` when the path climbs above its starting point.
pub fn normalize_lexical(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}
