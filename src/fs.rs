use anyhow::{Context, Result};
use glob::Pattern;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Lists the files under each of `start_from` whose name matches `pattern`.
///
/// Locations that do not exist are silently skipped, so that callers can
/// probe candidate directories without checking them first.
pub fn find_files(pattern: &str, start_from: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>> {
    let pattern =
        Pattern::new(pattern).with_context(|| format!("Invalid file pattern {}", pattern))?;

    let mut matches = Vec::new();
    for path in start_from {
        if !path.exists() {
            continue;
        }

        let mut walkdir = WalkDir::new(path);
        if !recursive {
            walkdir = walkdir.max_depth(1);
        }
        for entry in walkdir.into_iter().filter_map(|entry| entry.ok()) {
            if entry.file_type().is_file()
                && pattern.matches(&entry.file_name().to_string_lossy())
            {
                matches.push(entry.into_path());
            }
        }
    }

    Ok(matches)
}

/// Returns the first file matching `pattern`, searching `start_from` in order.
pub fn find_one(pattern: &str, start_from: &[PathBuf], recursive: bool) -> Result<Option<PathBuf>> {
    Ok(find_files(pattern, start_from, recursive)?.into_iter().next())
}

/// Removes every file matching `pattern` under `start_from`, reporting each
/// removed path through `removed`.
pub fn delete(
    pattern: &str,
    start_from: &Path,
    recursive: bool,
    removed: &mut dyn FnMut(&Path),
) -> Result<()> {
    for path in find_files(pattern, &[start_from.to_path_buf()], recursive)? {
        fs::remove_file(&path)
            .with_context(|| format!("Failed to remove file {}", path.display()))?;
        removed(&path);
    }

    Ok(())
}

/// Removes `dir` and everything underneath it, reporting each removed file
/// through `removed`.
///
/// The walk is bottom-up so that directories are empty by the time they are
/// removed. A missing `dir` is not an error.
pub fn remove_dir_recursive(dir: &Path, removed: &mut dyn FnMut(&Path)) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }

    for entry in WalkDir::new(dir).contents_first(true) {
        let entry = entry.with_context(|| format!("Failed to walk directory {}", dir.display()))?;
        let path = entry.path();
        if entry.file_type().is_dir() {
            fs::remove_dir(path)
                .with_context(|| format!("Failed to remove directory {}", path.display()))?;
        } else {
            fs::remove_file(path)
                .with_context(|| format!("Failed to remove file {}", path.display()))?;
            removed(path);
        }
    }

    Ok(())
}
