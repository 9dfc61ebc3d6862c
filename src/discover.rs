//! Input discovery under a source root.

use crate::{Error, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// How deep discovery looks below the source root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Immediate children of the root only.
    Shallow,
    /// The entire subtree.
    Recursive,
}

/// Glob-style file name filter such as `*.mp3`.
///
/// Matching is case-insensitive; a bare extension (`mp3` or `.mp3`) is
/// treated as `*.mp3`.
#[derive(Debug, Clone)]
pub struct SuffixFilter {
    pattern: String,
    regex: Regex,
}

impl SuffixFilter {
    pub fn new(pattern: &str) -> Result<Self> {
        let glob = if pattern.contains('*') || pattern.contains('?') {
            pattern.to_string()
        } else {
            format!("*.{}", pattern.trim_start_matches('.'))
        };

        let body = regex::escape(&glob)
            .replace(r"\*", ".*")
            .replace(r"\?", ".");
        let regex = Regex::new(&format!("(?i)^{}$", body))
            .map_err(|e| Error::validation(pattern, format!("glob pattern ({})", e)))?;

        Ok(Self {
            pattern: glob,
            regex,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Check a path's file name against the filter.
    pub fn matches(&self, path: &Path) -> bool {
        path.file_name()
            .map(|name| self.regex.is_match(&name.to_string_lossy()))
            .unwrap_or(false)
    }
}

/// Enumerate files under `root` matching `filter`, in lexicographic order.
///
/// An empty result is not an error. A missing root is.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if `root` is not an existing directory.
pub fn discover(root: &Path, filter: &SuffixFilter, mode: ScanMode) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(Error::not_found(root));
    }

    let mut walker = WalkDir::new(root).min_depth(1).sort_by_file_name();
    if mode == ScanMode::Shallow {
        walker = walker.max_depth(1);
    }

    let mut files: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("skipping unreadable entry under {}: {}", root.display(), e);
                None
            }
        })
        .filter(|entry| entry.path().is_file() && filter.matches(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();

    tracing::debug!(
        "discovered {} files matching {} under {} ({:?})",
        files.len(),
        filter.pattern(),
        root.display(),
        mode
    );
    Ok(files)
}
