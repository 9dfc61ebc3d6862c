//! Destination path mapping.

use crate::discover::ScanMode;
use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Compute where a discovered input lands under `destination_root`.
///
/// Recursive jobs keep the input's position relative to `source_root`;
/// shallow jobs keep only the file name. The extension is replaced by
/// `extension` in both cases.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if `source` has no file name.
pub fn map_destination(
    source: &Path,
    source_root: &Path,
    destination_root: &Path,
    extension: &str,
    mode: ScanMode,
) -> Result<PathBuf> {
    let file_name = source.file_name().ok_or_else(|| Error::not_found(source))?;

    let relative = match mode {
        ScanMode::Recursive => source
            .strip_prefix(source_root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| PathBuf::from(file_name)),
        ScanMode::Shallow => PathBuf::from(file_name),
    };

    Ok(destination_root
        .join(relative)
        .with_extension(extension.trim_start_matches('.')))
}

/// Create every missing parent directory of `destination`.
///
/// Safe to call repeatedly and from several workers at once.
pub fn ensure_parent(destination: &Path) -> Result<()> {
    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Case-insensitive extension check.
pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case(extension.trim_start_matches('.')))
        .unwrap_or(false)
}
