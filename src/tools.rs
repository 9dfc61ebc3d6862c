//! External tool detection.

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Default name of the media tool.
pub const DEFAULT_TOOL: &str = "ffmpeg";

/// Require that a tool is available, returning its resolved path.
///
/// Bare names are searched on `PATH`; anything with a directory component is
/// checked as given.
///
/// # Errors
///
/// Returns [`Error::ToolNotFound`] if the tool cannot be resolved.
pub fn require_tool(tool: &str) -> Result<PathBuf> {
    let path = Path::new(tool);
    if tool.is_empty() {
        return Err(Error::tool_not_found(tool));
    }

    if path.components().count() > 1 || path.is_absolute() {
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(Error::tool_not_found(tool))
        };
    }

    let resolved = which::which(tool).map_err(|_| Error::tool_not_found(tool))?;
    tracing::debug!("resolved {} to {}", tool, resolved.display());
    Ok(resolved)
}

/// Name used for a tool in log lines and errors.
pub fn tool_name(tool: &Path) -> String {
    tool.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| tool.to_string_lossy().to_string())
}
