//! Error types for mediabatch.

use std::path::PathBuf;
use std::time::Duration;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the batch runner and the single-file entry points.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The external tool could not be resolved.
    #[error("tool not found: {tool}")]
    ToolNotFound { tool: String },

    /// A source directory, input file or paired stream file is missing.
    #[error("not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// An input file has the wrong extension for the job kind.
    #[error("invalid input {}: expected .{expected}", path.display())]
    Validation { path: PathBuf, expected: String },

    /// The external tool exited with a nonzero status.
    #[error("{tool} failed on {}: {diagnostic}", display_inputs(inputs))]
    ToolInvocation {
        tool: String,
        inputs: Vec<PathBuf>,
        diagnostic: String,
    },

    /// The external tool reported success but the output is missing.
    #[error("{tool} finished but output not found: {}", output.display())]
    IncompleteOutput { tool: String, output: PathBuf },

    /// The external tool ran past the configured timeout and was killed.
    #[error("{tool} timed out after {timeout:?} on {}", display_inputs(inputs))]
    TimedOut {
        tool: String,
        inputs: Vec<PathBuf>,
        timeout: Duration,
    },

    /// The worker pool could not be built.
    #[error("worker pool: {0}")]
    Pool(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn validation(path: impl Into<PathBuf>, expected: impl Into<String>) -> Self {
        Self::Validation {
            path: path.into(),
            expected: expected.into(),
        }
    }
}

fn display_inputs(inputs: &[PathBuf]) -> String {
    inputs
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
