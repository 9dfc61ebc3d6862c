//! Settings shared by every task of a run.

use crate::discover::ScanMode;
use crate::job::JobKind;
use crate::tools::DEFAULT_TOOL;
use std::path::PathBuf;
use std::time::Duration;

/// Highest FLAC compression level the encoder accepts.
pub const MAX_COMPRESSION_LEVEL: u8 = 12;

/// Compression level used by `wav-to-flac` unless overridden.
pub const DEFAULT_COMPRESSION_LEVEL: u8 = 8;

/// Immutable settings for one batch run or single-file call.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Directory scanned for inputs.
    pub source_root: PathBuf,
    /// Directory outputs are written under, created on demand.
    pub destination_root: PathBuf,
    /// External tool, as resolved by [`crate::tools::require_tool`].
    pub tool: PathBuf,
    /// Overrides the job kind's default scan depth.
    pub scan_mode: Option<ScanMode>,
    /// Remove both merge inputs after a successful merge.
    pub delete_originals: bool,
    /// FLAC compression level for `wav-to-flac`.
    pub compression_level: u8,
    /// Copy tags from the source for `mp3-to-flac`.
    pub preserve_metadata: bool,
    /// Worker count; 1 runs strictly sequentially, 0 uses one per CPU.
    pub jobs: usize,
    /// Per-invocation limit; `None` waits forever.
    pub timeout: Option<Duration>,
}

impl JobConfig {
    pub fn new(source_root: impl Into<PathBuf>, destination_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            destination_root: destination_root.into(),
            tool: PathBuf::from(DEFAULT_TOOL),
            scan_mode: None,
            delete_originals: false,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            preserve_metadata: true,
            jobs: 1,
            timeout: None,
        }
    }

    pub fn with_tool(mut self, tool: impl Into<PathBuf>) -> Self {
        self.tool = tool.into();
        self
    }

    pub fn with_scan_mode(mut self, mode: ScanMode) -> Self {
        self.scan_mode = Some(mode);
        self
    }

    pub fn with_delete_originals(mut self, delete: bool) -> Self {
        self.delete_originals = delete;
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Scan depth for `kind`: the explicit override, else the kind's default.
    pub fn scan_mode_for(&self, kind: JobKind) -> ScanMode {
        self.scan_mode.unwrap_or_else(|| kind.default_scan_mode())
    }

    /// Number of workers to run with, never zero.
    pub fn worker_count(&self) -> usize {
        match self.jobs {
            0 => num_cpus::get().max(1),
            n => n,
        }
    }
}
