//! # mediabatch
//!
//! Batch conversion and remuxing of media files through an external tool
//! (ffmpeg). Every encode, decode and mux happens in the tool; this crate
//! finds inputs, maps them to outputs, skips work that is already done,
//! runs the tool once per file and reports what happened.
//!
//! ## Example
//!
//! ```no_run
//! use mediabatch::{require_tool, run_batch, JobConfig, JobKind, Reporter};
//!
//! let tool = require_tool("ffmpeg")?;
//! let config = JobConfig::new("/music/mp3", "/music/flac").with_tool(tool);
//! let summary = run_batch(JobKind::Mp3ToFlac, &config, &Reporter::stdout())?;
//! println!("{} converted, {} failed", summary.converted, summary.failed);
//! # Ok::<(), mediabatch::Error>(())
//! ```

pub mod command;
pub mod config;
pub mod discover;
mod error;
pub mod job;
pub mod paths;
pub mod report;
pub mod runner;
pub mod tools;

pub use config::JobConfig;
pub use discover::{discover, ScanMode, SuffixFilter};
pub use error::{Error, Result};
pub use job::{FileTask, JobKind};
pub use report::{BatchSummary, Reporter};
pub use runner::{convert_file, run_batch};
pub use tools::require_tool;
