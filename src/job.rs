//! Job kinds and their argument templates.

use crate::command::ToolCommand;
use crate::config::JobConfig;
use crate::discover::ScanMode;
use crate::paths::has_extension;
use crate::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};

/// The five conversions the runner knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Re-encode MP3 to FLAC, keeping tags and dropping cover art.
    Mp3ToFlac,
    /// Re-encode WAV to FLAC at a fixed compression level.
    WavToFlac,
    /// Re-encode M4A (AAC/ALAC) to FLAC.
    M4aToFlac,
    /// Copy the audio stream of an MP4 out into an M4A.
    ExtractAudio,
    /// Mux an MP4 and its sibling M4A back into one MP4.
    Merge,
}

impl JobKind {
    pub const ALL: [JobKind; 5] = [
        JobKind::Mp3ToFlac,
        JobKind::WavToFlac,
        JobKind::M4aToFlac,
        JobKind::ExtractAudio,
        JobKind::Merge,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            JobKind::Mp3ToFlac => "mp3-to-flac",
            JobKind::WavToFlac => "wav-to-flac",
            JobKind::M4aToFlac => "m4a-to-flac",
            JobKind::ExtractAudio => "extract-audio",
            JobKind::Merge => "merge",
        }
    }

    /// Extension of the files discovery looks for.
    pub fn source_extension(&self) -> &'static str {
        match self {
            JobKind::Mp3ToFlac => "mp3",
            JobKind::WavToFlac => "wav",
            JobKind::M4aToFlac => "m4a",
            JobKind::ExtractAudio | JobKind::Merge => "mp4",
        }
    }

    pub fn target_extension(&self) -> &'static str {
        match self {
            JobKind::Mp3ToFlac | JobKind::WavToFlac | JobKind::M4aToFlac => "flac",
            JobKind::ExtractAudio => "m4a",
            JobKind::Merge => "mp4",
        }
    }

    /// Extension of the second input a merge needs next to each source.
    pub fn paired_extension(&self) -> Option<&'static str> {
        match self {
            JobKind::Merge => Some("m4a"),
            _ => None,
        }
    }

    pub fn default_scan_mode(&self) -> ScanMode {
        match self {
            JobKind::Mp3ToFlac | JobKind::WavToFlac | JobKind::M4aToFlac => ScanMode::Recursive,
            JobKind::ExtractAudio | JobKind::Merge => ScanMode::Shallow,
        }
    }

    /// Whether a zero exit status must also leave the output on disk.
    pub fn verifies_output(&self) -> bool {
        matches!(self, JobKind::ExtractAudio)
    }

    /// Check that a task's inputs exist and carry the expected extensions.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for a missing input, [`Error::Validation`] for an
    /// extension mismatch.
    pub fn validate(&self, task: &FileTask) -> Result<()> {
        check_input(&task.source, self.source_extension())?;
        if let Some(ext) = self.paired_extension() {
            let paired = task.paired.as_deref().ok_or_else(|| {
                Error::not_found(task.source.with_extension(ext))
            })?;
            check_input(paired, ext)?;
        }
        Ok(())
    }

    /// Build the full tool invocation for `task`.
    pub fn build_command(&self, task: &FileTask, config: &JobConfig) -> ToolCommand {
        let mut cmd = ToolCommand::new(config.tool.clone());
        cmd.arg("-y").input(&task.source);

        match self {
            JobKind::Mp3ToFlac => {
                if config.preserve_metadata {
                    cmd.args(["-map_metadata", "0"]);
                }
                cmd.args(["-vn", "-c:a", "flac"]);
            }
            JobKind::WavToFlac => {
                cmd.args(["-vn", "-c:a", "flac", "-compression_level"])
                    .arg(config.compression_level.to_string());
            }
            JobKind::M4aToFlac => {
                cmd.args(["-c:a", "flac"]);
            }
            JobKind::ExtractAudio => {
                cmd.args(["-vn", "-c:a", "copy"]);
            }
            JobKind::Merge => {
                if let Some(paired) = &task.paired {
                    cmd.input(paired);
                }
                cmd.args(["-c", "copy"]);
            }
        }

        cmd.arg(task.destination.as_os_str())
            .timeout(config.timeout);
        cmd
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        JobKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown job kind: {}", s))
    }
}

/// One input (plus its merge partner) and where its output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    pub source: PathBuf,
    pub paired: Option<PathBuf>,
    pub destination: PathBuf,
}

impl FileTask {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            paired: None,
            destination: destination.into(),
        }
    }

    pub fn with_paired(mut self, paired: impl Into<PathBuf>) -> Self {
        self.paired = Some(paired.into());
        self
    }

    /// Every input file the task reads.
    pub fn inputs(&self) -> Vec<&Path> {
        std::iter::once(self.source.as_path())
            .chain(self.paired.as_deref())
            .collect()
    }
}

fn check_input(path: &Path, extension: &str) -> Result<()> {
    if !path.is_file() {
        return Err(Error::not_found(path));
    }
    if !has_extension(path, extension) {
        return Err(Error::validation(path, extension));
    }
    Ok(())
}
