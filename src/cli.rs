use clap::{Args, Parser, Subcommand};
use mediabatch::config::{DEFAULT_COMPRESSION_LEVEL, MAX_COMPRESSION_LEVEL};
use mediabatch::tools::DEFAULT_TOOL;
use mediabatch::{JobConfig, JobKind, ScanMode};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "mediabatch")]
#[command(author, version, about = "Batch-converts and remuxes media files with ffmpeg")]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check that ffmpeg can be found
    CheckTool {
        /// ffmpeg executable name or path
        #[arg(short = 'f', long, default_value = DEFAULT_TOOL)]
        ffmpeg: String,
    },

    /// Re-encode MP3 files to FLAC (recursive by default)
    Mp3ToFlac {
        #[command(flatten)]
        job: JobArgs,

        /// Do not copy tags from the MP3
        #[arg(long)]
        no_metadata: bool,
    },

    /// Re-encode WAV files to FLAC (recursive by default)
    WavToFlac {
        #[command(flatten)]
        job: JobArgs,

        /// FLAC compression level (0-12)
        #[arg(
            short = 'c',
            long,
            default_value_t = DEFAULT_COMPRESSION_LEVEL,
            value_parser = clap::value_parser!(u8).range(0..=MAX_COMPRESSION_LEVEL as i64)
        )]
        compression_level: u8,
    },

    /// Re-encode M4A files to FLAC (recursive by default)
    M4aToFlac {
        #[command(flatten)]
        job: JobArgs,
    },

    /// Copy the audio track of MP4 files out to M4A (shallow by default)
    ExtractAudio {
        #[command(flatten)]
        job: JobArgs,
    },

    /// Mux each MP4 with the M4A of the same name (shallow by default)
    Merge {
        #[command(flatten)]
        job: JobArgs,

        /// Audio file to merge when SOURCE is a single MP4
        #[arg(short = 'a', long)]
        audio: Option<PathBuf>,

        /// Delete both inputs after a successful merge
        #[arg(short = 'd', long)]
        delete_originals: bool,
    },
}

/// Arguments shared by every conversion subcommand.
#[derive(Args)]
pub struct JobArgs {
    /// Source directory, or a single input file
    pub source: PathBuf,

    /// Destination directory, or the output file when SOURCE is a file
    pub destination: PathBuf,

    /// ffmpeg executable name or path
    #[arg(short = 'f', long, default_value = DEFAULT_TOOL)]
    pub ffmpeg: String,

    /// Scan subdirectories too
    #[arg(short = 'r', long, conflicts_with = "shallow")]
    pub recursive: bool,

    /// Only scan the top level of SOURCE
    #[arg(short = 's', long)]
    pub shallow: bool,

    /// Number of files to convert in parallel (0 = one per CPU core)
    #[arg(short = 'j', long, default_value_t = 1)]
    pub jobs: usize,

    /// Kill an ffmpeg run after this many seconds
    #[arg(short = 't', long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Print the run summary as JSON after "done."
    #[arg(long)]
    pub json: bool,
}

impl JobArgs {
    pub fn scan_mode(&self) -> Option<ScanMode> {
        match (self.recursive, self.shallow) {
            (true, _) => Some(ScanMode::Recursive),
            (_, true) => Some(ScanMode::Shallow),
            _ => None,
        }
    }

    /// Flags given on the command line that only affect directory runs.
    pub fn batch_only_flags(&self) -> Vec<&'static str> {
        let mut flags = Vec::new();
        if self.recursive {
            flags.push("--recursive");
        }
        if self.shallow {
            flags.push("--shallow");
        }
        if self.jobs != 1 {
            flags.push("--jobs");
        }
        if self.json {
            flags.push("--json");
        }
        flags
    }

    pub fn to_config(&self, tool: PathBuf) -> JobConfig {
        let mut config = JobConfig::new(&self.source, &self.destination)
            .with_tool(tool)
            .with_jobs(self.jobs)
            .with_timeout(self.timeout.map(Duration::from_secs));
        config.scan_mode = self.scan_mode();
        config
    }
}

/// A conversion subcommand resolved into what the runner needs.
pub struct JobRequest {
    pub kind: JobKind,
    pub args: JobArgs,
    pub audio: Option<PathBuf>,
    pub delete_originals: bool,
    pub compression_level: u8,
    pub preserve_metadata: bool,
}

impl JobRequest {
    pub fn config(&self, tool: PathBuf) -> JobConfig {
        let mut config = self
            .args
            .to_config(tool)
            .with_delete_originals(self.delete_originals);
        config.compression_level = self.compression_level;
        config.preserve_metadata = self.preserve_metadata;
        config
    }
}

impl Commands {
    /// `None` for commands that do not convert anything.
    pub fn into_request(self) -> Option<JobRequest> {
        let request = |kind, args| JobRequest {
            kind,
            args,
            audio: None,
            delete_originals: false,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            preserve_metadata: true,
        };

        match self {
            Commands::CheckTool { .. } => None,
            Commands::Mp3ToFlac { job, no_metadata } => Some(JobRequest {
                preserve_metadata: !no_metadata,
                ..request(JobKind::Mp3ToFlac, job)
            }),
            Commands::WavToFlac {
                job,
                compression_level,
            } => Some(JobRequest {
                compression_level,
                ..request(JobKind::WavToFlac, job)
            }),
            Commands::M4aToFlac { job } => Some(request(JobKind::M4aToFlac, job)),
            Commands::ExtractAudio { job } => Some(request(JobKind::ExtractAudio, job)),
            Commands::Merge {
                job,
                audio,
                delete_originals,
            } => Some(JobRequest {
                audio,
                delete_originals,
                ..request(JobKind::Merge, job)
            }),
        }
    }
}
