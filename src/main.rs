mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, JobRequest};
use mediabatch::{convert_file, require_tool, run_batch, Reporter};
use std::time::Instant;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise the verbose flag picks the level.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "mediabatch=debug".to_string()
        } else {
            "mediabatch=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::CheckTool { ffmpeg } => check_tool(&ffmpeg),
        command => match command.into_request() {
            Some(request) => run_request(request),
            None => Ok(()),
        },
    }
}

fn check_tool(ffmpeg: &str) -> Result<()> {
    let path = require_tool(ffmpeg)?;
    println!("{} found at {}", ffmpeg, path.display());
    Ok(())
}

fn run_request(request: JobRequest) -> Result<()> {
    let tool = require_tool(&request.args.ffmpeg)?;
    let config = request.config(tool);

    if request.args.source.is_file() {
        let ignored = request.args.batch_only_flags();
        if !ignored.is_empty() {
            tracing::warn!("{} ignored for a single file", ignored.join(", "));
        }
        convert_file(
            request.kind,
            &request.args.source,
            &request.args.destination,
            request.audio.as_deref(),
            &config,
            &Reporter::stdout(),
        )?;
        return Ok(());
    }

    let start_time = Instant::now();
    let reporter = Reporter::stdout();
    let summary = run_batch(request.kind, &config, &reporter)?;

    if request.args.json {
        reporter.summary(&summary);
    } else if summary.discovered > 0 {
        println!(
            "{} converted, {} skipped, {} failed in {:.2} seconds",
            summary.converted,
            summary.skipped,
            summary.failed,
            start_time.elapsed().as_secs_f64()
        );
    }

    Ok(())
}
