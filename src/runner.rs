//! Batch runner: discovery, skip gate, invocation and reporting per file.

use crate::config::JobConfig;
use crate::discover::{discover, ScanMode, SuffixFilter};
use crate::job::{FileTask, JobKind};
use crate::paths::{ensure_parent, map_destination};
use crate::report::{BatchSummary, Reporter, TaskReport, TaskState};
use crate::{Error, Result};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Destinations already handed to a worker in this run.
#[derive(Default)]
struct Claims {
    taken: Mutex<HashSet<PathBuf>>,
}

impl Claims {
    /// True if `destination` was free and is now ours.
    fn claim(&self, destination: &Path) -> bool {
        let mut taken = match self.taken.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        taken.insert(destination.to_path_buf())
    }
}

/// Run `kind` over every matching file under `config.source_root`.
///
/// Failures of individual files are reported and counted, never returned.
///
/// # Errors
///
/// - [`Error::NotFound`] if the source root does not exist; nothing under
///   the destination root is touched in that case.
/// - [`Error::Io`] if the destination root cannot be created.
/// - [`Error::Pool`] if a multi-worker pool cannot be built.
pub fn run_batch(kind: JobKind, config: &JobConfig, reporter: &Reporter) -> Result<BatchSummary> {
    let mode = config.scan_mode_for(kind);
    let extension = kind.source_extension();
    let filter = SuffixFilter::new(extension)?;
    let sources = discover(&config.source_root, &filter, mode)?;

    let mut summary = BatchSummary::new(kind);
    summary.discovered = sources.len();

    if sources.is_empty() {
        reporter.no_files(extension);
        reporter.done();
        return Ok(summary);
    }

    reporter.found(sources.len(), extension);
    fs::create_dir_all(&config.destination_root)?;

    let claims = Claims::default();
    let workers = config.worker_count();
    let reports: Vec<TaskReport> = if workers == 1 {
        sources
            .iter()
            .map(|source| process_source(kind, config, mode, source, &claims, reporter))
            .collect()
    } else {
        tracing::debug!("running {} with {} workers", kind, workers);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| Error::Pool(e.to_string()))?;
        pool.install(|| {
            sources
                .par_iter()
                .map(|source| process_source(kind, config, mode, source, &claims, reporter))
                .collect()
        })
    };

    for report in &reports {
        summary.record(report);
    }
    reporter.done();

    tracing::info!(
        "{}: {} converted, {} skipped, {} failed",
        kind,
        summary.converted,
        summary.skipped,
        summary.failed
    );
    Ok(summary)
}

/// Convert one file outside of a batch. Every error propagates.
///
/// For [`JobKind::Merge`], `paired` defaults to the `.m4a` next to `input`,
/// and `config.delete_originals` removes both inputs once the merge succeeds.
/// There is no skip gate: an existing `output` is overwritten.
pub fn convert_file(
    kind: JobKind,
    input: &Path,
    output: &Path,
    paired: Option<&Path>,
    config: &JobConfig,
    reporter: &Reporter,
) -> Result<TaskReport> {
    let mut task = FileTask::new(input, output);
    if let Some(ext) = kind.paired_extension() {
        let paired = paired
            .map(Path::to_path_buf)
            .unwrap_or_else(|| input.with_extension(ext));
        task = task.with_paired(paired);
    }
    execute_task(kind, &task, config)?;

    reporter.converted(&task);
    let mut report = TaskReport::new(TaskState::Done);
    if config.delete_originals && kind == JobKind::Merge {
        delete_inputs(&task, reporter, &mut report);
    }
    Ok(report)
}

/// Validate, invoke the tool and check the artifact for one task.
///
/// # Errors
///
/// [`Error::NotFound`] / [`Error::Validation`] before anything runs, then
/// [`Error::ToolInvocation`], [`Error::TimedOut`] or
/// [`Error::IncompleteOutput`] from the invocation itself.
pub fn execute_task(kind: JobKind, task: &FileTask, config: &JobConfig) -> Result<()> {
    kind.validate(task)?;
    ensure_parent(&task.destination)?;

    tracing::info!("converting {} -> {}", task.source.display(), task.destination.display());
    let command = kind.build_command(task, config);
    command.execute()?;

    if kind.verifies_output() && !task.destination.is_file() {
        return Err(Error::IncompleteOutput {
            tool: crate::tools::tool_name(command.program()),
            output: task.destination.clone(),
        });
    }
    Ok(())
}

fn process_source(
    kind: JobKind,
    config: &JobConfig,
    mode: ScanMode,
    source: &Path,
    claims: &Claims,
    reporter: &Reporter,
) -> TaskReport {
    let destination = match map_destination(
        source,
        &config.source_root,
        &config.destination_root,
        kind.target_extension(),
        mode,
    ) {
        Ok(destination) => destination,
        Err(e) => {
            reporter.failed(source, &e);
            return TaskReport::new(TaskState::Failed);
        }
    };

    let mut task = FileTask::new(source, destination);
    if let Some(ext) = kind.paired_extension() {
        let paired = source.with_extension(ext);
        if !paired.is_file() {
            tracing::warn!("no {} next to {}, skipping", ext, source.display());
            reporter.warning(format_args!("{} not found", paired.display()));
            let mut report = TaskReport::new(TaskState::Skipped);
            report.warnings += 1;
            return report;
        }
        task = task.with_paired(paired);
    }

    if task.destination.exists() || !claims.claim(&task.destination) {
        tracing::debug!("{} exists, skipping", task.destination.display());
        reporter.skipped(&task.destination);
        return TaskReport::new(TaskState::Skipped);
    }

    match execute_task(kind, &task, config) {
        Ok(()) => {
            reporter.converted(&task);
            let mut report = TaskReport::new(TaskState::Done);
            if config.delete_originals && kind == JobKind::Merge {
                delete_inputs(&task, reporter, &mut report);
            }
            report
        }
        Err(e) => {
            tracing::warn!("{} failed: {}", task.source.display(), e);
            reporter.failed(&task.source, &e);
            TaskReport::new(TaskState::Failed)
        }
    }
}

/// Remove every input of a finished task. Each removal stands alone.
fn delete_inputs(task: &FileTask, reporter: &Reporter, report: &mut TaskReport) {
    for input in task.inputs() {
        if !input.exists() {
            reporter.warning(format_args!("{} not found, nothing to delete", input.display()));
            report.warnings += 1;
            continue;
        }
        match fs::remove_file(input) {
            Ok(()) => {
                reporter.deleted(input);
                report.deleted += 1;
            }
            Err(e) => {
                tracing::warn!("could not delete {}: {}", input.display(), e);
                reporter.warning(format_args!("could not delete {}: {}", input.display(), e));
                report.warnings += 1;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::report::tests::SharedBuffer;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Fake tool that logs its argv and writes its last argument.
    fn fake_tool(dir: &TempDir, body: &str) -> (PathBuf, PathBuf) {
        let log = dir.path().join("calls.log");
        let tool = dir.path().join("fake-ffmpeg");
        let script = format!(
            "#!/bin/sh\necho \"$@\" >> '{}'\nfor last; do :; done\n{}\n",
            log.display(),
            body
        );
        fs::write(&tool, script).unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();
        (tool, log)
    }

    fn calls(log: &Path) -> usize {
        fs::read_to_string(log).map(|s| s.lines().count()).unwrap_or(0)
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"data").unwrap();
    }

    #[test]
    fn skip_gate_makes_second_run_a_no_op() {
        let tmp = TempDir::new().unwrap();
        let (tool, log) = fake_tool(&tmp, "printf x > \"$last\"");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        touch(&src.join("a.wav"));
        touch(&src.join("live/b.wav"));

        let config = JobConfig::new(&src, &dst).with_tool(&tool);
        let reporter = Reporter::new(SharedBuffer::default());

        let first = run_batch(JobKind::WavToFlac, &config, &reporter).unwrap();
        assert_eq!(first.converted, 2);
        assert!(dst.join("live/b.flac").is_file());
        assert_eq!(calls(&log), 2);

        let second = run_batch(JobKind::WavToFlac, &config, &reporter).unwrap();
        assert_eq!(second.skipped, 2);
        assert_eq!(second.converted, 0);
        assert_eq!(calls(&log), 2);
    }

    #[test]
    fn failure_is_isolated_per_file() {
        let tmp = TempDir::new().unwrap();
        let (tool, log) = fake_tool(
            &tmp,
            "case \"$3\" in *bad*) echo 'Invalid data' >&2; exit 1;; esac\nprintf x > \"$last\"",
        );
        let src = tmp.path().join("src");
        touch(&src.join("bad.mp3"));
        touch(&src.join("good.mp3"));

        let buf = SharedBuffer::default();
        let config = JobConfig::new(&src, tmp.path().join("dst")).with_tool(&tool);
        let summary = run_batch(JobKind::Mp3ToFlac, &config, &Reporter::new(buf.clone())).unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.converted, 1);
        assert_eq!(calls(&log), 2);
        let out = buf.contents();
        assert!(out.contains("[fail]"), "{out}");
        assert!(out.contains("Invalid data"), "{out}");
        assert!(out.ends_with("done.\n"), "{out}");
    }

    #[test]
    fn empty_source_never_invokes_tool() {
        let tmp = TempDir::new().unwrap();
        let (tool, log) = fake_tool(&tmp, "");
        let src = tmp.path().join("src");
        touch(&src.join("cover.jpg"));

        let buf = SharedBuffer::default();
        let config = JobConfig::new(&src, tmp.path().join("dst")).with_tool(&tool);
        let summary = run_batch(JobKind::M4aToFlac, &config, &Reporter::new(buf.clone())).unwrap();

        assert_eq!(summary.discovered, 0);
        assert_eq!(calls(&log), 0);
        assert_eq!(buf.contents(), "no m4a files found.\ndone.\n");
        assert!(!tmp.path().join("dst").exists());
    }

    #[test]
    fn missing_source_fails_before_destination_is_created() {
        let tmp = TempDir::new().unwrap();
        let dst = tmp.path().join("dst");
        let config = JobConfig::new(tmp.path().join("absent"), &dst);
        let err = run_batch(JobKind::Mp3ToFlac, &config, &Reporter::new(SharedBuffer::default()))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert!(!dst.exists());
    }

    #[test]
    fn extraction_without_output_is_incomplete() {
        let tmp = TempDir::new().unwrap();
        let (tool, _log) = fake_tool(&tmp, "exit 0");
        let src = tmp.path().join("src");
        touch(&src.join("talk.mp4"));

        let config = JobConfig::new(&src, tmp.path().join("dst")).with_tool(&tool);
        let err = convert_file(
            JobKind::ExtractAudio,
            &src.join("talk.mp4"),
            &tmp.path().join("dst/talk.m4a"),
            None,
            &config,
            &Reporter::new(SharedBuffer::default()),
        )
        .unwrap_err();
        assert!(matches!(err, Error::IncompleteOutput { .. }), "unexpected error: {err}");

        let summary =
            run_batch(JobKind::ExtractAudio, &config, &Reporter::new(SharedBuffer::default()))
                .unwrap();
        assert_eq!(summary.failed, 1);
    }

    #[test]
    fn single_file_wrong_extension_never_invokes_tool() {
        let tmp = TempDir::new().unwrap();
        let (tool, log) = fake_tool(&tmp, "printf x > \"$last\"");
        let wav = tmp.path().join("song.wav");
        touch(&wav);

        let config = JobConfig::new(tmp.path(), tmp.path()).with_tool(&tool);
        let reporter = Reporter::new(SharedBuffer::default());
        let err = convert_file(JobKind::Mp3ToFlac, &wav, &tmp.path().join("out/song.flac"), None, &config, &reporter)
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert_eq!(calls(&log), 0);
        assert!(!tmp.path().join("out").exists());
    }

    #[test]
    fn single_file_propagates_tool_failure() {
        let tmp = TempDir::new().unwrap();
        let (tool, _log) = fake_tool(&tmp, "echo 'Unknown encoder' >&2; exit 1");
        let mp3 = tmp.path().join("song.mp3");
        touch(&mp3);

        let config = JobConfig::new(tmp.path(), tmp.path()).with_tool(&tool);
        let reporter = Reporter::new(SharedBuffer::default());
        let err = convert_file(JobKind::Mp3ToFlac, &mp3, &tmp.path().join("song.flac"), None, &config, &reporter)
            .unwrap_err();
        match err {
            Error::ToolInvocation { inputs, diagnostic, .. } => {
                assert_eq!(inputs, vec![mp3]);
                assert_eq!(diagnostic, "Unknown encoder");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn merge_skips_unpaired_and_deletes_originals() {
        let tmp = TempDir::new().unwrap();
        let (tool, log) = fake_tool(&tmp, "printf x > \"$last\"");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        touch(&src.join("a.mp4"));
        touch(&src.join("a.m4a"));
        touch(&src.join("lonely.mp4"));

        let buf = SharedBuffer::default();
        let config = JobConfig::new(&src, &dst)
            .with_tool(&tool)
            .with_delete_originals(true);
        let summary = run_batch(JobKind::Merge, &config, &Reporter::new(buf.clone())).unwrap();

        assert_eq!(summary.converted, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.deleted, 2);
        assert_eq!(calls(&log), 1);
        assert!(dst.join("a.mp4").is_file());
        assert!(!src.join("a.mp4").exists());
        assert!(!src.join("a.m4a").exists());
        assert!(src.join("lonely.mp4").exists());
        assert!(buf.contents().contains("lonely.m4a not found"));
    }

    #[test]
    fn merge_failure_keeps_originals() {
        let tmp = TempDir::new().unwrap();
        let (tool, _log) = fake_tool(&tmp, "exit 1");
        let src = tmp.path().join("src");
        touch(&src.join("a.mp4"));
        touch(&src.join("a.m4a"));

        let config = JobConfig::new(&src, tmp.path().join("dst"))
            .with_tool(&tool)
            .with_delete_originals(true);
        let summary =
            run_batch(JobKind::Merge, &config, &Reporter::new(SharedBuffer::default())).unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.deleted, 0);
        assert!(src.join("a.mp4").exists());
        assert!(src.join("a.m4a").exists());
    }

    #[test]
    fn deleting_missing_original_is_a_warning() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        touch(&src.join("a.mp4"));
        // The tool consumes the audio input itself.
        let (tool, _log) = fake_tool(&tmp, "rm -f \"$5\"\nprintf x > \"$last\"");
        touch(&src.join("a.m4a"));

        let config = JobConfig::new(&src, tmp.path().join("dst"))
            .with_tool(&tool)
            .with_delete_originals(true);
        let summary =
            run_batch(JobKind::Merge, &config, &Reporter::new(SharedBuffer::default())).unwrap();

        assert_eq!(summary.converted, 1);
        assert_eq!(summary.deleted, 1);
        assert_eq!(summary.warnings, 1);
        assert!(!src.join("a.mp4").exists());
    }

    #[test]
    fn parallel_workers_convert_everything_once() {
        let tmp = TempDir::new().unwrap();
        let (tool, log) = fake_tool(&tmp, "printf x > \"$last\"");
        let src = tmp.path().join("src");
        for i in 0..8 {
            touch(&src.join(format!("disc{}/{:02}.m4a", i % 2, i)));
        }

        let config = JobConfig::new(&src, tmp.path().join("dst"))
            .with_tool(&tool)
            .with_jobs(4);
        let summary =
            run_batch(JobKind::M4aToFlac, &config, &Reporter::new(SharedBuffer::default())).unwrap();

        assert_eq!(summary.converted, 8);
        assert_eq!(calls(&log), 8);
    }

    // Needs a case-sensitive filesystem.
    #[cfg(target_os = "linux")]
    #[test]
    fn colliding_destinations_convert_once() {
        let tmp = TempDir::new().unwrap();
        let (tool, log) = fake_tool(&tmp, "printf x > \"$last\"");
        let src = tmp.path().join("src");
        touch(&src.join("song.mp3"));
        touch(&src.join("song.MP3"));

        let config = JobConfig::new(&src, tmp.path().join("dst")).with_tool(&tool);
        let summary =
            run_batch(JobKind::Mp3ToFlac, &config, &Reporter::new(SharedBuffer::default())).unwrap();

        assert_eq!(summary.converted, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(calls(&log), 1);
    }

    #[test]
    fn shallow_override_ignores_nested_inputs() {
        let tmp = TempDir::new().unwrap();
        let (tool, log) = fake_tool(&tmp, "printf x > \"$last\"");
        let src = tmp.path().join("src");
        touch(&src.join("top.wav"));
        touch(&src.join("nested/deep.wav"));

        let config = JobConfig::new(&src, tmp.path().join("dst"))
            .with_tool(&tool)
            .with_scan_mode(ScanMode::Shallow);
        let summary =
            run_batch(JobKind::WavToFlac, &config, &Reporter::new(SharedBuffer::default())).unwrap();

        assert_eq!(summary.discovered, 1);
        assert_eq!(calls(&log), 1);
        assert!(tmp.path().join("dst/top.flac").is_file());
    }

    #[test]
    fn single_file_merge_deletes_originals() {
        let tmp = TempDir::new().unwrap();
        let (tool, log) = fake_tool(&tmp, "printf x > \"$last\"");
        let video = tmp.path().join("talk.mp4");
        let audio = tmp.path().join("talk.m4a");
        touch(&video);
        touch(&audio);

        let buf = SharedBuffer::default();
        let config = JobConfig::new(tmp.path(), tmp.path())
            .with_tool(&tool)
            .with_delete_originals(true);
        let report = convert_file(
            JobKind::Merge,
            &video,
            &tmp.path().join("out/talk.mp4"),
            None,
            &config,
            &Reporter::new(buf.clone()),
        )
        .unwrap();

        assert_eq!(report.state, TaskState::Done);
        assert_eq!(report.deleted, 2);
        assert_eq!(calls(&log), 1);
        assert!(!video.exists());
        assert!(!audio.exists());
        assert!(tmp.path().join("out/talk.mp4").is_file());
        assert!(buf.contents().contains("[delete]"));
    }

    #[test]
    fn single_file_merge_failure_keeps_originals() {
        let tmp = TempDir::new().unwrap();
        let (tool, _log) = fake_tool(&tmp, "echo 'Could not find tag' >&2; exit 1");
        let video = tmp.path().join("talk.mp4");
        let audio = tmp.path().join("talk.m4a");
        touch(&video);
        touch(&audio);

        let config = JobConfig::new(tmp.path(), tmp.path())
            .with_tool(&tool)
            .with_delete_originals(true);
        let err = convert_file(
            JobKind::Merge,
            &video,
            &tmp.path().join("out/talk.mp4"),
            None,
            &config,
            &Reporter::new(SharedBuffer::default()),
        )
        .unwrap_err();

        assert!(matches!(err, Error::ToolInvocation { .. }), "unexpected error: {err}");
        assert!(video.exists());
        assert!(audio.exists());
    }

    #[test]
    fn timed_out_file_fails_and_batch_continues() {
        let tmp = TempDir::new().unwrap();
        let (tool, log) = fake_tool(
            &tmp,
            "case \"$3\" in *slow*) exec sleep 10;; esac\nprintf x > \"$last\"",
        );
        let src = tmp.path().join("src");
        touch(&src.join("fast.m4a"));
        touch(&src.join("slow.m4a"));

        let buf = SharedBuffer::default();
        let config = JobConfig::new(&src, tmp.path().join("dst"))
            .with_tool(&tool)
            .with_timeout(Some(std::time::Duration::from_millis(300)));
        let started = std::time::Instant::now();
        let summary = run_batch(JobKind::M4aToFlac, &config, &Reporter::new(buf.clone())).unwrap();

        assert!(started.elapsed() < std::time::Duration::from_secs(5));
        assert_eq!(summary.converted, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(calls(&log), 2);
        assert!(tmp.path().join("dst/fast.flac").is_file());
        assert!(!tmp.path().join("dst/slow.flac").exists());
        let out = buf.contents();
        assert!(out.contains("timed out"), "{out}");
        assert!(out.ends_with("done.\n"), "{out}");
    }
}
