//! Per-file status lines and the batch summary.

use crate::job::{FileTask, JobKind};
use crate::Error;
use serde::Serialize;
use std::fmt;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

/// Terminal state of one file task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Skipped,
    Done,
    Failed,
}

/// What happened to one discovered input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub state: TaskState,
    pub warnings: usize,
    pub deleted: usize,
}

impl TaskReport {
    pub fn new(state: TaskState) -> Self {
        Self {
            state,
            warnings: 0,
            deleted: 0,
        }
    }
}

/// Counts for a whole directory run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub kind: String,
    pub discovered: usize,
    pub converted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub warnings: usize,
    pub deleted: usize,
}

impl BatchSummary {
    pub fn new(kind: JobKind) -> Self {
        Self {
            kind: kind.name().to_string(),
            ..Self::default()
        }
    }

    pub fn record(&mut self, report: &TaskReport) {
        match report.state {
            TaskState::Skipped => self.skipped += 1,
            TaskState::Done => self.converted += 1,
            TaskState::Failed => self.failed += 1,
        }
        self.warnings += report.warnings;
        self.deleted += report.deleted;
    }

    /// Single-line JSON rendering for `--json`.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Writes status lines, one at a time, to stdout or any other sink.
pub struct Reporter {
    out: Mutex<Box<dyn Write + Send>>,
}

impl Reporter {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn no_files(&self, extension: &str) {
        self.line(format_args!("no {} files found.", extension));
    }

    pub fn found(&self, count: usize, extension: &str) {
        self.line(format_args!(
            "found {} {} files, start converting...",
            count, extension
        ));
    }

    pub fn converted(&self, task: &FileTask) {
        let inputs = task
            .inputs()
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(" + ");
        self.line(format_args!(
            "[convert] {} -> {}",
            inputs,
            task.destination.display()
        ));
    }

    pub fn skipped(&self, destination: &Path) {
        self.line(format_args!("[skip] {}", destination.display()));
    }

    pub fn failed(&self, source: &Path, error: &Error) {
        self.line(format_args!("[fail] {}: {}", source.display(), error));
    }

    pub fn warning(&self, message: impl fmt::Display) {
        self.line(format_args!("[warn] {}", message));
    }

    pub fn deleted(&self, path: &Path) {
        self.line(format_args!("[delete] {}", path.display()));
    }

    pub fn done(&self) {
        self.line(format_args!("done."));
    }

    pub fn summary(&self, summary: &BatchSummary) {
        match summary.to_json() {
            Ok(json) => self.line(format_args!("{}", json)),
            Err(e) => tracing::warn!("could not serialise summary: {}", e),
        }
    }

    fn line(&self, args: fmt::Arguments<'_>) {
        let mut out = match self.out.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(out, "{}", args).and_then(|_| out.flush()) {
            tracing::debug!("status line dropped: {}", e);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Cloneable in-memory sink for asserting on status lines.
    #[derive(Clone, Default)]
    pub(crate) struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        pub(crate) fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn status_lines() {
        let buf = SharedBuffer::default();
        let reporter = Reporter::new(buf.clone());
        let task = FileTask::new("in/a.mp4", "out/a.mp4").with_paired("in/a.m4a");

        reporter.found(2, "mp4");
        reporter.converted(&task);
        reporter.skipped(Path::new("out/b.mp4"));
        reporter.warning("in/c.m4a not found");
        reporter.done();

        assert_eq!(
            buf.contents(),
            "found 2 mp4 files, start converting...\n\
             [convert] in/a.mp4 + in/a.m4a -> out/a.mp4\n\
             [skip] out/b.mp4\n\
             [warn] in/c.m4a not found\n\
             done.\n"
        );
    }

    #[test]
    fn summary_counts_and_json() {
        let mut summary = BatchSummary::new(JobKind::Merge);
        summary.discovered = 3;
        summary.record(&TaskReport::new(TaskState::Done));
        summary.record(&TaskReport {
            state: TaskState::Done,
            warnings: 1,
            deleted: 1,
        });
        summary.record(&TaskReport::new(TaskState::Failed));

        assert_eq!(summary.converted, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.warnings, 1);
        assert_eq!(summary.deleted, 1);

        let json: serde_json::Value = serde_json::from_str(&summary.to_json().unwrap()).unwrap();
        assert_eq!(json["kind"], "merge");
        assert_eq!(json["converted"], 2);
        assert_eq!(json["skipped"], 0);
    }
}
