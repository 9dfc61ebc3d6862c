//! Builder for running the external tool as a blocking child process.

use crate::tools::tool_name;
use crate::{Error, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long stderr may stay open after the tool exits, e.g. held by a
/// background grandchild.
const STDERR_GRACE: Duration = Duration::from_millis(500);

/// Output captured from a successful tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

/// A builder for one external tool invocation.
///
/// Standard output is discarded and standard error is captured for
/// diagnostics. Inputs added through [`ToolCommand::input`] are remembered
/// so failures can name them.
///
/// # Example
///
/// ```no_run
/// use mediabatch::command::ToolCommand;
/// use std::path::{Path, PathBuf};
///
/// let output = ToolCommand::new(PathBuf::from("ffmpeg"))
///     .arg("-y")
///     .input(Path::new("in.wav"))
///     .args(["-c:a", "flac"])
///     .arg("out.flac")
///     .execute()?;
/// assert!(output.status.success());
/// # Ok::<(), mediabatch::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<OsString>,
    inputs: Vec<PathBuf>,
    timeout: Option<Duration>,
}

impl ToolCommand {
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            inputs: Vec::new(),
            timeout: None,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<OsString>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<OsString>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Append `-i <path>` and record `path` as an input.
    pub fn input(&mut self, path: &Path) -> &mut Self {
        self.args.push("-i".into());
        self.args.push(path.as_os_str().to_os_string());
        self.inputs.push(path.to_path_buf());
        self
    }

    /// Bound the execution time. Without one the call waits indefinitely.
    pub fn timeout(&mut self, limit: Option<Duration>) -> &mut Self {
        self.timeout = limit;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// The argument vector after the program name.
    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    pub fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    /// Run the command to completion.
    ///
    /// # Errors
    ///
    /// - [`Error::ToolNotFound`] if the program cannot be spawned because it
    ///   does not exist.
    /// - [`Error::ToolInvocation`] on a nonzero exit status, carrying the
    ///   captured standard error.
    /// - [`Error::TimedOut`] if the timeout expires; the child is killed.
    pub fn execute(&self) -> Result<ToolOutput> {
        let tool = tool_name(&self.program);
        tracing::debug!("running {} {:?}", self.program.display(), self.args);

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::tool_not_found(tool.clone())
                } else {
                    Error::Io(e)
                }
            })?;

        // Drain stderr off-thread so a chatty tool never blocks on a full pipe.
        // Chunks arrive as they are read so a pipe that never closes still
        // yields what was written before the tool exited.
        let (tx, rx) = crossbeam_channel::unbounded::<Vec<u8>>();
        let stderr = child.stderr.take();
        thread::spawn(move || {
            let Some(mut stream) = stderr else { return };
            let mut buf = [0u8; 8192];
            loop {
                match stream.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let status = match self.timeout {
            None => child.wait()?,
            Some(limit) => match wait_until(&mut child, Instant::now() + limit)? {
                Some(status) => status,
                None => {
                    let _ = child.kill();
                    let _ = child.wait();
                    tracing::warn!("{} killed after {:?}", tool, limit);
                    return Err(Error::TimedOut {
                        tool,
                        inputs: self.inputs.clone(),
                        timeout: limit,
                    });
                }
            },
        };

        let stderr = collect_stderr(&rx, &tool);

        if !status.success() {
            let trimmed = stderr.trim();
            let diagnostic = if trimmed.is_empty() {
                status.to_string()
            } else {
                trimmed.to_string()
            };
            return Err(Error::ToolInvocation {
                tool,
                inputs: self.inputs.clone(),
                diagnostic,
            });
        }

        Ok(ToolOutput { status, stderr })
    }
}

/// Gather stderr chunks until the drain thread hangs up or the grace period runs out.
fn collect_stderr(rx: &Receiver<Vec<u8>>, tool: &str) -> String {
    let mut bytes = Vec::new();
    loop {
        match rx.recv_timeout(STDERR_GRACE) {
            Ok(chunk) => bytes.extend_from_slice(&chunk),
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                tracing::debug!("{} exited but stderr is still open", tool);
                break;
            }
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Poll `child` until it exits or `deadline` passes. `None` means the deadline won.
fn wait_until(child: &mut Child, deadline: Instant) -> Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}
