use crate::services::command_line;
use crate::services::error::StepError;
use camino::Utf8Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// How long SteamCMD may run before the pipeline stops waiting
pub const DEFAULT_UPDATE_TIMEOUT: Duration = Duration::from_secs(300);

/// Captured stdout lines kept for the log
pub const STDOUT_LINE_LIMIT: usize = 50;

/// Captured stderr lines kept for the log
pub const STDERR_LINE_LIMIT: usize = 20;

/// The first `limit` lines of a captured stream plus how many were dropped
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TruncatedOutput {
    pub lines: Vec<String>,
    pub omitted: usize,
}

impl TruncatedOutput {
    pub fn from_text(text: &str, limit: usize) -> Self {
        let mut out = Self::default();
        for line in text.lines() {
            out.push_line(line, limit);
        }
        out
    }

    /// Keep `line` if there is room under `limit`, otherwise count it as omitted.
    /// Blank lines are ignored.
    pub fn push_line(&mut self, line: &str, limit: usize) {
        let line = line.trim_end();
        if line.is_empty() {
            return;
        }
        if self.lines.len() < limit {
            self.lines.push(line.to_string());
        } else {
            self.omitted += 1;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty() && self.omitted == 0
    }

    pub fn omitted_note(&self) -> Option<String> {
        (self.omitted > 0).then(|| format!("... {} more lines omitted", self.omitted))
    }
}

/// How the external tool finished.
///
/// Neither `NonZeroExit` nor `TimedOut` is fatal: SteamCMD is known to report
/// non-zero codes after a successful update, and after a timeout it keeps
/// running in the background.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Completed,
    NonZeroExit(i32),
    TimedOut(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    pub outcome: UpdateOutcome,
    pub command_line: String,
    pub stdout: TruncatedOutput,
    pub stderr: TruncatedOutput,
    pub duration: Duration,
}

/// Run `executable` with `args`, waiting at most `timeout_duration`.
///
/// The tool runs in its own directory so it finds its package files.
///
/// # Errors
/// `NotFound` if the executable is missing, `UpdateFailed` if it can't be
/// started or waited on. Exit codes and timeouts are reported in the
/// [`UpdateReport`], not as errors.
pub async fn run(
    executable: &Utf8Path,
    args: &[String],
    timeout_duration: Duration,
) -> Result<UpdateReport, StepError> {
    if !executable.is_file() {
        return Err(StepError::NotFound {
            what: "Updater executable",
            path: executable.to_path_buf(),
        });
    }

    let command_line = command_line(executable.as_str(), args);
    tracing::info!("Executing: {}", command_line);

    let mut cmd = Command::new(executable.as_std_path());
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = executable.parent().filter(|d| !d.as_str().is_empty()) {
        cmd.current_dir(dir);
    }

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(|source| StepError::UpdateFailed {
        path: executable.to_path_buf(),
        source,
    })?;

    let stdout = child
        .stdout
        .take()
        .map(|stream| CapturedStream::spawn(stream, STDOUT_LINE_LIMIT));
    let stderr = child
        .stderr
        .take()
        .map(|stream| CapturedStream::spawn(stream, STDERR_LINE_LIMIT));

    let status = match timeout(timeout_duration, child.wait()).await {
        Ok(result) => result.map_err(|source| StepError::UpdateFailed {
            path: executable.to_path_buf(),
            source,
        })?,
        Err(_) => {
            tracing::warn!("Updater timed out after {:?}", timeout_duration);
            let report = UpdateReport {
                outcome: UpdateOutcome::TimedOut(timeout_duration),
                command_line,
                stdout: CapturedStream::snapshot(stdout.as_ref()),
                stderr: CapturedStream::snapshot(stderr.as_ref()),
                duration: start.elapsed(),
            };

            // The readers stay attached so the tool never writes into a closed pipe
            tokio::spawn(async move {
                match child.wait().await {
                    Ok(status) => tracing::info!("Background updater exited with {}", status),
                    Err(e) => tracing::warn!("Failed to wait on background updater: {}", e),
                }
                for stream in [stdout, stderr].into_iter().flatten() {
                    stream.finish().await;
                }
            });

            return Ok(report);
        }
    };

    let duration = start.elapsed();
    let exit_code = status.code().unwrap_or(-1);
    let outcome = if status.success() {
        UpdateOutcome::Completed
    } else {
        UpdateOutcome::NonZeroExit(exit_code)
    };

    tracing::info!(
        "Updater completed in {:.2}s with exit code {}",
        duration.as_secs_f32(),
        exit_code
    );

    let stdout = match stdout {
        Some(stream) => stream.finish().await,
        None => TruncatedOutput::default(),
    };
    let stderr = match stderr {
        Some(stream) => stream.finish().await,
        None => TruncatedOutput::default(),
    };

    Ok(UpdateReport {
        outcome,
        command_line,
        stdout,
        stderr,
        duration,
    })
}

/// A child output stream read line by line on its own task
struct CapturedStream {
    collected: Arc<Mutex<TruncatedOutput>>,
    reader: JoinHandle<()>,
}

impl CapturedStream {
    fn spawn<R>(stream: R, limit: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let collected = Arc::new(Mutex::new(TruncatedOutput::default()));
        let sink = Arc::clone(&collected);

        let reader = tokio::spawn(async move {
            let mut segments = BufReader::new(stream).split(b'\n');
            loop {
                match segments.next_segment().await {
                    Ok(Some(bytes)) => {
                        sink.lock()
                            .unwrap()
                            .push_line(&String::from_utf8_lossy(&bytes), limit);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::debug!("Stopped reading updater output: {}", e);
                        break;
                    }
                }
            }
        });

        Self { collected, reader }
    }

    /// Lines read so far.
    fn snapshot(stream: Option<&Self>) -> TruncatedOutput {
        stream
            .map(|s| s.collected.lock().unwrap().clone())
            .unwrap_or_default()
    }

    /// Wait for the stream to close and return everything read.
    async fn finish(self) -> TruncatedOutput {
        if let Err(e) = self.reader.await {
            tracing::warn!("Updater output reader failed: {}", e);
        }
        self.collected.lock().unwrap().clone()
    }
}
