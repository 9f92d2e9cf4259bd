// Console presenter - renders pipeline log entries to a terminal
//
// The pipeline runs on a tokio worker and sends StepResult entries over an
// unbounded channel. The presenter is the channel's only consumer and runs on
// the main thread, blocking on the receiver until the pipeline drops its sender.

use crate::models::{LogLevel, StepResult};
use std::io::{self, Write};
use tokio::sync::mpsc::UnboundedReceiver;

/// Totals collected while draining the event channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PresenterSummary {
    pub entries: usize,
    pub warnings: usize,
    pub errors: usize,
    /// Progress carried by the last entry seen
    pub last_progress: u8,
}

/// Writes one line per [`StepResult`]:
///
/// ```text
/// [14:03:12] [SUCCESS] [ 20%] Extracted 12 files into ...
/// ```
pub struct ConsolePresenter<W: Write> {
    out: W,
    color: bool,
    summary: PresenterSummary,
}

impl ConsolePresenter<io::Stdout> {
    /// Presenter on stdout; `color` adds ANSI colors to the level tag
    pub fn stdout(color: bool) -> Self {
        Self::new(io::stdout(), color)
    }
}

impl<W: Write> ConsolePresenter<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self {
            out,
            color,
            summary: PresenterSummary::default(),
        }
    }

    /// Format an entry without writing it
    pub fn render(&self, entry: &StepResult) -> String {
        let level = format!("[{}]", entry.status.as_str());
        let level = if self.color {
            format!("{}{}\x1b[0m", ansi_color(entry.status), level)
        } else {
            level
        };

        format!(
            "[{}] {} [{:>3}%] {}",
            entry.timestamp.format("%H:%M:%S"),
            level,
            entry.progress_percent,
            entry.message
        )
    }

    /// Write one entry and update the running totals
    pub fn present(&mut self, entry: &StepResult) -> io::Result<()> {
        let line = self.render(entry);
        writeln!(self.out, "{}", line)?;
        self.out.flush()?;

        self.summary.entries += 1;
        self.summary.last_progress = entry.progress_percent;
        match entry.status {
            LogLevel::Warning => self.summary.warnings += 1,
            LogLevel::Error => self.summary.errors += 1,
            LogLevel::Info | LogLevel::Success => {}
        }

        Ok(())
    }

    /// Block on `events` until every sender is dropped, presenting each entry.
    ///
    /// Must not be called from inside the tokio runtime.
    pub fn drain(mut self, mut events: UnboundedReceiver<StepResult>) -> io::Result<PresenterSummary> {
        while let Some(entry) = events.blocking_recv() {
            self.present(&entry)?;
        }

        tracing::debug!(
            "Event channel closed after {} entries",
            self.summary.entries
        );
        Ok(self.summary)
    }

    pub fn summary(&self) -> PresenterSummary {
        self.summary
    }
}

fn ansi_color(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Info => "\x1b[36m",
        LogLevel::Success => "\x1b[32m",
        LogLevel::Warning => "\x1b[33m",
        LogLevel::Error => "\x1b[31m",
    }
}
