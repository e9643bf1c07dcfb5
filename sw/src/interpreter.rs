//! Progress-report interpreter
//!
//! Reads the worker's status stream line by line, echoes every line, and keeps
//! just enough state to judge the unit of work currently running. A status
//! block from the worker looks like:
//!
//! ```text
//! Status...........: Running
//! Time.Started.....: Tue Mar  5 10:00:00 2024 (2 mins, 7 secs)
//! Time.Estimated...: Tue Mar  5 11:30:00 2024 (1 hour, 27 mins)
//! Recovered........: 3/5000 (0.06%) Digests, 3/5000 (0.06%) Salts
//! ```
//!
//! `Status` always precedes `Recovered.` within a block.

use std::borrow::Cow;
use std::io;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};

use crate::attachment::Stopper;
use crate::duration;
use crate::policy::{BypassDecision, BypassPolicy};

/// Status markers that end a unit of work
const FINISHED_MARKERS: [&str; 2] = [": Exhausted", ": Bypass"];

/// Longest line interpreted as a status record. Longer lines are echoed raw.
pub const MAX_LINE_LEN: usize = 64 * 1024;

static RECOVERED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r", (\d+)/\d+").expect("recovered pattern is valid"));

/// Errors that stop interpretation of the status stream
#[derive(Debug, Error)]
pub enum InterpreterError {
    #[error("No recovered count in status line: {line:?}")]
    MissingRecoveredCount { line: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Recognised status records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Status,
    TimeStarted,
    TimeEstimated,
    Recovered,
    Other,
}

/// Line prefix to record kind. First match wins.
const PREFIXES: &[(&str, LineKind)] = &[
    ("Status", LineKind::Status),
    ("Time.Started", LineKind::TimeStarted),
    ("Time.Estimated", LineKind::TimeEstimated),
    ("Recovered.", LineKind::Recovered),
];

impl LineKind {
    pub fn classify(line: &str) -> Self {
        PREFIXES
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix))
            .map(|(_, kind)| *kind)
            .unwrap_or(LineKind::Other)
    }
}

/// Recovered-so-far count from a `Recovered.` line, e.g. `..., 42/100 ...` -> 42
pub fn parse_recovered(line: &str) -> Option<i64> {
    let caps = RECOVERED.captures(line)?;
    // An overflowing count degrades to zero like any other numeric field.
    Some(caps[1].parse().unwrap_or(0))
}

/// Rolling view of the unit of work in progress
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressState {
    /// Elapsed time of the current unit, zero when unknown
    pub time_started: Duration,
    /// Worker's estimate of the remaining time
    pub time_estimated: Duration,
    /// Recovered count at the last unit boundary
    pub recovered_before: i64,
    /// The last `Status` line reported the unit as finished
    pub just_finished: bool,
}

impl ProgressState {
    /// Average recovered per minute since the last unit boundary
    pub fn average(&self, recovered: i64) -> Option<f64> {
        if self.time_started.is_zero() {
            return None;
        }
        let gained = recovered.saturating_sub(self.recovered_before) as f64;
        Some(gained * 60.0 / self.time_started.as_secs_f64())
    }
}

/// What happened during one run over the status stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub lines: u64,
    pub bypasses: u32,
}

/// Line-oriented state machine over the worker's stdout
pub struct Interpreter<S> {
    policy: BypassPolicy,
    stopper: S,
    state: ProgressState,
    summary: RunSummary,
}

impl<S: Stopper> Interpreter<S> {
    pub fn new(policy: BypassPolicy, stopper: S) -> Self {
        debug!(?policy, action = ?stopper.action(), "Interpreter::new: called");
        Self {
            policy,
            stopper,
            state: ProgressState::default(),
            summary: RunSummary::default(),
        }
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    pub fn summary(&self) -> RunSummary {
        self.summary
    }

    /// Interpret one line and return the text to echo for it
    pub fn interpret(&mut self, line: &str) -> Result<String, InterpreterError> {
        self.summary.lines += 1;
        match LineKind::classify(line) {
            LineKind::Status => {
                self.state.just_finished = FINISHED_MARKERS.iter().any(|m| line.contains(m));
                debug!(just_finished = self.state.just_finished, "Interpreter::interpret: status");
            }
            LineKind::TimeStarted => {
                self.state.time_started = duration::parse(line);
            }
            LineKind::TimeEstimated => {
                self.state.time_estimated = duration::parse(line);
            }
            LineKind::Recovered => return self.on_recovered(line),
            LineKind::Other => {}
        }
        Ok(line.to_string())
    }

    fn on_recovered(&mut self, line: &str) -> Result<String, InterpreterError> {
        let recovered = parse_recovered(line).ok_or_else(|| InterpreterError::MissingRecoveredCount {
            line: line.to_string(),
        })?;

        let mut echo = line.to_string();
        let avg = self.state.average(recovered);
        if let Some(avg) = avg {
            echo.push_str(&format!(" avg/min:{avg:.2}"));
        }

        if self.state.just_finished {
            debug!(recovered, "Interpreter::on_recovered: unit finished, re-baselining");
            self.state.recovered_before = recovered;
            return Ok(echo);
        }

        let decision = self
            .policy
            .evaluate(self.state.time_started, self.state.time_estimated, avg);
        if decision == BypassDecision::Bypass {
            info!(
                recovered,
                recovered_before = self.state.recovered_before,
                avg = avg.unwrap_or_default(),
                started = ?self.state.time_started,
                "Unit below minimum rate, bypassing"
            );
            if let Err(e) = self.stopper.stop() {
                warn!(error = %e, action = ?self.stopper.action(), "Failed to inject stop action");
            }
            self.summary.bypasses += 1;
            self.state.time_started = Duration::ZERO;
            self.state.time_estimated = Duration::ZERO;
        }
        Ok(echo)
    }

    /// Interpret `reader` until it ends, echoing every line to `out`.
    ///
    /// A protocol violation stops interpretation but not the echo: the rest of
    /// the stream is passed through and the violation is returned at the end.
    /// Lines longer than [`MAX_LINE_LEN`] are never buffered whole; they are
    /// copied through byte for byte without being interpreted.
    pub async fn run<R, W>(mut self, mut reader: R, mut out: W) -> Result<RunSummary, InterpreterError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        debug!("Interpreter::run: called");
        let mut buf = Vec::new();
        let mut violation = None;
        let mut overlong = false;

        loop {
            buf.clear();
            let read = (&mut reader)
                .take(MAX_LINE_LEN as u64)
                .read_until(b'\n', &mut buf)
                .await?;
            if read == 0 {
                break;
            }

            let complete = buf.ends_with(b"\n");
            if overlong || (!complete && read == MAX_LINE_LEN) {
                if !overlong {
                    warn!(limit = MAX_LINE_LEN, "Worker line too long, passing it through uninterpreted");
                }
                overlong = !complete;
                out.write_all(&buf).await?;
                out.flush().await?;
                continue;
            }

            let line = decode_line(&buf);

            let echo = if violation.is_some() {
                line.into_owned()
            } else {
                match self.interpret(&line) {
                    Ok(echo) => echo,
                    Err(e) => {
                        error!(error = %e, "Worker status protocol violated, interpretation halted");
                        violation = Some(e);
                        line.into_owned()
                    }
                }
            };

            out.write_all(echo.as_bytes()).await?;
            out.write_all(b"\n").await?;
            out.flush().await?;
        }

        debug!(summary = ?self.summary, "Interpreter::run: stream ended");
        match violation {
            Some(e) => Err(e),
            None => Ok(self.summary),
        }
    }
}

/// Lossy UTF-8 line with the trailing `\n` or `\r\n` removed
fn decode_line(buf: &[u8]) -> Cow<'_, str> {
    let buf = buf.strip_suffix(b"\n").unwrap_or(buf);
    let buf = buf.strip_suffix(b"\r").unwrap_or(buf);
    String::from_utf8_lossy(buf)
}
