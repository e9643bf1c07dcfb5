//! Process supervisor
//!
//! Starts the worker through an [`Attachment`], runs the [`Interpreter`] over
//! its stdout and waits for it to exit. A failed run is reported, never retried.

use std::time::Duration;

use tokio::io::{AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

use crate::attachment::Attachment;
use crate::config::Settings;
use crate::error::SupervisorError;
use crate::interpreter::{Interpreter, RunSummary};
use crate::policy::BypassPolicy;
use crate::signals::ChildSlot;

/// Default seconds between worker status reports
pub const DEFAULT_STATUS_TIMER: u32 = 15;

/// How long remaining output may take to drain once the worker has exited
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Worker argv with periodic status reports switched on.
///
/// `--status-timer=<secs>` and `--status` are inserted right after the
/// program name unless the worker arguments already ask for them.
pub fn worker_args(args: &[String], status_timer: u32) -> Vec<String> {
    let mut args = args.to_vec();
    if args.is_empty() {
        return args;
    }
    if !args.iter().any(|a| a.starts_with("--status-timer")) {
        args.insert(1, format!("--status-timer={status_timer}"));
    }
    if !args.iter().any(|a| a == "--status") {
        args.insert(1, "--status".to_string());
    }
    args
}

/// Runs one worker to completion
#[derive(Debug, Clone)]
pub struct Supervisor {
    settings: Settings,
    slot: ChildSlot,
}

impl Supervisor {
    pub fn new(settings: Settings, slot: ChildSlot) -> Self {
        debug!(?settings, "Supervisor::new: called");
        Self { settings, slot }
    }

    /// Supervise `worker`, echoing its output to our stdout
    pub async fn run(
        &self,
        worker: &[String],
        attachment: Box<dyn Attachment>,
    ) -> Result<Option<RunSummary>, SupervisorError> {
        self.run_with_output(worker, attachment, tokio::io::stdout()).await
    }

    /// Supervise `worker`, echoing its output to `out`.
    ///
    /// Returns the interpreter's summary, or `None` when interpretation failed
    /// or did not finish draining after the worker exited.
    pub async fn run_with_output<W>(
        &self,
        worker: &[String],
        mut attachment: Box<dyn Attachment>,
        out: W,
    ) -> Result<Option<RunSummary>, SupervisorError>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let args = worker_args(worker, self.settings.status_timer);
        let (program, rest) = args.split_first().ok_or(SupervisorError::EmptyCommand)?;
        let mut cmd = Command::new(program);
        cmd.args(rest);
        info!(attachment = %attachment.kind(), ?args, "Starting worker");

        let mut child = attachment.spawn(cmd, &self.slot).map_err(SupervisorError::Start)?;

        let Some(output) = child.stdout.take() else {
            self.abandon(&mut child).await;
            return Err(SupervisorError::NoOutput);
        };
        let stopper = match attachment.relay_input().and_then(|_| attachment.stopper()) {
            Ok(stopper) => stopper,
            Err(e) => {
                self.abandon(&mut child).await;
                return Err(SupervisorError::Start(e));
            }
        };

        let policy = BypassPolicy::new(self.settings.thresholds, attachment.watches_estimated());
        let interpreter = Interpreter::new(policy, stopper);
        let mut interpreting = tokio::spawn(interpreter.run(BufReader::new(output), out));

        let status = child.wait().await;
        self.slot.clear();
        let status = status.map_err(SupervisorError::Wait)?;
        debug!(?status, "Supervisor::run: worker exited");

        let summary = match tokio::time::timeout(DRAIN_TIMEOUT, &mut interpreting).await {
            Ok(Ok(Ok(summary))) => {
                info!(lines = summary.lines, bypasses = summary.bypasses, "Worker output finished");
                Some(summary)
            }
            Ok(Ok(Err(e))) => {
                error!(error = %e, "Interpreter stopped");
                None
            }
            Ok(Err(e)) => {
                error!(error = %e, "Interpreter task failed");
                None
            }
            Err(_) => {
                warn!("Worker output still open after exit, abandoning interpreter");
                interpreting.abort();
                None
            }
        };

        if !status.success() {
            return Err(SupervisorError::Exit(status));
        }
        Ok(summary)
    }

    /// Kill and reap a worker that could not be wired up
    async fn abandon(&self, child: &mut Child) {
        warn!(pid = ?child.id(), "Abandoning worker");
        if let Err(e) = child.kill().await {
            debug!(error = %e, "Supervisor::abandon: kill failed");
        }
        self.slot.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::PipeAttachment;
    use crate::error::Phase;
    use crate::policy::Thresholds;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn supervisor() -> Supervisor {
        let settings = Settings {
            thresholds: Thresholds::default(),
            status_timer: DEFAULT_STATUS_TIMER,
            bypass_key: b'b',
        };
        Supervisor::new(settings, ChildSlot::new())
    }

    /// `sh -c script` with the status flags already present, so nothing is injected
    fn script(body: &str) -> Vec<String> {
        args(&["sh", "-c", body, "--status", "--status-timer=1"])
    }

    #[test]
    fn test_status_flags_injected() {
        assert_eq!(
            worker_args(&args(&["hashcat", "-m", "0", "h.txt"]), 15),
            args(&["hashcat", "--status", "--status-timer=15", "-m", "0", "h.txt"])
        );
    }

    #[test]
    fn test_existing_status_flags_kept() {
        let given = args(&["hashcat", "--status-timer=5", "-m", "0", "--status"]);
        assert_eq!(worker_args(&given, 15), given);
    }

    #[test]
    fn test_only_missing_flag_injected() {
        assert_eq!(
            worker_args(&args(&["hashcat", "--status"]), 15),
            args(&["hashcat", "--status-timer=15", "--status"])
        );
        assert_eq!(
            worker_args(&args(&["hashcat", "--status-timer", "30"]), 15),
            args(&["hashcat", "--status", "--status-timer", "30"])
        );
    }

    #[test]
    fn test_configured_status_timer() {
        assert_eq!(
            worker_args(&args(&["hashcat"]), 60),
            args(&["hashcat", "--status", "--status-timer=60"])
        );
    }

    #[test]
    fn test_empty_worker() {
        assert!(worker_args(&[], 15).is_empty());
    }

    #[tokio::test]
    async fn test_empty_command_is_start_failure() {
        let err = supervisor()
            .run_with_output(&[], Box::new(PipeAttachment::new()), tokio::io::sink())
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::EmptyCommand));
        assert_eq!(err.phase(), Phase::Start);
    }

    #[tokio::test]
    async fn test_missing_program_is_start_failure() {
        let err = supervisor()
            .run_with_output(
                &args(&["/nonexistent/skipwatch-worker"]),
                Box::new(PipeAttachment::new()),
                tokio::io::sink(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::Start(_)));
        assert_eq!(err.phase(), Phase::Start);
    }

    #[tokio::test]
    async fn test_failed_worker_is_wait_failure() {
        let err = supervisor()
            .run_with_output(&script("exit 3"), Box::new(PipeAttachment::new()), tokio::io::sink())
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::Exit(status) if status.code() == Some(3)));
        assert_eq!(err.phase(), Phase::Wait);
    }

    #[tokio::test]
    async fn test_healthy_worker_runs_to_completion() {
        let body = "echo 'Status...........: Running'; \
                    echo 'Time.Started.....: (5 mins, 0 secs)'; \
                    echo 'Time.Estimated...: (1 hour)'; \
                    echo 'Recovered........: 50/100 (50.00%) Digests, 50/100 (50.00%) Salts'";
        let sup = supervisor();

        let summary = sup
            .run_with_output(&script(body), Box::new(PipeAttachment::new()), tokio::io::sink())
            .await
            .unwrap();

        assert_eq!(summary, Some(RunSummary { lines: 4, bypasses: 0 }));
        assert_eq!(sup.slot.pid(), None);
    }

    #[tokio::test]
    async fn test_protocol_violation_does_not_fail_run() {
        let summary = supervisor()
            .run_with_output(
                &script("echo 'Recovered. blah'; echo after"),
                Box::new(PipeAttachment::new()),
                tokio::io::sink(),
            )
            .await
            .unwrap();
        assert_eq!(summary, None);
    }
}
