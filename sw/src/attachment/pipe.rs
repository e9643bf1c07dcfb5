//! Non-interactive attachment: inherited stdin, bypass by signal

use std::io;
use std::process::Stdio;

use nix::sys::signal::Signal;
use tokio::process::{Child, Command};
use tracing::{debug, info};

use super::{Attachment, AttachmentKind, StopAction, Stopper};
use crate::signals::ChildSlot;

/// Worker reads our stdin directly; there is nothing to relay
#[derive(Debug, Default)]
pub struct PipeAttachment {
    slot: ChildSlot,
}

impl PipeAttachment {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Attachment for PipeAttachment {
    fn kind(&self) -> AttachmentKind {
        AttachmentKind::Pipe
    }

    fn spawn(&mut self, mut cmd: Command, slot: &ChildSlot) -> io::Result<Child> {
        debug!(?cmd, "PipeAttachment::spawn: called");
        cmd.stdin(Stdio::inherit()).stdout(Stdio::piped()).stderr(Stdio::inherit());
        let child = cmd.spawn()?;
        slot.track(&child);
        self.slot = slot.clone();
        info!(pid = ?child.id(), "Worker started on pipes");
        Ok(child)
    }

    fn relay_input(&mut self) -> io::Result<()> {
        debug!("PipeAttachment::relay_input: stdin is inherited, nothing to relay");
        Ok(())
    }

    fn stopper(&self) -> io::Result<Box<dyn Stopper>> {
        if self.slot.pid().is_none() {
            return Err(io::Error::other("worker exited before a stopper was attached"));
        }
        Ok(Box::new(SignalStopper::new(self.slot.clone(), Signal::SIGINT)))
    }
}

/// Signals the worker registered in a [`ChildSlot`].
///
/// Once the worker has been reaped the slot is empty and `stop` fails
/// without sending anything.
#[derive(Debug, Clone)]
pub struct SignalStopper {
    slot: ChildSlot,
    signal: Signal,
}

impl SignalStopper {
    pub fn new(slot: ChildSlot, signal: Signal) -> Self {
        Self { slot, signal }
    }
}

impl Stopper for SignalStopper {
    fn action(&self) -> StopAction {
        StopAction::Signal(self.signal)
    }

    fn stop(&mut self) -> io::Result<()> {
        debug!(pid = ?self.slot.pid(), signal = %self.signal, "SignalStopper::stop: sending signal");
        if !self.slot.signal(self.signal)? {
            return Err(io::Error::new(io::ErrorKind::NotFound, "worker already reaped"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;

    #[tokio::test]
    async fn test_pipe_captures_stdout() {
        use tokio::io::AsyncReadExt;

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo hello");
        let mut attachment = PipeAttachment::new();
        let mut child = attachment.spawn(cmd, &ChildSlot::new()).unwrap();

        let mut out = String::new();
        child.stdout.take().unwrap().read_to_string(&mut out).await.unwrap();
        child.wait().await.unwrap();

        assert_eq!(out, "hello\n");
    }

    #[tokio::test]
    async fn test_signal_stopper_interrupts_worker() {
        use nix::sys::signal::{SigHandler, signal};

        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        // The test runner may have been started with SIGINT ignored.
        unsafe {
            cmd.pre_exec(|| {
                signal(Signal::SIGINT, SigHandler::SigDfl)?;
                Ok(())
            });
        }
        let slot = ChildSlot::new();
        let mut attachment = PipeAttachment::new();
        let mut child = attachment.spawn(cmd, &slot).unwrap();
        assert_eq!(slot.pid(), child.id());

        let mut stopper = attachment.stopper().unwrap();
        assert_eq!(stopper.action(), StopAction::Signal(Signal::SIGINT));
        stopper.stop().unwrap();

        let status = child.wait().await.unwrap();
        assert_eq!(status.signal(), Some(Signal::SIGINT as i32));
    }

    #[tokio::test]
    async fn test_signal_stopper_refuses_reaped_worker() {
        let slot = ChildSlot::new();
        let mut attachment = PipeAttachment::new();
        let mut child = attachment.spawn(Command::new("true"), &slot).unwrap();
        let mut stopper = attachment.stopper().unwrap();

        child.wait().await.unwrap();
        slot.clear();

        let err = stopper.stop().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_stopper_before_spawn_fails() {
        assert!(PipeAttachment::new().stopper().is_err());
    }
}
