//! Interactive attachment: worker stdin on a pseudo-terminal
//!
//! The worker only gets the terminal on stdin. Its stdout stays a pipe so the
//! status stream can be interpreted, and stderr goes straight to ours.

use std::fs::File;
use std::io::{self, BufRead, Write};
use std::process::Stdio;
use std::thread;

use nix::pty::{OpenptyResult, Winsize, openpty};
use nix::sys::termios::Termios;
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

use super::{Attachment, AttachmentKind, StopAction, Stopper};
use crate::signals::ChildSlot;

/// Worker stdin is the slave side of a pty we hold the master of
#[derive(Debug)]
pub struct PtyAttachment {
    bypass_key: u8,
    master: Option<File>,
}

impl PtyAttachment {
    pub fn new(bypass_key: u8) -> Self {
        Self {
            bypass_key,
            master: None,
        }
    }

    fn master(&self) -> io::Result<&File> {
        self.master
            .as_ref()
            .ok_or_else(|| io::Error::other("pty attachment used before the worker was spawned"))
    }
}

impl Attachment for PtyAttachment {
    fn kind(&self) -> AttachmentKind {
        AttachmentKind::Pty
    }

    fn spawn(&mut self, mut cmd: Command, slot: &ChildSlot) -> io::Result<Child> {
        debug!(?cmd, "PtyAttachment::spawn: called");
        let OpenptyResult { master, slave } = openpty(None::<&Winsize>, None::<&Termios>)?;

        cmd.stdin(Stdio::from(slave)).stdout(Stdio::piped()).stderr(Stdio::inherit());
        // SAFETY: the hook only makes async-signal-safe syscalls.
        unsafe {
            cmd.pre_exec(acquire_controlling_terminal);
        }

        // Our copy of the slave closes when `cmd` drops at the end of this call.
        let child = cmd.spawn()?;
        slot.track(&child);
        info!(pid = ?child.id(), "Worker started on pty");

        self.master = Some(File::from(master));
        Ok(child)
    }

    fn relay_input(&mut self) -> io::Result<()> {
        let master = self.master()?.try_clone()?;
        debug!("PtyAttachment::relay_input: starting keystroke relay");
        // A plain thread: a blocked terminal read must never hold up runtime shutdown.
        thread::Builder::new()
            .name("keystroke-relay".to_string())
            .spawn(move || relay_lines(io::stdin().lock(), master))?;
        Ok(())
    }

    fn stopper(&self) -> io::Result<Box<dyn Stopper>> {
        let master = self.master()?.try_clone()?;
        Ok(Box::new(KeystrokeStopper::new(master, self.bypass_key)))
    }
}

/// Runs in the child between fork and exec: new session, slave as controlling terminal
fn acquire_controlling_terminal() -> io::Result<()> {
    nix::unistd::setsid()?;
    // SAFETY: fd 0 is the slave, already installed as stdin.
    if unsafe { nix::libc::ioctl(0, nix::libc::TIOCSCTTY as _, 0) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Copy operator input into the terminal one line at a time, newline dropped
fn relay_lines<R: BufRead, W: Write>(input: R, mut terminal: W) {
    for line in input.lines() {
        match line {
            Ok(line) => {
                debug!(len = line.len(), "relay_lines: relaying operator input");
                if let Err(e) = terminal.write_all(line.as_bytes()).and_then(|_| terminal.flush()) {
                    warn!(error = %e, "Failed to write operator input to worker terminal");
                    return;
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to read operator input");
                return;
            }
        }
    }
    debug!("relay_lines: operator input closed");
}

/// Writes the bypass key into the worker's terminal
#[derive(Debug)]
pub struct KeystrokeStopper<W = File> {
    terminal: W,
    key: u8,
}

impl<W: Write + Send> KeystrokeStopper<W> {
    pub fn new(terminal: W, key: u8) -> Self {
        Self { terminal, key }
    }
}

impl<W: Write + Send> Stopper for KeystrokeStopper<W> {
    fn action(&self) -> StopAction {
        StopAction::Keystroke(self.key)
    }

    fn stop(&mut self) -> io::Result<()> {
        debug!(key = self.key, "KeystrokeStopper::stop: writing key");
        self.terminal.write_all(&[self.key])?;
        self.terminal.flush()
    }
}
