//! How the worker is connected to the supervisor's terminal
//!
//! Two strategies share one interface:
//!
//! - [`PtyAttachment`] when our stdin is a terminal. The worker's stdin is a
//!   pseudo-terminal, operator keystrokes are relayed into it, and a bypass is
//!   a keypress written to the terminal.
//! - [`PipeAttachment`] otherwise. The worker inherits our stdin and a bypass
//!   is an interrupt signal.
//!
//! In both cases the worker's stdout is piped back for interpretation and its
//! stderr is passed through.

mod pipe;
mod pty;

use std::io;
use std::io::IsTerminal;

use nix::sys::signal::Signal;
use tokio::process::{Child, Command};
use tracing::debug;

use crate::signals::ChildSlot;

pub use pipe::{PipeAttachment, SignalStopper};
pub use pty::{KeystrokeStopper, PtyAttachment};

/// Keypress that makes the worker bypass the current unit
pub const DEFAULT_BYPASS_KEY: u8 = b'b';

/// Which attachment strategy is in use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Pty,
    Pipe,
}

impl AttachmentKind {
    /// Pick the strategy for the current process
    pub fn detect() -> Self {
        Self::for_terminal(io::stdin().is_terminal())
    }

    /// Pick the strategy for a stdin that is (or is not) a terminal
    pub fn for_terminal(interactive: bool) -> Self {
        debug!(interactive, "AttachmentKind::for_terminal: called");
        if interactive {
            AttachmentKind::Pty
        } else {
            AttachmentKind::Pipe
        }
    }

    /// Whether the policy may hold off on units that are nearly done.
    ///
    /// Only an interactive session honours the worker's estimate; without a
    /// terminal the rate threshold alone decides.
    pub fn watches_estimated(self) -> bool {
        matches!(self, AttachmentKind::Pty)
    }

    /// The stop action this strategy injects
    pub fn stop_action(self, bypass_key: u8) -> StopAction {
        match self {
            AttachmentKind::Pty => StopAction::Keystroke(bypass_key),
            AttachmentKind::Pipe => StopAction::Signal(Signal::SIGINT),
        }
    }

    /// Build the attachment for this kind
    pub fn attachment(self, bypass_key: u8) -> Box<dyn Attachment> {
        match self {
            AttachmentKind::Pty => Box::new(PtyAttachment::new(bypass_key)),
            AttachmentKind::Pipe => Box::new(PipeAttachment::new()),
        }
    }
}

impl std::fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttachmentKind::Pty => write!(f, "pty"),
            AttachmentKind::Pipe => write!(f, "pipe"),
        }
    }
}

/// What a bypass does to the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopAction {
    /// Write a single byte to the worker's terminal
    Keystroke(u8),
    /// Deliver a signal to the worker process
    Signal(Signal),
}

/// Injects the stop action into a running worker
pub trait Stopper: Send {
    fn action(&self) -> StopAction;

    fn stop(&mut self) -> io::Result<()>;
}

impl<S: Stopper + ?Sized> Stopper for Box<S> {
    fn action(&self) -> StopAction {
        (**self).action()
    }

    fn stop(&mut self) -> io::Result<()> {
        (**self).stop()
    }
}

/// Connects a worker process to the supervisor
pub trait Attachment: Send {
    fn kind(&self) -> AttachmentKind;

    /// Capability flag for the nearly-done escape clause
    fn watches_estimated(&self) -> bool {
        self.kind().watches_estimated()
    }

    /// Wire the worker's stdio and start it. Stdout is always piped.
    ///
    /// The worker is registered in `slot` as soon as it exists.
    fn spawn(&mut self, cmd: Command, slot: &ChildSlot) -> io::Result<Child>;

    /// Start delivering operator input to the worker
    fn relay_input(&mut self) -> io::Result<()>;

    /// Handle that injects the stop action into the spawned worker
    fn stopper(&self) -> io::Result<Box<dyn Stopper>>;
}
