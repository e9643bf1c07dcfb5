//! Operator termination handling
//!
//! SIGINT or SIGTERM to the supervisor kills the worker outright and exits
//! with [`TERMINATION_EXIT_CODE`]. There is no graceful shutdown.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tokio::process::Child;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Exit status after an operator-sent termination signal
pub const TERMINATION_EXIT_CODE: i32 = 255;

/// Pid of the running worker, shared with the termination handler
#[derive(Debug, Clone, Default)]
pub struct ChildSlot {
    pid: Arc<AtomicU32>,
}

impl ChildSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, pid: u32) {
        debug!(pid, "ChildSlot::set: called");
        self.pid.store(pid, Ordering::SeqCst);
    }

    /// Register a freshly spawned worker
    pub fn track(&self, child: &Child) {
        if let Some(pid) = child.id() {
            self.set(pid);
        }
    }

    /// Forget the worker once it has been reaped
    pub fn clear(&self) {
        debug!("ChildSlot::clear: called");
        self.pid.store(0, Ordering::SeqCst);
    }

    pub fn pid(&self) -> Option<u32> {
        match self.pid.load(Ordering::SeqCst) {
            0 => None,
            pid => Some(pid),
        }
    }

    /// Send `signal` to the registered worker.
    ///
    /// Returns `Ok(false)` without signalling anything once the worker has been
    /// reaped, so a recycled pid is never hit.
    pub fn signal(&self, signal: Signal) -> nix::Result<bool> {
        let Some(pid) = self.pid() else {
            debug!(%signal, "ChildSlot::signal: no worker registered");
            return Ok(false);
        };
        debug!(pid, %signal, "ChildSlot::signal: sending");
        kill(Pid::from_raw(pid as i32), signal)?;
        Ok(true)
    }

    /// SIGKILL the worker. Does nothing when no worker is registered and
    /// ignores a worker that has already exited.
    pub fn kill(&self) {
        match self.signal(Signal::SIGKILL) {
            Ok(true) => debug!("ChildSlot::kill: worker killed"),
            Ok(false) => {}
            Err(e) => debug!(error = %e, "ChildSlot::kill: worker already gone"),
        }
    }
}

/// Listen for SIGINT/SIGTERM for the rest of the process lifetime.
///
/// Must be called from within the tokio runtime, before the worker is spawned.
pub fn spawn_termination_handler(slot: ChildSlot) -> io::Result<JoinHandle<()>> {
    debug!("spawn_termination_handler: called");
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        };
        warn!(signal = name, pid = ?slot.pid(), "Termination signal received, killing worker");
        slot.kill();
        std::process::exit(TERMINATION_EXIT_CODE);
    }))
}
