//! skipwatch - bypass stalled units of a recovery worker
//!
//! skipwatch runs a long-lived recovery worker (hashcat and friends), watches
//! the status reports it prints, and makes it skip the current unit of work
//! when the recent recovery rate falls below a threshold.
//!
//! # Modules
//!
//! - [`duration`] - free-text duration fields
//! - [`interpreter`] - status stream state machine
//! - [`policy`] - bypass decision
//! - [`attachment`] - pty or pipe wiring of the worker
//! - [`supervisor`] - worker lifecycle
//! - [`signals`] - operator termination
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod attachment;
pub mod cli;
pub mod config;
pub mod duration;
pub mod error;
pub mod interpreter;
pub mod policy;
pub mod signals;
pub mod supervisor;

// Re-export commonly used types
pub use attachment::{Attachment, AttachmentKind, PipeAttachment, PtyAttachment, StopAction, Stopper};
pub use config::{Config, Settings};
pub use error::{Phase, SupervisorError};
pub use interpreter::{Interpreter, InterpreterError, LineKind, ProgressState, RunSummary};
pub use policy::{BypassDecision, BypassPolicy, HoldReason, Thresholds};
pub use signals::{ChildSlot, TERMINATION_EXIT_CODE, spawn_termination_handler};
pub use supervisor::{Supervisor, worker_args};
