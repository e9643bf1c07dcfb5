//! Supervisor error types

use std::fmt;
use std::io;
use std::process::ExitStatus;

use thiserror::Error;

/// Lifecycle phase a supervisor failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    Wait,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Start => write!(f, "start"),
            Phase::Wait => write!(f, "wait"),
        }
    }
}

/// Errors that end a supervised run
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("No worker command given")]
    EmptyCommand,

    #[error("Start: {0}")]
    Start(io::Error),

    #[error("Start: worker stdout was not captured")]
    NoOutput,

    #[error("Wait: {0}")]
    Wait(io::Error),

    #[error("Wait: worker {0}")]
    Exit(ExitStatus),
}

impl SupervisorError {
    /// The phase that failed
    pub fn phase(&self) -> Phase {
        match self {
            SupervisorError::EmptyCommand | SupervisorError::Start(_) | SupervisorError::NoOutput => Phase::Start,
            SupervisorError::Wait(_) | SupervisorError::Exit(_) => Phase::Wait,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;

    #[test]
    fn test_start_phase() {
        let err = SupervisorError::Start(io::Error::new(io::ErrorKind::NotFound, "no such file"));
        assert_eq!(err.phase(), Phase::Start);
        assert_eq!(err.to_string(), "Start: no such file");
        assert_eq!(SupervisorError::EmptyCommand.phase(), Phase::Start);
    }

    #[test]
    fn test_exit_status_is_wait_phase() {
        let err = SupervisorError::Exit(ExitStatus::from_raw(1 << 8));
        assert_eq!(err.phase(), Phase::Wait);
        assert!(err.to_string().contains("exit status: 1"));
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Start.to_string(), "start");
        assert_eq!(Phase::Wait.to_string(), "wait");
    }
}
