//! Errors surfaced while resolving targets.

use thiserror::Error;

/// How a failed action ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The command exited with a non-zero code.
    Exit(i32),
    /// The command was killed by a signal.
    Signal(i32),
    /// Every command succeeded but the target file doesn't exist afterwards.
    NotCreated,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Exit(code) => write!(f, "exit code {}", code),
            Status::Signal(sig) => write!(f, "signal {}", sig),
            Status::NotCreated => write!(f, "exit code 0, but the target was not created"),
        }
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{target}: command failed with {status}: {command}")]
    ActionFailed {
        target: String,
        command: String,
        status: Status,
    },
    #[error("dependency cycle: {}", .path.join(" -> "))]
    CycleDetected { path: Vec<String> },
    #[error("no rule to make {target:?}{}", needed_by_suffix(.needed_by))]
    MissingRule {
        target: String,
        needed_by: Option<String>,
    },
    #[error("interrupted by user")]
    Interrupted,
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

fn needed_by_suffix(needed_by: &Option<String>) -> String {
    match needed_by {
        Some(name) => format!(", needed by {:?}", name),
        None => String::new(),
    }
}

impl BuildError {
    /// The process exit code for this failure.
    ///
    /// A failed action passes its own exit code through, so an action that
    /// exits 2 or 3 is indistinguishable by code alone from `MissingRule` or
    /// `CycleDetected`; the message on stderr tells them apart.
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildError::ActionFailed { status, .. } => match *status {
                Status::Exit(code) if code != 0 => code,
                Status::Signal(sig) => 128 + sig,
                _ => 1,
            },
            BuildError::MissingRule { .. } => 2,
            BuildError::CycleDetected { .. } => 3,
            BuildError::Interrupted => 130,
            BuildError::Io { .. } => 1,
        }
    }
}
