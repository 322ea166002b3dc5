//! Runs a single command line through the shell.
//!
//! Output is not captured: the child shares our stdout/stderr so tool output
//! reaches the user as it is produced.

use crate::error::Status;
use crate::signal;
use std::process::{Command, Stdio};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Termination {
    Success,
    Interrupted,
    Failure(Status),
}

#[cfg(unix)]
fn shell(cmdline: &str) -> Command {
    let mut cmd = Command::new("/bin/sh");
    cmd.arg("-c").arg(cmdline);
    cmd
}

#[cfg(windows)]
fn shell(cmdline: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/c").arg(cmdline);
    cmd
}

#[cfg(unix)]
fn termination(status: std::process::ExitStatus) -> Termination {
    use std::os::unix::process::ExitStatusExt;
    if status.success() {
        return Termination::Success;
    }
    match (status.code(), status.signal()) {
        (_, Some(libc::SIGINT)) => Termination::Interrupted,
        (_, Some(sig)) => Termination::Failure(Status::Signal(sig)),
        (Some(code), None) => Termination::Failure(Status::Exit(code)),
        (None, None) => Termination::Failure(Status::Exit(1)),
    }
}

#[cfg(not(unix))]
fn termination(status: std::process::ExitStatus) -> Termination {
    match status.code() {
        Some(0) => Termination::Success,
        Some(code) => Termination::Failure(Status::Exit(code)),
        None => Termination::Failure(Status::Exit(1)),
    }
}

/// Runs cmdline with `sh -c`, blocking until it exits.  Returns an Err() only
/// if the shell couldn't be started at all.
pub fn run_command(cmdline: &str) -> std::io::Result<Termination> {
    let status = shell(cmdline).stdin(Stdio::null()).status()?;
    let term = termination(status);
    // A shell that saw the user's ^C may exit normally with a failure code
    // instead of dying from the signal itself.
    if let Termination::Failure(_) = term {
        if signal::was_interrupted() {
            return Ok(Termination::Interrupted);
        }
    }
    Ok(term)
}
