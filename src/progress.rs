//! Run progress reporting, for the purpose of display to the user.

use crate::graph::{Rule, RuleId};
use crate::process::Termination;
use crate::task::TaskResult;

/// Trait for progress notifications while rules run.
pub trait Progress {
    /// Called when a rule's action starts.
    fn task_started(&mut self, id: RuleId, rule: &Rule, target: &str);

    /// Called when a rule's action completes.
    fn task_finished(&mut self, id: RuleId, target: &str, result: &TaskResult);

    /// Log a line of output, e.g. an explanation or a dry-run command.
    fn log(&mut self, msg: &str);
}

/// Progress implementation for a plain console.  Actions write straight to
/// the terminal, so this only adds a line around interesting events.
#[derive(Default)]
pub struct ConsoleProgress {
    /// Whether to announce each action as it starts.
    verbose: bool,
}

impl ConsoleProgress {
    pub fn new(verbose: bool) -> Self {
        ConsoleProgress { verbose }
    }
}

impl Progress for ConsoleProgress {
    fn task_started(&mut self, _id: RuleId, rule: &Rule, target: &str) {
        if self.verbose {
            self.log(&format!("[{}] building {}", rule.location, target));
        }
    }

    fn task_finished(&mut self, _id: RuleId, target: &str, result: &TaskResult) {
        match result.termination {
            Termination::Success => {}
            Termination::Interrupted => self.log(&format!("interrupted: {}", target)),
            Termination::Failure(status) => {
                self.log(&format!("failed: {} ({})", target, status))
            }
        }
    }

    fn log(&mut self, msg: &str) {
        println!("{}", msg);
    }
}
