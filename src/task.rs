//! Runs rule actions, potentially in parallel.
//! Unaware of the task graph's shape; just command execution.

use crate::error::Status;
use crate::graph::{Command, RuleId};
use crate::process::{self, Termination};
use crate::signal;
use std::io::Write;
use std::sync::mpsc;
use std::time::Instant;

pub struct FinishedTask {
    /// A (faked) "thread id", used to put different finished tasks in different
    /// tracks in a performance trace.
    pub tid: usize,
    pub rule: RuleId,
    pub span: (Instant, Instant),
    pub result: TaskResult,
}

/// The result of executing a rule's action.
#[derive(Debug)]
pub struct TaskResult {
    pub termination: Termination,
    /// The command line that ended the action, when it didn't succeed.
    pub failed_command: Option<String>,
}

/// Executes each command line in order, stopping at the first failure that
/// isn't ignored.
fn run_task(commands: &[Command], echo: bool) -> TaskResult {
    for cmd in commands {
        // A ^C may land between command lines, or be swallowed by a child
        // that then exits successfully.
        if signal::was_interrupted() {
            return TaskResult {
                termination: Termination::Interrupted,
                failed_command: Some(cmd.line.clone()),
            };
        }
        if echo && !cmd.silent {
            println!("{}", cmd.line);
            // Get the echo out before the child's own output.
            let _ = std::io::stdout().flush();
        }
        let termination = match process::run_command(&cmd.line) {
            Ok(t) => t,
            Err(err) => {
                eprintln!("pipemake: {}: {}", cmd.line, err);
                Termination::Failure(Status::Exit(127))
            }
        };
        match termination {
            Termination::Success => {}
            Termination::Failure(status) if cmd.ignore_errors => {
                println!("pipemake: [{}] ignored {}", cmd.line, status);
            }
            _ => {
                return TaskResult {
                    termination,
                    failed_command: Some(cmd.line.clone()),
                }
            }
        }
    }
    TaskResult {
        termination: Termination::Success,
        failed_command: None,
    }
}

/// Tracks faked "thread ids" -- integers assigned to tasks to track
/// parallelism in perf trace output.
struct ThreadIds {
    /// An entry is true when claimed, false or nonexistent otherwise.
    slots: Vec<bool>,
}
impl ThreadIds {
    fn new() -> Self {
        ThreadIds { slots: Vec::new() }
    }

    fn claim(&mut self) -> usize {
        match self.slots.iter().position(|&used| !used) {
            Some(idx) => {
                self.slots[idx] = true;
                idx
            }
            None => {
                let idx = self.slots.len();
                self.slots.push(true);
                idx
            }
        }
    }

    fn release(&mut self, slot: usize) {
        self.slots[slot] = false;
    }
}

pub struct Runner {
    finished_send: mpsc::Sender<FinishedTask>,
    finished_recv: mpsc::Receiver<FinishedTask>,
    running: usize,
    tids: ThreadIds,
    parallelism: usize,
}

impl Runner {
    pub fn new(parallelism: usize) -> Self {
        let (tx, rx) = mpsc::channel();
        Runner {
            finished_send: tx,
            finished_recv: rx,
            running: 0,
            tids: ThreadIds::new(),
            parallelism: parallelism.max(1),
        }
    }

    pub fn can_start_more(&self) -> bool {
        self.running < self.parallelism
    }

    pub fn is_running(&self) -> bool {
        self.running > 0
    }

    /// Run a rule's action on its own thread.
    pub fn start(&mut self, id: RuleId, commands: Vec<Command>, echo: bool) {
        let tid = self.tids.claim();
        let tx = self.finished_send.clone();
        std::thread::spawn(move || {
            let start = Instant::now();
            let result = run_task(&commands, echo);
            let finish = Instant::now();

            let task = FinishedTask {
                tid,
                rule: id,
                span: (start, finish),
                result,
            };
            // The send will only fail if the receiver disappeared, e.g. due to shutting down.
            let _ = tx.send(task);
        });
        self.running += 1;
    }

    /// Wait for a task to complete.  Must only be called while is_running().
    pub fn wait(&mut self) -> FinishedTask {
        // We hold a sender ourselves, so recv() only fails on a broken channel.
        let task = self.finished_recv.recv().unwrap();
        self.tids.release(task.tid);
        self.running -= 1;
        task
    }
}
