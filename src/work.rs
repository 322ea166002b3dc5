//! Resolution of requested targets: planning which rules are needed, then
//! running the stale ones in dependency order.

use crate::canon::canon_path;
use crate::densemap::DenseMap;
use crate::error::{BuildError, Status};
use crate::fs::{is_stale, stat, MTime};
use crate::graph::{Artifact, FileId, Graph, RuleId};
use crate::process::Termination;
use crate::progress::Progress;
use crate::signal;
use crate::task::{self, FinishedTask};
use crate::trace;
use rustc_hash::FxHashMap;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Each rule wanted by a resolution moves through these states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RuleState {
    /// Not needed for any requested target.
    Unknown,
    /// On the planning stack; seeing it again means a cycle.
    Visiting,
    /// Needed, waiting for prerequisite rules to finish.
    Want,
    /// Prerequisites finished, waiting its turn to be checked and started.
    Ready,
    /// Action running.
    Running,
    /// Target up to date, whether or not its action ran.
    Done,
    /// Action failed.
    Failed,
}

/// Knobs controlling a resolution.
#[derive(Clone, Debug)]
pub struct Options {
    /// Stop starting actions after this many failures; 0 means never stop.
    pub keep_going: usize,
    /// Maximum number of actions running at once.
    pub parallelism: usize,
    /// Print the actions that would run instead of running them.
    pub dry_run: bool,
    /// Log why each rule is or isn't run.
    pub explain: bool,
    /// Print non-silent command lines before running them.
    pub echo: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            keep_going: 1,
            parallelism: 1,
            dry_run: false,
            explain: false,
            echo: true,
        }
    }
}

fn stat_file(name: &str) -> Result<MTime, BuildError> {
    stat(name).map_err(|source| BuildError::Io {
        path: name.to_string(),
        source,
    })
}

/// Why a rule's target is stale, if it is.
fn staleness_reason(
    graph: &Graph,
    target: MTime,
    prereqs: &[(FileId, MTime)],
) -> Option<String> {
    let target_time = match target {
        MTime::Missing => return Some("target is missing".into()),
        MTime::Stamp(t) => t,
    };
    for &(id, mtime) in prereqs {
        let name = &graph.file(id).name;
        match mtime {
            MTime::Missing => return Some(format!("prerequisite {} is missing", name)),
            MTime::Stamp(t) if t > target_time => {
                return Some(format!("prerequisite {} is newer than the target", name))
            }
            MTime::Stamp(_) => {}
        }
    }
    None
}

/// Whether the rule should run, and what happened when we tried.
enum Start {
    /// Target already fresh (or nothing to run), no action.
    Fresh,
    /// Action started on the runner.
    Running,
    /// Dry run: the action would have run.
    WouldRun,
}

pub struct Work<'a> {
    graph: &'a Graph,
    progress: &'a mut dyn Progress,
    options: Options,
    runner: task::Runner,

    states: DenseMap<RuleId, RuleState>,
    /// Post-order position of each planned rule: prerequisites come before
    /// their dependents, and siblings in declared order.
    order: DenseMap<RuleId, usize>,
    planned: usize,
    /// Count of unfinished prerequisite rules, for each planned rule.
    pending: DenseMap<RuleId, usize>,
    /// Ready rules, lowest post-order position first.
    ready: BinaryHeap<Reverse<(usize, RuleId)>>,
    /// Rules whose action ran (or would have, in a dry run).
    ran: DenseMap<RuleId, bool>,
    /// Target mtime as observed when each running action started, so a
    /// failed action's half-written output can be told apart from an old one.
    started_mtime: FxHashMap<RuleId, MTime>,

    failures: usize,
    first_error: Option<BuildError>,
    interrupted: bool,
}

impl<'a> Work<'a> {
    pub fn new(graph: &'a Graph, progress: &'a mut dyn Progress, options: Options) -> Self {
        let n = graph.rules.len();
        let runner = task::Runner::new(options.parallelism);
        Work {
            graph,
            progress,
            options,
            runner,
            states: DenseMap::new_sized(n, RuleState::Unknown),
            order: DenseMap::new_sized(n, 0),
            planned: 0,
            pending: DenseMap::new_sized(n, 0),
            ready: BinaryHeap::new(),
            ran: DenseMap::new_sized(n, false),
            started_mtime: FxHashMap::default(),
            failures: 0,
            first_error: None,
            interrupted: false,
        }
    }

    fn explain(&mut self, target: &str, why: &str) {
        if self.options.explain {
            self.progress.log(&format!("explain: {}: {}", target, why));
        }
    }

    fn target_name(&self, id: RuleId) -> &'a str {
        let graph = self.graph;
        &graph.file(graph.rule(id).target).name
    }

    /// Request a target by name.  A name without a rule is fine as long as
    /// the file already exists.
    pub fn want_file(&mut self, name: &str) -> Result<(), BuildError> {
        match self.graph.lookup(name) {
            Some(id) => self.want_fileid(id),
            None => {
                let name = canon_path(name);
                match stat_file(&name)? {
                    MTime::Missing => Err(BuildError::MissingRule {
                        target: name,
                        needed_by: None,
                    }),
                    MTime::Stamp(_) => Ok(()),
                }
            }
        }
    }

    pub fn want_fileid(&mut self, id: FileId) -> Result<(), BuildError> {
        let mut stack = Vec::new();
        self.want_file_inner(id, None, &mut stack)
    }

    fn want_file_inner(
        &mut self,
        id: FileId,
        needed_by: Option<RuleId>,
        stack: &mut Vec<RuleId>,
    ) -> Result<(), BuildError> {
        let file = self.graph.file(id);
        if let Some(rule) = file.input {
            return self.want_rule(rule, stack);
        }
        if file.phony {
            return Ok(());
        }
        match stat_file(&file.name)? {
            MTime::Stamp(_) => Ok(()),
            MTime::Missing => Err(BuildError::MissingRule {
                target: file.name.clone(),
                needed_by: needed_by.map(|r| self.target_name(r).to_string()),
            }),
        }
    }

    /// Depth-first visit of a rule's prerequisites.  Rules already planned
    /// are skipped, so shared prerequisites are planned once.
    fn want_rule(&mut self, id: RuleId, stack: &mut Vec<RuleId>) -> Result<(), BuildError> {
        match self.states[id] {
            RuleState::Unknown => {}
            RuleState::Visiting => {
                let start = stack.iter().position(|&r| r == id).unwrap_or(0);
                let mut path: Vec<String> = stack[start..]
                    .iter()
                    .map(|&r| self.target_name(r).to_string())
                    .collect();
                path.push(self.target_name(id).to_string());
                return Err(BuildError::CycleDetected { path });
            }
            _ => return Ok(()),
        }

        self.states[id] = RuleState::Visiting;
        stack.push(id);
        let graph = self.graph;
        for &prereq in &graph.rule(id).prereqs {
            self.want_file_inner(prereq, Some(id), stack)?;
        }
        stack.pop();

        self.states[id] = RuleState::Want;
        self.order[id] = self.planned;
        self.planned += 1;
        Ok(())
    }

    /// The planned rules in execution order for a single worker.
    pub fn plan(&self) -> Vec<RuleId> {
        let mut plan: Vec<RuleId> = self
            .states
            .iter()
            .filter(|&(_, &state)| state != RuleState::Unknown)
            .map(|(id, _)| id)
            .collect();
        plan.sort_by_key(|&id| self.order[id]);
        plan
    }

    fn push_ready(&mut self, id: RuleId) {
        self.states[id] = RuleState::Ready;
        self.ready.push(Reverse((self.order[id], id)));
    }

    /// Mark a rule's target up to date and release its dependents.
    fn finish_done(&mut self, id: RuleId) {
        self.states[id] = RuleState::Done;
        let graph = self.graph;
        for &dependent in &graph.file(graph.rule(id).target).dependents {
            if self.states[dependent] != RuleState::Want {
                continue;
            }
            self.pending[dependent] -= 1;
            if self.pending[dependent] == 0 {
                self.push_ready(dependent);
            }
        }
    }

    fn record_failure(&mut self, id: RuleId, err: BuildError) {
        self.states[id] = RuleState::Failed;
        self.failures += 1;
        if self.first_error.is_none() {
            self.first_error = Some(err);
        }
    }

    fn stopping(&self) -> bool {
        self.interrupted
            || signal::was_interrupted()
            || (self.options.keep_going > 0 && self.failures >= self.options.keep_going)
    }

    /// Decide whether a ready rule is stale, and if so start its action.
    fn start_rule(&mut self, id: RuleId) -> Result<Start, BuildError> {
        let graph = self.graph;
        let rule = graph.rule(id);
        let target = graph.file(rule.target);

        if rule.is_aggregate() {
            self.explain(&target.name, "no commands");
            return Ok(Start::Fresh);
        }

        let target_mtime = if target.phony {
            self.explain(&target.name, "phony, always runs");
            MTime::Missing
        } else {
            let target_mtime = stat_file(&target.name)?;
            let mut prereqs = Vec::with_capacity(rule.prereqs.len());
            for &prereq in &rule.prereqs {
                let file = graph.file(prereq);
                // Phony prerequisites only order execution.
                if file.phony {
                    continue;
                }
                prereqs.push((prereq, stat_file(&file.name)?));
            }
            let stale = is_stale(target_mtime, prereqs.iter().map(|&(_, mtime)| mtime));
            // In a dry run nothing is rebuilt, so treat anything downstream
            // of a would-run action as stale too.
            let upstream = if self.options.dry_run {
                graph.prereq_rules(id).find(|&p| self.ran[p])
            } else {
                None
            };
            if !stale && upstream.is_none() {
                self.explain(&target.name, "up to date");
                return Ok(Start::Fresh);
            }
            if self.options.explain {
                let why = match staleness_reason(graph, target_mtime, &prereqs) {
                    Some(why) => why,
                    None => match upstream {
                        Some(p) => format!("prerequisite {} would be rebuilt", self.target_name(p)),
                        None => "stale".into(),
                    },
                };
                self.explain(&target.name, &why);
            }
            target_mtime
        };

        self.ran[id] = true;
        if self.options.dry_run {
            for cmd in &rule.commands {
                self.progress.log(&cmd.line);
            }
            return Ok(Start::WouldRun);
        }

        tracing::debug!(target = %target.name, "starting action");
        self.states[id] = RuleState::Running;
        self.started_mtime.insert(id, target_mtime);
        self.progress.task_started(id, rule, &target.name);
        self.runner
            .start(id, rule.commands.clone(), self.options.echo);
        Ok(Start::Running)
    }

    /// Remove the target of a failed action, but only if the action touched
    /// it: an old, previously good output is left alone.
    fn remove_partial_output(&mut self, id: RuleId) {
        let graph = self.graph;
        let target = graph.file(graph.rule(id).target);
        if target.phony {
            return;
        }
        let before = self
            .started_mtime
            .get(&id)
            .copied()
            .unwrap_or(MTime::Missing);
        let after = match stat(&target.name) {
            Ok(mtime) => mtime,
            Err(_) => return,
        };
        if after == MTime::Missing || after == before {
            return;
        }
        self.progress
            .log(&format!("pipemake: deleting {}", target.name));
        if let Err(err) = std::fs::remove_file(&target.name) {
            tracing::warn!(path = %target.name, "failed to delete partial output: {}", err);
        }
    }

    fn task_finished(&mut self, task: FinishedTask) {
        let id = task.rule;
        let graph = self.graph;
        let rule = graph.rule(id);
        let target = graph.file(rule.target);
        trace::write_complete(&target.name, task.tid + 1, task.span.0, task.span.1);
        self.progress.task_finished(id, &target.name, &task.result);

        match task.result.termination {
            Termination::Success => {
                let created = if target.phony {
                    Ok(true)
                } else {
                    stat_file(&target.name).map(|mtime| mtime != MTime::Missing)
                };
                match created {
                    Ok(true) => {
                        tracing::debug!(target = %target.name, "action finished");
                        self.finish_done(id);
                    }
                    Ok(false) => {
                        let command = rule
                            .commands
                            .last()
                            .map(|c| c.line.clone())
                            .unwrap_or_default();
                        self.record_failure(
                            id,
                            BuildError::ActionFailed {
                                target: target.name.clone(),
                                command,
                                status: Status::NotCreated,
                            },
                        );
                    }
                    Err(err) => self.record_failure(id, err),
                }
            }
            Termination::Failure(status) => {
                self.remove_partial_output(id);
                let command = task.result.failed_command.unwrap_or_default();
                self.record_failure(
                    id,
                    BuildError::ActionFailed {
                        target: target.name.clone(),
                        command,
                        status,
                    },
                );
            }
            Termination::Interrupted => {
                self.remove_partial_output(id);
                self.states[id] = RuleState::Failed;
                self.interrupted = true;
            }
        }
    }

    /// Run everything wanted so far.  Returns the number of actions run (or,
    /// in a dry run, the number that would have run).
    pub fn run(&mut self) -> Result<usize, BuildError> {
        let graph = self.graph;
        for id in graph.rules.all_ids() {
            if self.states[id] != RuleState::Want {
                continue;
            }
            let pending = graph
                .prereq_rules(id)
                .filter(|&p| self.states[p] != RuleState::Done)
                .count();
            self.pending[id] = pending;
            if pending == 0 {
                self.push_ready(id);
            }
        }

        let mut ran = 0;
        loop {
            // Start as many ready rules as the runner allows.  Fresh rules
            // finish immediately and may make more rules ready.
            while !self.stopping() && self.runner.can_start_more() {
                let id = match self.ready.pop() {
                    Some(Reverse((_, id))) => id,
                    None => break,
                };
                // A stat error fails just this rule, so actions already
                // running are still waited for.
                match self.start_rule(id) {
                    Ok(Start::Fresh) => self.finish_done(id),
                    Ok(Start::WouldRun) => {
                        ran += 1;
                        self.finish_done(id);
                    }
                    Ok(Start::Running) => ran += 1,
                    Err(err) => self.record_failure(id, err),
                }
            }

            if !self.runner.is_running() {
                break;
            }
            let task = self.runner.wait();
            self.task_finished(task);
        }

        if self.interrupted || signal::was_interrupted() {
            return Err(BuildError::Interrupted);
        }
        if let Some(err) = self.first_error.take() {
            return Err(err);
        }
        Ok(ran)
    }
}

/// Bring one target up to date, returning it as found on disk afterwards.
pub fn resolve(
    graph: &Graph,
    target: &str,
    progress: &mut dyn Progress,
    options: Options,
) -> Result<Artifact, BuildError> {
    let mut work = Work::new(graph, progress, options);
    work.want_file(target)?;
    work.run()?;
    let path = match graph.lookup(target) {
        Some(id) => graph.file(id).name.clone(),
        None => canon_path(target),
    };
    let mtime = stat_file(&path)?;
    Ok(Artifact { path, mtime })
}
