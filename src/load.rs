//! Graph loading: reads rule files and constructs the task graph from them.

use crate::clean::CleanSpec;
use crate::eval::{Env, EvalString, ProcessEnv, Vars};
use crate::graph::{self, FileId, FileLoc, Graph, RuleId};
use crate::parse::{self, AssignOp, Statement};
use crate::trace;
use anyhow::{anyhow, bail};
use std::borrow::Cow;
use std::rc::Rc;

/// Includes nested deeper than this are assumed to be recursive.
const MAX_INCLUDE_DEPTH: usize = 32;

/// A variable lookup environment for the automatic variables $@, $< and $^.
struct RuleImplicitVars<'a> {
    graph: &'a Graph,
    rule: &'a graph::Rule,
}
impl<'a> RuleImplicitVars<'a> {
    fn file_list(&self, ids: &[FileId]) -> String {
        let mut out = String::new();
        for &id in ids {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&self.graph.file(id).name);
        }
        out
    }
}
impl<'a> Env for RuleImplicitVars<'a> {
    fn get_var(&self, var: &str) -> Option<Cow<str>> {
        match var {
            "@" => Some(Cow::Borrowed(self.graph.file(self.rule.target).name.as_str())),
            "<" => Some(Cow::Borrowed(match self.rule.prereqs.first() {
                Some(&id) => self.graph.file(id).name.as_str(),
                None => "",
            })),
            "^" => Some(Cow::Owned(self.file_list(&self.rule.prereqs))),
            _ => None,
        }
    }
}

/// A command line whose expansion waits until every file is loaded, so it
/// sees the final value of each variable.
struct PendingCommand {
    text: EvalString<String>,
    silent: bool,
    ignore_errors: bool,
}

/// Special targets configure the loader rather than define rules.
fn is_special_target(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next() == Some('.') && chars.next().map_or(false, |c| c.is_ascii_uppercase())
}

/// Internal state used while loading.
#[derive(Default)]
struct Loader {
    graph: Graph,
    vars: Vars,
    overrides: Vars,
    /// Rules added to the graph whose commands are still unexpanded.  Rules
    /// defined together on one line share the command list.
    pending: Vec<(RuleId, Rc<Vec<PendingCommand>>)>,
    first_target: Option<FileId>,
    default: Vec<FileId>,
    clean: Vec<CleanSpec>,
    depth: usize,
}

impl Loader {
    fn new(overrides: &[(String, String)]) -> Self {
        let mut loader = Loader::default();
        for (name, value) in overrides {
            loader.overrides.insert(name.clone(), value.clone());
        }
        loader
    }

    fn is_defined(&self, name: &str) -> bool {
        self.overrides.get(name).is_some()
            || self.vars.get(name).is_some()
            || ProcessEnv.get_var(name).is_some()
    }

    fn assign(&mut self, assign: parse::Assign) {
        let envs: [&dyn Env; 3] = [&self.overrides, &self.vars, &ProcessEnv];
        let value = assign.value.evaluate(&envs);
        match assign.op {
            AssignOp::Set => {}
            AssignOp::SetIfUnset => {
                if self.is_defined(assign.name) {
                    return;
                }
            }
            AssignOp::Append => {
                let envs: [&dyn Env; 2] = [&self.vars, &ProcessEnv];
                let prev = envs
                    .iter()
                    .find_map(|env| env.get_var(assign.name))
                    .map(Cow::into_owned);
                if let Some(prev) = prev.filter(|prev| !prev.is_empty()) {
                    self.vars
                        .insert(assign.name.to_string(), format!("{} {}", prev, value));
                    return;
                }
            }
        }
        self.vars.insert(assign.name.to_string(), value);
    }

    fn add_special(
        &mut self,
        location: &FileLoc,
        name: &str,
        words: &[&str],
        has_commands: bool,
    ) -> anyhow::Result<()> {
        if has_commands {
            bail!("{}: special target {} takes no commands", location, name);
        }
        match name {
            ".PHONY" => {
                for word in words {
                    let id = self.graph.file_id(*word);
                    self.graph.mark_phony(id);
                }
            }
            ".CLEAN" => {
                for word in words {
                    let spec = CleanSpec::parse(word).map_err(|err| anyhow!("{}: {}", location, err))?;
                    self.clean.push(spec);
                }
            }
            ".DEFAULT" => {
                for word in words {
                    let id = self.graph.file_id(*word);
                    self.default.push(id);
                }
            }
            _ => bail!("{}: unsupported special target {}", location, name),
        }
        Ok(())
    }

    fn add_rule(&mut self, filename: &Rc<String>, rule: parse::Rule) -> anyhow::Result<()> {
        let location = FileLoc {
            filename: filename.clone(),
            line: rule.line,
        };
        let envs: [&dyn Env; 3] = [&self.overrides, &self.vars, &ProcessEnv];
        let targets_text = rule.targets.evaluate(&envs);
        let prereqs_text = rule.prereqs.evaluate(&envs);
        let targets: Vec<&str> = targets_text.split_whitespace().collect();
        let words: Vec<&str> = prereqs_text.split_whitespace().collect();
        if targets.is_empty() {
            bail!("{}: rule targets expanded to nothing", location);
        }

        if let Some(special) = targets.iter().find(|t| is_special_target(t)) {
            if targets.len() > 1 {
                bail!("{}: special target {} must be the only target", location, special);
            }
            return self.add_special(&location, special, &words, !rule.commands.is_empty());
        }

        let mut prereqs: Vec<FileId> = Vec::with_capacity(words.len());
        for word in words {
            let id = self.graph.file_id(word);
            if !prereqs.contains(&id) {
                prereqs.push(id);
            }
        }
        let commands: Rc<Vec<PendingCommand>> = Rc::new(
            rule.commands
                .into_iter()
                .map(|cmd| PendingCommand {
                    text: cmd.text.into_owned(),
                    silent: cmd.silent,
                    ignore_errors: cmd.ignore_errors,
                })
                .collect(),
        );

        for target in targets {
            let target = self.graph.file_id(target);
            if self.first_target.is_none() {
                self.first_target = Some(target);
            }
            let id = self.graph.add_rule(graph::Rule {
                location: location.clone(),
                target,
                prereqs: prereqs.clone(),
                commands: Vec::new(),
            })?;
            self.pending.push((id, commands.clone()));
        }
        Ok(())
    }

    fn read_file(&mut self, path: &str, optional: bool) -> anyhow::Result<()> {
        let bytes = match trace::scope("fs::read", || std::fs::read(path)) {
            Ok(b) => b,
            Err(err) if optional && err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path, "skipping missing optional include");
                return Ok(());
            }
            Err(err) => bail!("read {}: {}", path, err),
        };
        self.parse(path, bytes)
    }

    fn parse(&mut self, path: &str, mut bytes: Vec<u8>) -> anyhow::Result<()> {
        bytes.push(0);
        let text = String::from_utf8(bytes).map_err(|_| anyhow!("{}: not valid UTF-8", path))?;
        let filename = Rc::new(path.to_string());

        let mut parser = parse::Parser::new(&text);
        loop {
            let stmt = match parser
                .read()
                .map_err(|err| anyhow!(parser.format_parse_error(&filename, err)))?
            {
                None => break,
                Some(s) => s,
            };
            match stmt {
                Statement::Assign(assign) => self.assign(assign),
                Statement::Rule(rule) => self.add_rule(&filename, rule)?,
                Statement::Include { paths, optional } => {
                    let envs: [&dyn Env; 3] = [&self.overrides, &self.vars, &ProcessEnv];
                    let paths = paths.evaluate(&envs);
                    for include in paths.split_whitespace() {
                        if self.depth >= MAX_INCLUDE_DEPTH {
                            bail!("{}: includes nested too deeply at {}", filename, include);
                        }
                        self.depth += 1;
                        let result = trace::scope("include", || self.read_file(include, optional));
                        self.depth -= 1;
                        result?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Expand every rule's commands now that all variables are known.
    fn expand_commands(&mut self) {
        for (id, commands) in std::mem::take(&mut self.pending) {
            let expanded: Vec<graph::Command> = {
                let implicit = RuleImplicitVars {
                    graph: &self.graph,
                    rule: self.graph.rule(id),
                };
                let envs: [&dyn Env; 4] = [&implicit, &self.overrides, &self.vars, &ProcessEnv];
                commands
                    .iter()
                    .map(|cmd| graph::Command {
                        line: cmd.text.evaluate(&envs),
                        silent: cmd.silent,
                        ignore_errors: cmd.ignore_errors,
                    })
                    .filter(|cmd| !cmd.line.trim().is_empty())
                    .collect()
            };
            self.graph.rules[id].commands = expanded;
        }
    }

    fn finish(mut self) -> State {
        self.expand_commands();
        let default = if self.default.is_empty() {
            self.first_target.into_iter().collect()
        } else {
            self.default
        };
        State {
            graph: self.graph,
            default,
            clean: self.clean,
        }
    }
}

/// State loaded by read().
pub struct State {
    pub graph: Graph,
    /// Targets to resolve when none are requested.
    pub default: Vec<FileId>,
    pub clean: Vec<CleanSpec>,
}

/// Load a rule file (and its includes) into a task graph.  `overrides` are
/// `NAME=value` pairs that take precedence over assignments in the file.
pub fn read(path: &str, overrides: &[(String, String)]) -> anyhow::Result<State> {
    let mut loader = Loader::new(overrides);
    trace::scope("loader.read_file", || loader.read_file(path, false))?;
    Ok(loader.finish())
}

/// Parse a single file's content.
#[cfg(test)]
pub fn parse(name: &str, content: &str, overrides: &[(String, String)]) -> anyhow::Result<State> {
    let mut loader = Loader::new(overrides);
    loader.parse(name, content.as_bytes().to_vec())?;
    Ok(loader.finish())
}
