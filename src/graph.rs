//! The task graph, a graph between artifacts (files) and the rules that
//! produce them.

use crate::canon::canon_path;
use crate::densemap::{self, DenseMap};
use crate::fs::MTime;
use rustc_hash::FxHashMap;

/// Id for File nodes in the Graph.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct FileId(u32);
impl densemap::Index for FileId {
    fn index(&self) -> usize {
        self.0 as usize
    }
}
impl From<usize> for FileId {
    fn from(u: usize) -> FileId {
        FileId(u as u32)
    }
}

/// Id for Rule nodes in the Graph.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct RuleId(u32);
impl densemap::Index for RuleId {
    fn index(&self) -> usize {
        self.0 as usize
    }
}
impl From<usize> for RuleId {
    fn from(u: usize) -> RuleId {
        RuleId(u as u32)
    }
}

/// A single file referenced as part of a rule.
#[derive(Debug)]
pub struct File {
    /// Canonical path to the file.
    pub name: String,
    /// The Rule that generates this file, if any.
    pub input: Option<RuleId>,
    /// The Rules that depend on this file as a prerequisite.
    pub dependents: Vec<RuleId>,
    /// Declared with .PHONY: never a file on disk.
    pub phony: bool,
}

/// A textual location within a rule file, used in error messages.
#[derive(Debug, Clone)]
pub struct FileLoc {
    pub filename: std::rc::Rc<String>,
    pub line: usize,
}
impl std::fmt::Display for FileLoc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{}:{}", self.filename, self.line)
    }
}

/// One fully expanded line of a rule's action.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub line: String,
    pub silent: bool,
    pub ignore_errors: bool,
}

/// A rule: the target it produces, the prerequisites it needs, and the action
/// producing the target.
#[derive(Debug)]
pub struct Rule {
    pub location: FileLoc,
    pub target: FileId,
    /// Prerequisites in declared order, without duplicates.
    pub prereqs: Vec<FileId>,
    /// Empty for aggregate rules like `all: a b`.
    pub commands: Vec<Command>,
}

impl Rule {
    pub fn is_aggregate(&self) -> bool {
        self.commands.is_empty()
    }
}

/// The task graph: every known file and every rule.
#[derive(Default)]
pub struct Graph {
    pub files: DenseMap<FileId, File>,
    pub rules: DenseMap<RuleId, Rule>,
    file_to_id: FxHashMap<String, FileId>,
}

impl Graph {
    pub fn new() -> Graph {
        Graph::default()
    }

    /// Look up or intern a file by (not yet canonicalized) name.
    pub fn file_id(&mut self, name: impl Into<String>) -> FileId {
        let canon = canon_path(name);
        match self.file_to_id.get(&canon) {
            Some(id) => *id,
            None => {
                let id = self.files.push(File {
                    name: canon.clone(),
                    input: None,
                    dependents: Vec::new(),
                    phony: false,
                });
                self.file_to_id.insert(canon, id);
                id
            }
        }
    }

    /// Look up a file by name without interning it.
    pub fn lookup(&self, name: &str) -> Option<FileId> {
        self.file_to_id.get(&canon_path(name)).copied()
    }

    pub fn file(&self, id: FileId) -> &File {
        &self.files[id]
    }

    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id]
    }

    pub fn mark_phony(&mut self, id: FileId) {
        self.files[id].phony = true;
    }

    /// Add a rule, linking it to its target and prerequisites.  A file can be
    /// the target of at most one rule.
    pub fn add_rule(&mut self, rule: Rule) -> anyhow::Result<RuleId> {
        let target = &self.files[rule.target];
        if let Some(prev) = target.input {
            anyhow::bail!(
                "{}: conflicting rules for {:?}, already defined at {}",
                rule.location,
                target.name,
                self.rules[prev].location
            );
        }
        let id = self.rules.next_id();
        for &prereq in &rule.prereqs {
            self.files[prereq].dependents.push(id);
        }
        self.files[rule.target].input = Some(id);
        Ok(self.rules.push(rule))
    }

    /// The rules producing a rule's prerequisites, in declared order.
    pub fn prereq_rules(&self, id: RuleId) -> impl Iterator<Item = RuleId> + '_ {
        self.rules[id]
            .prereqs
            .iter()
            .filter_map(move |&prereq| self.files[prereq].input)
    }

    /// Names of all targets that have a rule, in definition order.
    pub fn targets(&self) -> impl Iterator<Item = &str> + '_ {
        self.rules
            .iter()
            .map(move |(_, rule)| self.files[rule.target].name.as_str())
    }
}

/// An artifact as observed on disk after resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub path: String,
    pub mtime: MTime,
}

impl Artifact {
    pub fn exists(&self) -> bool {
        self.mtime != MTime::Missing
    }
}
