//! Represents parsed rule-file strings with embedded variable references, e.g.
//! `sqlite3 $@ < $(SCHEMA)`, and mechanisms for expanding those into plain
//! strings.

use rustc_hash::FxHashMap;
use std::borrow::Cow;

/// An environment providing a mapping of variable name to variable value.
/// A given EvalString may be expanded against multiple environments, which are
/// consulted in order.
pub trait Env {
    fn get_var(&self, var: &str) -> Option<Cow<str>>;
}

/// One token within an EvalString, either literal text or a variable reference.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalPart<T: AsRef<str>> {
    Literal(T),
    VarRef(T),
}

/// A parsed but unexpanded variable-reference string, e.g. "cp $< $@".
/// This is generic to support EvalString<&str>, which is used for immediately-
/// expanded evals like rule lines, and EvalString<String>, which is used for
/// command lines that are expanded once the whole file is loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalString<T: AsRef<str>>(Vec<EvalPart<T>>);
impl<T: AsRef<str>> EvalString<T> {
    pub fn new(parts: Vec<EvalPart<T>>) -> Self {
        EvalString(parts)
    }

    /// Expands the string, looking up each variable in the first Env that has
    /// it.  Variables no Env knows about expand to nothing.
    pub fn evaluate(&self, envs: &[&dyn Env]) -> String {
        let mut val = String::new();
        for part in &self.0 {
            match part {
                EvalPart::Literal(s) => val.push_str(s.as_ref()),
                EvalPart::VarRef(v) => {
                    if let Some(value) = envs.iter().find_map(|env| env.get_var(v.as_ref())) {
                        val.push_str(&value);
                    }
                }
            }
        }
        val
    }

    pub fn parts(&self) -> &[EvalPart<T>] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|part| match part {
            EvalPart::Literal(s) => s.as_ref().is_empty(),
            EvalPart::VarRef(_) => false,
        })
    }
}

impl EvalString<&str> {
    pub fn into_owned(self) -> EvalString<String> {
        EvalString(
            self.0
                .into_iter()
                .map(|part| match part {
                    EvalPart::Literal(s) => EvalPart::Literal(s.to_owned()),
                    EvalPart::VarRef(s) => EvalPart::VarRef(s.to_owned()),
                })
                .collect(),
        )
    }
}

/// A variable environment built from `NAME = value` assignments.
#[derive(Debug, Default)]
pub struct Vars(FxHashMap<String, String>);
impl Vars {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn insert(&mut self, key: String, val: String) {
        self.0.insert(key, val);
    }
    pub fn get(&self, key: &str) -> Option<&String> {
        self.0.get(key)
    }
}
impl Env for Vars {
    fn get_var(&self, var: &str) -> Option<Cow<str>> {
        self.0.get(var).map(|val| Cow::Borrowed(val.as_str()))
    }
}

/// Falls back to the process environment, like make does.
pub struct ProcessEnv;
impl Env for ProcessEnv {
    fn get_var(&self, var: &str) -> Option<Cow<str>> {
        std::env::var(var).ok().map(Cow::Owned)
    }
}
