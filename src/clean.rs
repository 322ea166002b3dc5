//! Deletes generated files matching configured (directory, pattern) pairs.

use anyhow::{anyhow, bail};
use std::path::{Path, PathBuf};

/// One entry of the clean list: files directly inside `root` whose names
/// match `pattern` are deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanSpec {
    pub root: PathBuf,
    pub pattern: String,
}

fn has_glob_chars(s: &str) -> bool {
    s.contains(|c: char| matches!(c, '*' | '?' | '['))
}

impl CleanSpec {
    /// Split a word like "data/*.db" at its last slash.
    pub fn parse(word: &str) -> anyhow::Result<CleanSpec> {
        let (root, pattern) = match word.rfind('/') {
            Some(0) => ("/", &word[1..]),
            Some(i) => (&word[..i], &word[i + 1..]),
            None => (".", word),
        };
        if pattern.is_empty() {
            bail!("clean pattern {:?} names a directory, not files", word);
        }
        if has_glob_chars(root) {
            bail!(
                "clean pattern {:?}: wildcards are only allowed in the last path component",
                word
            );
        }
        Ok(CleanSpec {
            root: PathBuf::from(root),
            pattern: pattern.to_string(),
        })
    }
}

/// Matches a `[...]` class at the start of pattern against c.  Returns whether
/// it matched and the pattern remaining after the class, or None if the class
/// is unterminated (in which case '[' is literal).
fn match_class(pattern: &[char], c: char) -> Option<(bool, &[char])> {
    let mut i = 1;
    let negate = matches!(pattern.get(i), Some('!') | Some('^'));
    if negate {
        i += 1;
    }
    let mut matched = false;
    let mut first = true;
    while let Some(&p) = pattern.get(i) {
        if p == ']' && !first {
            return Some((matched != negate, &pattern[i + 1..]));
        }
        first = false;
        if pattern.get(i + 1) == Some(&'-') && pattern.get(i + 2).map_or(false, |&e| e != ']') {
            let end = pattern[i + 2];
            if p <= c && c <= end {
                matched = true;
            }
            i += 3;
        } else {
            if p == c {
                matched = true;
            }
            i += 1;
        }
    }
    None
}

fn glob_match_chars(pattern: &[char], name: &[char]) -> bool {
    match pattern.first() {
        None => name.is_empty(),
        Some('*') => {
            // Try every split point; the pattern has few stars in practice.
            (0..=name.len()).any(|skip| glob_match_chars(&pattern[1..], &name[skip..]))
        }
        Some('?') => !name.is_empty() && glob_match_chars(&pattern[1..], &name[1..]),
        Some('[') => match name.first() {
            None => false,
            Some(&c) => match match_class(pattern, c) {
                Some((true, rest)) => glob_match_chars(rest, &name[1..]),
                Some((false, _)) => false,
                None => c == '[' && glob_match_chars(&pattern[1..], &name[1..]),
            },
        },
        Some(&p) => name.first() == Some(&p) && glob_match_chars(&pattern[1..], &name[1..]),
    }
}

/// Shell-style wildcard match of a single file name: `*`, `?`, and `[...]`
/// classes.  As in the shell, a leading dot must be matched explicitly.
pub fn glob_match(pattern: &str, name: &str) -> bool {
    if name.starts_with('.') && !pattern.starts_with('.') {
        return false;
    }
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    glob_match_chars(&pattern, &name)
}

fn remove(path: &Path) -> anyhow::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(anyhow!("remove {}: {}", path.display(), err)),
    }
}

/// Delete every existing file matching one of the specs, returning how many
/// were removed.  Missing directories and files are not errors.
pub fn clean(specs: &[CleanSpec]) -> anyhow::Result<usize> {
    let mut removed = 0;
    for spec in specs {
        let entries = match std::fs::read_dir(&spec.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(root = %spec.root.display(), "clean: no such directory");
                continue;
            }
            Err(err) => bail!("read {}: {}", spec.root.display(), err),
        };
        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let name = match name.to_str() {
                Some(name) => name,
                None => continue,
            };
            if !glob_match(&spec.pattern, name) {
                continue;
            }
            if entry.file_type()?.is_dir() {
                tracing::warn!(path = %entry.path().display(), "clean: skipping directory");
                continue;
            }
            paths.push(entry.path());
        }
        paths.sort();
        for path in paths {
            if remove(&path)? {
                tracing::debug!(path = %path.display(), "clean: removed");
                removed += 1;
            }
        }
    }
    Ok(removed)
}
