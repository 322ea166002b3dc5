//! Parser for pipeline rule files, a subset of Makefile syntax.
//!
//! To avoid allocations parsing frequently uses references into the input
//! text, marked with the lifetime `'text`.  Nothing is expanded here; the
//! loader decides when each EvalString is evaluated.

use crate::eval::{EvalPart, EvalString};
use crate::scanner::{ParseError, ParseResult, Scanner};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AssignOp {
    /// `=` or `:=`; both expand the value immediately.
    Set,
    /// `?=`
    SetIfUnset,
    /// `+=`
    Append,
}

#[derive(Debug)]
pub struct Assign<'text> {
    pub name: &'text str,
    pub op: AssignOp,
    pub value: EvalString<&'text str>,
}

/// One line of a rule's action.
#[derive(Debug)]
pub struct Command<'text> {
    pub text: EvalString<&'text str>,
    /// `@` prefix: don't echo the line.
    pub silent: bool,
    /// `-` prefix: a non-zero exit of this line doesn't fail the action.
    pub ignore_errors: bool,
}

#[derive(Debug)]
pub struct Rule<'text> {
    pub line: usize,
    pub targets: EvalString<&'text str>,
    pub prereqs: EvalString<&'text str>,
    pub commands: Vec<Command<'text>>,
}

#[derive(Debug)]
pub enum Statement<'text> {
    Assign(Assign<'text>),
    Rule(Rule<'text>),
    Include {
        paths: EvalString<&'text str>,
        /// `-include`: missing files are not an error.
        optional: bool,
    },
}

/// How line continuations and comments are treated while reading an
/// EvalString.
#[derive(Clone, Copy, PartialEq)]
enum Mode {
    /// Rule and assignment lines: `#` starts a comment, a backslash-newline
    /// becomes a single space.
    Line,
    /// Command lines go to the shell as written: `#` is kept, and a
    /// backslash-newline is kept with the next line's leading tab dropped.
    Command,
}

/// What separates the head of a line from the rest of it.
#[derive(Debug, PartialEq)]
enum Separator {
    Colon,
    Assign,
    None,
}

pub struct Parser<'text> {
    scanner: Scanner<'text>,
}

// 256-entry lookup table bitmap encoded as 4 64-bit integers.
type Bitmap = [u64; 4];

/// Returns a (index, mask) tuple for testing/setting the n-th bit in a bitmap.
#[inline(always)]
const fn bitmap_index_and_mask(c: u8) -> (usize, u64) {
    let index = c as usize >> 6;
    let mask = 1u64 << (c & 63);
    (index, mask)
}

/// Characters allowed in variable names.
const fn is_ident_char_baseline(c: u8) -> bool {
    matches!(c as char, 'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '-' | '.')
}

const fn ident_char_bitmap() -> Bitmap {
    let mut bitmap = [0u64; 4];
    let mut c = 0u8;
    loop {
        if is_ident_char_baseline(c) {
            let (index, mask) = bitmap_index_and_mask(c);
            bitmap[index] |= mask;
        }
        match c {
            u8::MAX => break,
            _ => c += 1,
        }
    }
    bitmap
}

fn is_ident_char(c: u8) -> bool {
    const BITMAP: Bitmap = ident_char_bitmap();
    let (index, mask) = bitmap_index_and_mask(c);
    (BITMAP[index] & mask) != 0
}

/// Looks ahead over the current logical line (following continuations) for
/// the first unnested `:` or `=`, without consuming anything.
fn find_separator(text: &str) -> Separator {
    let bytes = text.as_bytes();
    let mut depth = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\0' | b'\n' => break,
            b'#' if depth == 0 => break,
            b'\\' => i += 1,
            b'$' => {
                if matches!(bytes.get(i + 1), Some(b'(') | Some(b'{')) {
                    depth += 1;
                    i += 1;
                } else {
                    // "$$", "$@" and friends are never separators.
                    i += 1;
                }
            }
            b')' | b'}' if depth > 0 => depth -= 1,
            b':' if depth == 0 => {
                return match bytes.get(i + 1) {
                    Some(b'=') => Separator::Assign,
                    Some(b':') if bytes.get(i + 2) == Some(&b'=') => Separator::Assign,
                    _ => Separator::Colon,
                };
            }
            b'=' if depth == 0 => return Separator::Assign,
            _ => {}
        }
        i += 1;
    }
    Separator::None
}

/// If the line is an include directive, returns (keyword length, optional).
fn include_keyword(text: &str) -> Option<(usize, bool)> {
    for &(keyword, optional) in &[("include", false), ("-include", true), ("sinclude", true)] {
        if let Some(rest) = text.strip_prefix(keyword) {
            if rest.starts_with(' ') || rest.starts_with('\t') {
                return Some((keyword.len(), optional));
            }
        }
    }
    None
}

impl<'text> Parser<'text> {
    /// The buffer must be nul-terminated, see Scanner::new.
    pub fn new(buf: &'text str) -> Parser<'text> {
        Parser {
            scanner: Scanner::new(buf),
        }
    }

    pub fn format_parse_error(&self, filename: &str, err: ParseError) -> String {
        self.scanner.format_parse_error(filename, err)
    }

    pub fn read(&mut self) -> ParseResult<Option<Statement<'text>>> {
        loop {
            match self.scanner.peek() {
                '\0' => return Ok(None),
                '\n' | '\r' => self.scanner.expect_eol()?,
                '#' => self.skip_comment(),
                ' ' => self.scanner.skip_blanks(),
                '\t' => return self.scanner.parse_error("command line outside of a rule"),
                _ => return self.read_statement().map(Some),
            }
        }
    }

    fn read_statement(&mut self) -> ParseResult<Statement<'text>> {
        let rest = self.scanner.remaining();
        match find_separator(rest) {
            Separator::Assign => Ok(Statement::Assign(self.read_assign()?)),
            Separator::Colon => Ok(Statement::Rule(self.read_rule()?)),
            Separator::None => match include_keyword(rest) {
                Some((len, optional)) => {
                    for _ in 0..len {
                        self.scanner.next();
                    }
                    self.scanner.skip_blanks();
                    let paths = self.read_eval(&[], Mode::Line)?;
                    self.scanner.expect_eol()?;
                    Ok(Statement::Include { paths, optional })
                }
                None => self.scanner.parse_error("missing separator"),
            },
        }
    }

    fn read_assign(&mut self) -> ParseResult<Assign<'text>> {
        let name = self.read_ident()?;
        self.scanner.skip_blanks();
        let op = match self.scanner.read() {
            '=' => AssignOp::Set,
            ':' => {
                self.scanner.skip(':');
                self.scanner.expect('=')?;
                AssignOp::Set
            }
            '?' => {
                self.scanner.expect('=')?;
                AssignOp::SetIfUnset
            }
            '+' => {
                self.scanner.expect('=')?;
                AssignOp::Append
            }
            c => {
                self.scanner.back();
                return self
                    .scanner
                    .parse_error(format!("expected assignment, got {:?}", c));
            }
        };
        self.scanner.skip_blanks();
        let value = self.read_eval(&[], Mode::Line)?;
        self.scanner.expect_eol()?;
        Ok(Assign { name, op, value })
    }

    fn read_rule(&mut self) -> ParseResult<Rule<'text>> {
        let line = self.scanner.line;
        let targets = self.read_eval(&[':'], Mode::Line)?;
        if targets.is_empty() {
            return self.scanner.parse_error("missing target");
        }
        self.scanner.expect(':')?;
        if self.scanner.peek() == ':' {
            return self
                .scanner
                .parse_error("double-colon rules are not supported");
        }
        self.scanner.skip_blanks();
        let prereqs = self.read_eval(&[';'], Mode::Line)?;

        let mut commands = Vec::new();
        if self.scanner.skip(';') {
            self.push_command(&mut commands)?;
        }
        self.scanner.expect_eol()?;

        loop {
            match self.scanner.peek() {
                '\t' => {
                    self.scanner.next();
                    self.push_command(&mut commands)?;
                    self.scanner.expect_eol()?;
                }
                // Blank and comment lines don't end a recipe.
                '\n' | '\r' if self.scanner.peek_newline() => self.scanner.expect_eol()?,
                '#' => self.skip_comment(),
                _ => break,
            }
        }

        Ok(Rule {
            line,
            targets,
            prereqs,
            commands,
        })
    }

    fn push_command(&mut self, commands: &mut Vec<Command<'text>>) -> ParseResult<()> {
        let mut silent = false;
        let mut ignore_errors = false;
        loop {
            self.scanner.skip_blanks();
            match self.scanner.peek() {
                '@' => silent = true,
                '-' => ignore_errors = true,
                '+' => {}
                _ => break,
            }
            self.scanner.next();
        }
        let text = self.read_eval(&[], Mode::Command)?;
        if !text.is_empty() {
            commands.push(Command {
                text,
                silent,
                ignore_errors,
            });
        }
        Ok(())
    }

    fn skip_comment(&mut self) {
        loop {
            match self.scanner.read() {
                '\0' | '\n' => return,
                _ => {}
            }
        }
    }

    fn read_ident(&mut self) -> ParseResult<&'text str> {
        let start = self.scanner.ofs;
        while is_ident_char(self.scanner.peek() as u8) {
            self.scanner.next();
        }
        let end = self.scanner.ofs;
        if end == start {
            return self.scanner.parse_error("failed to scan ident");
        }
        Ok(self.scanner.slice(start, end))
    }

    /// Reads up to the end of the (logical) line or one of the stop chars,
    /// neither of which is consumed.
    fn read_eval(&mut self, stop: &[char], mode: Mode) -> ParseResult<EvalString<&'text str>> {
        let mut parts = Vec::new();
        let mut ofs = self.scanner.ofs;
        loop {
            let c = self.scanner.peek();
            if c == '\0' || self.scanner.peek_newline() || stop.contains(&c) {
                break;
            }
            match c {
                '#' if mode == Mode::Line => {
                    self.push_literal(&mut parts, ofs);
                    while !(self.scanner.peek() == '\0' || self.scanner.peek_newline()) {
                        self.scanner.next();
                    }
                    ofs = self.scanner.ofs;
                    break;
                }
                '$' => {
                    self.push_literal(&mut parts, ofs);
                    self.scanner.next();
                    parts.push(self.read_escape()?);
                    ofs = self.scanner.ofs;
                }
                '\\' => {
                    self.scanner.next();
                    if self.scanner.peek_newline() {
                        match mode {
                            Mode::Line => {
                                self.push_literal_until(&mut parts, ofs, self.scanner.ofs - 1);
                                trim_trailing_blanks(&mut parts);
                                parts.push(EvalPart::Literal(" "));
                                self.scanner.expect_eol()?;
                                self.scanner.skip_blanks();
                            }
                            Mode::Command => {
                                self.scanner.expect_eol()?;
                                self.push_literal(&mut parts, ofs);
                                self.scanner.skip('\t');
                            }
                        }
                        ofs = self.scanner.ofs;
                    } else if mode == Mode::Line && self.scanner.peek() == '#' {
                        self.push_literal_until(&mut parts, ofs, self.scanner.ofs - 1);
                        parts.push(EvalPart::Literal("#"));
                        self.scanner.next();
                        ofs = self.scanner.ofs;
                    }
                }
                _ => self.scanner.next(),
            }
        }
        self.push_literal(&mut parts, ofs);
        if mode == Mode::Line {
            trim_trailing_blanks(&mut parts);
        }
        Ok(EvalString::new(parts))
    }

    fn push_literal(&self, parts: &mut Vec<EvalPart<&'text str>>, start: usize) {
        self.push_literal_until(parts, start, self.scanner.ofs);
    }

    fn push_literal_until(&self, parts: &mut Vec<EvalPart<&'text str>>, start: usize, end: usize) {
        if end > start {
            parts.push(EvalPart::Literal(self.scanner.slice(start, end)));
        }
    }

    /// Reads the part of a `$` reference after the `$`.
    fn read_escape(&mut self) -> ParseResult<EvalPart<&'text str>> {
        let c = self.scanner.peek();
        let close = match c {
            '$' => {
                self.scanner.next();
                return Ok(EvalPart::Literal("$"));
            }
            '(' => ')',
            '{' => '}',
            '@' | '<' | '^' => {
                let start = self.scanner.ofs;
                self.scanner.next();
                return Ok(EvalPart::VarRef(self.scanner.slice(start, start + 1)));
            }
            c if c.is_ascii_alphanumeric() || c == '_' => {
                // Like make, "$FOO" is "$(F)" followed by "OO".
                let start = self.scanner.ofs;
                self.scanner.next();
                return Ok(EvalPart::VarRef(self.scanner.slice(start, start + 1)));
            }
            c => return self.scanner.parse_error(format!("bad $-escape {:?}", c)),
        };
        self.scanner.next();
        let start = self.scanner.ofs;
        loop {
            match self.scanner.peek() {
                c if c == close => break,
                '\0' | '\n' => return self.scanner.parse_error("unterminated variable reference"),
                '$' => {
                    return self
                        .scanner
                        .parse_error("nested variable references are not supported")
                }
                _ => self.scanner.next(),
            }
        }
        let name = self.scanner.slice(start, self.scanner.ofs).trim();
        if name.is_empty() {
            return self.scanner.parse_error("empty variable name");
        }
        if name.contains(char::is_whitespace) {
            return self
                .scanner
                .parse_error(format!("functions are not supported: {:?}", name));
        }
        if name.contains(&[':', '=', '%'][..]) {
            return self.scanner.parse_error(format!(
                "substitution references are not supported: {:?}",
                name
            ));
        }
        self.scanner.next();
        Ok(EvalPart::VarRef(name))
    }
}

fn trim_trailing_blanks(parts: &mut Vec<EvalPart<&str>>) {
    while let Some(EvalPart::Literal(last)) = parts.last_mut() {
        let current: &str = *last;
        let trimmed = current.trim_end_matches(&[' ', '\t'][..]);
        if !trimmed.is_empty() {
            *last = trimmed;
            return;
        }
        parts.pop();
    }
}
