//! Scans an input string (rule file) character by character.
//!
//! The scanner works on bytes but only ever stops on ASCII delimiters, so any
//! slice it hands out falls on UTF-8 character boundaries.

#[derive(Debug)]
pub struct ParseError {
    msg: String,
    ofs: usize,
}
pub type ParseResult<T> = Result<T, ParseError>;

impl ParseError {
    pub fn msg(&self) -> &str {
        &self.msg
    }
}

pub struct Scanner<'a> {
    buf: &'a str,
    pub ofs: usize,
    pub line: usize,
}

impl<'a> Scanner<'a> {
    /// The buffer must end with a nul, which marks end of input.
    pub fn new(buf: &'a str) -> Self {
        if !buf.ends_with('\0') {
            panic!("Scanner requires nul-terminated buf");
        }
        Scanner {
            buf,
            ofs: 0,
            line: 1,
        }
    }

    pub fn slice(&self, start: usize, end: usize) -> &'a str {
        &self.buf[start..end]
    }
    /// The unscanned input, including the trailing nul.
    pub fn remaining(&self) -> &'a str {
        &self.buf[self.ofs..]
    }
    pub fn peek(&self) -> char {
        self.buf.as_bytes()[self.ofs] as char
    }
    /// True at the start of a line ending, either "\n" or "\r\n".
    pub fn peek_newline(&self) -> bool {
        match self.peek() {
            '\n' => true,
            '\r' => self.buf.as_bytes().get(self.ofs + 1) == Some(&b'\n'),
            _ => false,
        }
    }
    pub fn next(&mut self) {
        if self.ofs == self.buf.len() - 1 {
            panic!("scanned past end")
        }
        if self.peek() == '\n' {
            self.line += 1;
        }
        self.ofs += 1;
    }
    pub fn back(&mut self) {
        if self.ofs == 0 {
            panic!("back at start")
        }
        self.ofs -= 1;
        if self.peek() == '\n' {
            self.line -= 1;
        }
    }
    /// Reads one char; at end of input returns '\0' without advancing.
    pub fn read(&mut self) -> char {
        let c = self.peek();
        if c != '\0' {
            self.next();
        }
        c
    }
    pub fn skip(&mut self, ch: char) -> bool {
        if self.peek() == ch {
            self.next();
            return true;
        }
        false
    }

    /// Skips spaces and tabs.
    pub fn skip_blanks(&mut self) {
        while self.skip(' ') || self.skip('\t') {}
    }

    /// Consumes a line ending ("\n", "\r\n") or accepts end of input.
    pub fn expect_eol(&mut self) -> ParseResult<()> {
        match self.peek() {
            '\0' => Ok(()),
            '\n' => {
                self.next();
                Ok(())
            }
            '\r' if self.peek_newline() => {
                self.next();
                self.next();
                Ok(())
            }
            c => self.parse_error(format!("expected end of line, got {:?}", c)),
        }
    }

    pub fn expect(&mut self, ch: char) -> ParseResult<()> {
        let r = self.peek();
        if r != ch {
            return self.parse_error(format!("expected {:?}, got {:?}", ch, r));
        }
        self.next();
        Ok(())
    }

    pub fn parse_error<T, S: Into<String>>(&self, msg: S) -> ParseResult<T> {
        Err(ParseError {
            msg: msg.into(),
            ofs: self.ofs,
        })
    }

    pub fn format_parse_error(&self, filename: &str, err: ParseError) -> String {
        let text = &self.buf[..self.buf.len() - 1];
        let mut ofs = 0;
        for (line_number, line) in text.split('\n').enumerate() {
            if ofs + line.len() >= err.ofs {
                let mut msg = format!("parse error: {}\n", err.msg);
                let prefix = format!("{}:{}: ", filename, line_number + 1);
                msg.push_str(&prefix);

                let line = line.trim_end_matches('\r');
                let mut col = err.ofs - ofs;
                let mut context = line;
                if col > 40 {
                    // Trim beginning of line to fit it on screen.
                    msg.push_str("...");
                    context = char_suffix(line, col - 20);
                    col = 3 + (col - (line.len() - context.len()));
                }
                if context.len() > 40 {
                    msg.push_str(char_prefix(context, 40));
                    msg.push_str("...");
                } else {
                    msg.push_str(context);
                }
                msg.push('\n');

                msg.push_str(&" ".repeat(prefix.len() + col));
                msg.push_str("^\n");
                return msg;
            }
            ofs += line.len() + 1;
        }
        format!("parse error: {}\n{}: at end of file\n", err.msg, filename)
    }
}

/// The suffix of s starting at the first char boundary at or after ofs.
fn char_suffix(s: &str, mut ofs: usize) -> &str {
    while !s.is_char_boundary(ofs) {
        ofs += 1;
    }
    &s[ofs..]
}

/// The prefix of s ending at the last char boundary at or before len.
fn char_prefix(s: &str, mut len: usize) -> &str {
    while !s.is_char_boundary(len) {
        len -= 1;
    }
    &s[..len]
}
