//! Line-oriented reading shared by the BLIF, PCF and chipdb text parsers.
//!
//! Handles `#` comments, trailing-backslash continuation, blank-line
//! skipping and whitespace tokenization with double-quoted strings.
//! Quoted tokens keep their surrounding quotes so parsers can distinguish
//! string constants from binary digit strings.

use crate::position::LexicalPosition;
use floe_common::{FatalError, Result};

/// Reads logical lines from an in-memory input, tracking the position.
pub struct LineReader<'a> {
    lines: std::str::Lines<'a>,
    /// Position of the most recently read line.
    pub pos: LexicalPosition,
    /// The current logical line, comments stripped, continuations joined.
    pub line: String,
    /// The current line split into tokens.
    pub words: Vec<String>,
    done: bool,
}

impl<'a> LineReader<'a> {
    /// Creates a reader over `text`, reporting positions against `file`.
    pub fn new(file: impl Into<String>, text: &'a str) -> Self {
        Self {
            lines: text.lines(),
            pos: LexicalPosition::new(file),
            line: String::new(),
            words: Vec::new(),
            done: false,
        }
    }

    /// Returns `true` once the input is exhausted.
    pub fn eof(&self) -> bool {
        self.done
    }

    /// Reads the next non-blank logical line into `line`/`words`.
    ///
    /// At end of input, `words` is left empty and `eof()` turns true.
    pub fn read_line(&mut self) -> Result<()> {
        self.words.clear();
        loop {
            self.line.clear();
            let Some(raw) = self.lines.next() else {
                self.done = true;
                return Ok(());
            };
            self.pos.next_line();
            self.line.push_str(raw);

            loop {
                if let Some(p) = self.line.find('#') {
                    self.line.truncate(p);
                } else if self.line.ends_with('\\') {
                    let Some(cont) = self.lines.next() else {
                        return Err(self.pos.fatal("unexpected backslash before eof"));
                    };
                    self.pos.next_line();
                    self.line.pop();
                    self.line.push_str(cont);
                    continue;
                }
                break;
            }

            self.split_line()?;
            if !self.words.is_empty() {
                return Ok(());
            }
        }
    }

    fn split_line(&mut self) -> Result<()> {
        self.words.clear();
        let mut t = String::new();
        let mut instr = false;
        let mut quote = false;

        for ch in self.line.chars() {
            if instr {
                if quote {
                    t.push(ch);
                    quote = false;
                } else if ch == '\\' {
                    quote = true;
                } else {
                    t.push(ch);
                    if ch == '"' {
                        self.words.push(std::mem::take(&mut t));
                        instr = false;
                    }
                }
            } else if ch.is_whitespace() {
                if !t.is_empty() {
                    self.words.push(std::mem::take(&mut t));
                }
            } else {
                t.push(ch);
                if ch == '"' {
                    instr = true;
                }
            }
        }
        if instr {
            return Err(self.pos.fatal("unterminated string constant"));
        }
        if !t.is_empty() {
            self.words.push(t);
        }
        Ok(())
    }

    /// Builds a fatal error at the current position.
    pub fn fatal(&self, msg: impl Into<String>) -> FatalError {
        self.pos.fatal(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words_of(text: &str) -> Vec<Vec<String>> {
        let mut r = LineReader::new("t", text);
        let mut out = Vec::new();
        loop {
            r.read_line().unwrap();
            if r.eof() {
                break;
            }
            out.push(r.words.clone());
        }
        out
    }

    #[test]
    fn skips_blank_lines_and_comments() {
        let lines = words_of("a b\n\n# whole comment\nc # tail\n");
        assert_eq!(lines, vec![vec!["a", "b"], vec!["c"]]);
    }

    #[test]
    fn joins_continuation_lines() {
        let lines = words_of("a \\\nb c\n");
        assert_eq!(lines, vec![vec!["a", "b", "c"]]);
    }

    #[test]
    fn quoted_tokens_keep_quotes() {
        let lines = words_of(".param NAME \"a b\"\n");
        assert_eq!(lines, vec![vec![".param", "NAME", "\"a b\""]]);
    }

    #[test]
    fn escapes_inside_strings() {
        let lines = words_of("x \"a\\\"b\"\n");
        assert_eq!(lines[0][1], "\"a\"b\"");
    }

    #[test]
    fn unterminated_string_is_error() {
        let mut r = LineReader::new("t", "x \"abc\n");
        assert!(r.read_line().is_err());
    }

    #[test]
    fn dangling_backslash_is_error() {
        let mut r = LineReader::new("t", "x \\");
        assert!(r.read_line().is_err());
    }

    #[test]
    fn position_tracks_lines() {
        let mut r = LineReader::new("f.blif", "a\nb\n");
        r.read_line().unwrap();
        assert_eq!(r.pos.to_string(), "f.blif:1");
        r.read_line().unwrap();
        assert_eq!(r.pos.to_string(), "f.blif:2");
    }
}
