//! Source positions for parsed inputs.

use floe_common::FatalError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A `file:line` position in a parsed input, or an internal origin for
/// entities the tool synthesized itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LexicalPosition {
    file: String,
    line: u32,
    internal: bool,
}

impl LexicalPosition {
    /// A position inside `file`, before the first line is read.
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line: 0,
            internal: false,
        }
    }

    /// The position of tool-synthesized entities.
    pub fn internal() -> Self {
        Self {
            file: String::new(),
            line: 0,
            internal: true,
        }
    }

    /// Advances to the next line.
    pub fn next_line(&mut self) {
        self.line += 1;
    }

    /// Current line number (1-based once reading has started).
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Builds a fatal error anchored here.
    pub fn fatal(&self, message: impl Into<String>) -> FatalError {
        FatalError::at(self.to_string(), message)
    }
}

impl fmt::Display for LexicalPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.internal {
            write!(f, "<internal>")
        } else {
            write!(f, "{}:{}", self.file, self.line)
        }
    }
}
