//! The log sink threaded through all pipeline stages.

use std::cell::RefCell;
use std::io::Write;

/// Message severity. Warnings are always printed; notes are suppressed in
/// quiet mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Progress output.
    Note,
    /// A recoverable condition the user should know about.
    Warning,
}

enum Output {
    Stderr,
    Capture(RefCell<String>),
}

/// Destination for progress notes and warnings.
///
/// The pipeline is single-threaded; the sink is shared by reference and
/// writes to stderr (or an in-memory buffer under test).
pub struct LogSink {
    quiet: bool,
    output: Output,
}

impl LogSink {
    /// A sink writing to stderr; `quiet` suppresses notes.
    pub fn stderr(quiet: bool) -> Self {
        Self {
            quiet,
            output: Output::Stderr,
        }
    }

    /// A sink capturing output in memory, for tests.
    pub fn capture() -> Self {
        Self {
            quiet: false,
            output: Output::Capture(RefCell::new(String::new())),
        }
    }

    /// Emits a progress note (multi-line messages allowed; no newline is
    /// appended).
    pub fn note(&self, msg: impl AsRef<str>) {
        if !self.quiet {
            self.emit(msg.as_ref());
        }
    }

    /// Emits a single-line progress note.
    pub fn noteln(&self, msg: impl AsRef<str>) {
        if !self.quiet {
            self.emit(msg.as_ref());
            self.emit("\n");
        }
    }

    /// Emits a warning; never suppressed.
    pub fn warning(&self, msg: impl AsRef<str>) {
        self.emit("warning: ");
        self.emit(msg.as_ref());
        self.emit("\n");
    }

    /// The captured output, if this is a capture sink.
    pub fn captured(&self) -> String {
        match &self.output {
            Output::Capture(buf) => buf.borrow().clone(),
            Output::Stderr => String::new(),
        }
    }

    fn emit(&self, s: &str) {
        match &self.output {
            Output::Stderr => {
                let _ = std::io::stderr().write_all(s.as_bytes());
            }
            Output::Capture(buf) => buf.borrow_mut().push_str(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_collects_notes() {
        let sink = LogSink::capture();
        sink.noteln("seed: 1");
        sink.note("device: 1k\n");
        assert_eq!(sink.captured(), "seed: 1\ndevice: 1k\n");
    }

    #[test]
    fn quiet_suppresses_notes_not_warnings() {
        let mut sink = LogSink::capture();
        sink.quiet = true;
        sink.noteln("progress");
        sink.warning("GB on non-GB pin");
        assert_eq!(sink.captured(), "warning: GB on non-GB pin\n");
    }

    #[test]
    fn stderr_sink_has_no_capture() {
        let sink = LogSink::stderr(true);
        sink.noteln("nothing");
        assert_eq!(sink.captured(), "");
    }
}
