//! Progress and warning reporting for the floe toolchain.
//!
//! Every pipeline stage reports through a [`LogSink`] passed down from the
//! driver: progress notes (placement statistics, routing passes) and
//! warnings. Fatal errors are not reported here; they propagate as
//! [`floe_common::FatalError`] values and the driver prints them.

pub mod position;
pub mod reader;
pub mod sink;

pub use position::LexicalPosition;
pub use reader::LineReader;
pub use sink::{LogSink, Severity};
