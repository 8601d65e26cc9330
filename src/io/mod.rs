//! Reading, trimming and scheduling reads of console output files.
mod reader;
mod schedule;
mod trim;

pub use crate::io::reader::{
    indexed_console_lines, split_console_lines, ConsoleOutputError, ConsoleOutputReader,
};
pub use crate::io::schedule::{PollSchedule, DEFAULT_POLL_INTERVAL};
pub use crate::io::trim::{ConsoleOutputTrimmer, TrimError, TrimSummary};
