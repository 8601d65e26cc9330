//! Estimate the progress of a long-running analysis tool from the console output it writes.
//!
//! A [`ToolRun`] re-reads a tool's console output file on each poll and reports an overall
//! completion percentage, the tool's version banner, and the first error it printed. What
//! the output of a particular tool looks like is described by a [`ConsoleFormat`], of which
//! DIA-NN and TopPIC are built in.
pub mod accumulator;
pub mod classify;
pub mod format;
pub mod io;
pub mod phase;
pub mod run;

pub use crate::accumulator::ProgressAccumulator;
pub use crate::classify::{LineCategory, LineClassifier, ProgressSample};
pub use crate::format::{ConsoleFormat, FormatError, KnownFormat};
pub use crate::phase::{Phase, PhaseTable, Signature};
pub use crate::run::{ProgressSnapshot, ToolRun};
