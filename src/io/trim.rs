//! Shrink a finished console output file by collapsing repeated progress lines.
//!
//! Tools such as TopPIC print a `... processing N of M spectra.` line for every few
//! spectra. Only the first and last line of each uninterrupted run of progress lines
//! for the same task are kept.
use std::{
    io::{self, prelude::*},
    path,
};

use log::{debug, info};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::classify::LineClassifier;

use super::reader::{split_console_lines, ConsoleOutputError, ConsoleOutputReader};

#[derive(Debug, Error)]
pub enum TrimError {
    #[error("Failed to read the console output: {0}")]
    Read(
        #[from]
        #[source]
        ConsoleOutputError,
    ),
    #[error("Failed to write the trimmed console output: {0}")]
    IOError(
        #[from]
        #[source]
        io::Error,
    ),
}

/// Line counts before and after trimming
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TrimSummary {
    pub lines_read: usize,
    pub lines_kept: usize,
}

impl TrimSummary {
    pub fn lines_removed(&self) -> usize {
        self.lines_read - self.lines_kept
    }
}

/// Collapses runs of progress lines, using a [`LineClassifier`] to recognize them
pub struct ConsoleOutputTrimmer<'a> {
    classifier: &'a LineClassifier,
}

impl<'a> ConsoleOutputTrimmer<'a> {
    pub fn new(classifier: &'a LineClassifier) -> Self {
        Self { classifier }
    }

    /// Return the lines of `text` that survive trimming, in order
    pub fn trim_lines<'t>(&self, text: &'t str) -> (Vec<&'t str>, usize) {
        let mut kept = Vec::new();
        let mut lines_read = 0;
        let mut run_key: Option<&str> = None;
        let mut pending_last: Option<&str> = None;

        for line in split_console_lines(text) {
            lines_read += 1;
            let key = self.classifier.progress_key(line);
            match key {
                Some(key) if run_key == Some(key) => {
                    pending_last = Some(line);
                }
                _ => {
                    if let Some(last) = pending_last.take() {
                        kept.push(last);
                    }
                    run_key = key;
                    kept.push(line);
                }
            }
        }
        if let Some(last) = pending_last.take() {
            kept.push(last);
        }
        (kept, lines_read)
    }

    /// Trim the console output file at `path` in place.
    ///
    /// The file is only rewritten if at least one line was removed. The trimmed text is
    /// written to a temporary file in the same directory, which is renamed over `path`
    /// on success and removed on failure. Rewritten files always use `\n` line endings.
    pub fn trim_file<P: AsRef<path::Path>>(&self, path: P) -> Result<TrimSummary, TrimError> {
        let path = path.as_ref();
        let text = ConsoleOutputReader::open_path(path)?.read_text(true)?;
        let (kept, lines_read) = self.trim_lines(&text);
        let summary = TrimSummary {
            lines_read,
            lines_kept: kept.len(),
        };
        if summary.lines_removed() == 0 {
            debug!("Nothing to trim in {}", path.display());
            return Ok(summary);
        }

        let directory = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => path::Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(directory)?;
        {
            let mut writer = io::BufWriter::new(tmp.as_file_mut());
            for line in kept {
                writeln!(writer, "{line}")?;
            }
            writer.flush()?;
        }
        tmp.persist(path).map_err(|e| e.error)?;
        info!(
            "Trimmed {} of {} lines from {}",
            summary.lines_removed(),
            summary.lines_read,
            path.display()
        );
        Ok(summary)
    }
}
