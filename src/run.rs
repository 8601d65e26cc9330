//! Track one invocation of an external tool through its console output.
use std::path;

use chrono::TimeDelta;
use log::{debug, warn};

use crate::accumulator::ProgressAccumulator;
use crate::classify::LineClassifier;
use crate::format::{ConsoleFormat, FormatError};
use crate::io::{indexed_console_lines, ConsoleOutputError, ConsoleOutputReader};

/// A read-only copy of what is known about a [`ToolRun`], for status reporting
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSnapshot {
    pub progress: f32,
    pub tool_version: String,
    pub error_message: String,
    pub current_phase: Option<String>,
    pub elapsed: Option<TimeDelta>,
}

/**
One invocation of an external tool, followed through the console output file it writes.

Call [`ToolRun::poll`] periodically while the tool runs and [`ToolRun::finalize`] once
after it exits. Each poll re-parses the whole file. Parsing is best-effort: a missing
or unreadable file leaves the previous state untouched, and nothing here ever fails
the run. The tool version and the first error line are kept once detected, even if a
later poll cannot see them.
*/
#[derive(Debug, Clone)]
pub struct ToolRun {
    console_output_path: path::PathBuf,
    classifier: LineClassifier,
    tool_version: String,
    progress: f32,
    error_message: String,
    current_phase: Option<String>,
    elapsed: Option<TimeDelta>,
    /// 0 is quiet. At 2 and above, skipped polls and ignored error lines are logged.
    pub debug_level: u8,
    poll_count: usize,
}

impl ToolRun {
    pub fn new<P: Into<path::PathBuf>>(
        console_output_path: P,
        format: ConsoleFormat,
    ) -> Result<Self, FormatError> {
        let classifier = LineClassifier::new(format)?;
        Ok(Self {
            console_output_path: console_output_path.into(),
            classifier,
            tool_version: String::new(),
            progress: 0.0,
            error_message: String::new(),
            current_phase: None,
            elapsed: None,
            debug_level: 1,
            poll_count: 0,
        })
    }

    /// Track the format's default console output file inside `working_directory`
    pub fn in_directory<P: AsRef<path::Path>>(
        working_directory: P,
        format: ConsoleFormat,
    ) -> Result<Self, FormatError> {
        let path = format.console_output_path(working_directory);
        Self::new(path, format)
    }

    pub fn with_debug_level(mut self, debug_level: u8) -> Self {
        self.debug_level = debug_level;
        self
    }

    /// Re-parse the console output written so far
    pub fn poll(&mut self) {
        self.poll_count += 1;
        self.read_and_parse(false)
    }

    /// Parse the console output one last time after the tool exited, including a final
    /// line with no line terminator
    pub fn finalize(&mut self) {
        self.poll_count += 1;
        self.read_and_parse(true)
    }

    fn read_and_parse(&mut self, include_partial: bool) {
        let text = ConsoleOutputReader::open_path(&self.console_output_path)
            .and_then(|mut reader| reader.read_text(include_partial));
        match text {
            Ok(text) => self.parse_text(&text),
            Err(ConsoleOutputError::NotFound(path)) => {
                if self.debug_level >= 2 {
                    debug!("Console output file not found: {}", path.display());
                }
            }
            Err(err) => {
                if self.debug_level >= 2 {
                    debug!(
                        "Error parsing console output file {}: {err}",
                        self.console_output_path.display()
                    );
                }
            }
        }
    }

    /// Parse console output text, replacing the derived progress.
    ///
    /// Carriage-return redraws count as one line for the version banner window.
    pub fn parse_text(&mut self, text: &str) {
        self.parse_indexed_lines(indexed_console_lines(text))
    }

    /// Parse a full sequence of console output lines from the start, replacing the
    /// derived progress. The version and error message are only filled in when not
    /// already known.
    pub fn parse_lines<'t, I: IntoIterator<Item = &'t str>>(&mut self, lines: I) {
        self.parse_indexed_lines(lines.into_iter().enumerate())
    }

    fn parse_indexed_lines<'t, I: Iterator<Item = (usize, &'t str)>>(&mut self, lines: I) {
        let format = self.classifier.format();
        let mut accumulator =
            ProgressAccumulator::new(format).with_debug_level(self.debug_level);
        let version_known = !self.tool_version.is_empty();
        for (i, line) in lines {
            let sample = self
                .classifier
                .classify(line, i, version_known || accumulator.version().is_some());
            accumulator.fold(sample);
        }

        if self.tool_version.is_empty() {
            if let Some(version) = accumulator.version() {
                debug!("{} version: {version}", format.name);
                self.tool_version = version.to_string();
            }
        }

        if self.error_message.is_empty() {
            if let Some(error) = accumulator.error() {
                warn!("{} reported an error: {error}", format.name);
                self.error_message = error.to_string();
            }
        }

        let progress = accumulator.overall_progress();
        if progress.is_finite() {
            self.progress = progress;
        } else if self.debug_level >= 2 {
            debug!("Ignoring non-finite progress estimate for {}", format.name);
        }
        self.current_phase = accumulator.current_phase().map(str::to_string);
        if accumulator.elapsed().is_some() {
            self.elapsed = accumulator.elapsed();
        }
    }

    /// The overall progress, in percent
    pub fn progress(&self) -> f32 {
        self.progress
    }

    /// The version banner, empty until detected
    pub fn tool_version(&self) -> &str {
        &self.tool_version
    }

    /// The first error line, empty if none was seen
    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    pub fn current_phase(&self) -> Option<&str> {
        self.current_phase.as_deref()
    }

    /// The most recent elapsed time the tool printed
    pub fn elapsed(&self) -> Option<TimeDelta> {
        self.elapsed
    }

    pub fn console_output_path(&self) -> &path::Path {
        &self.console_output_path
    }

    pub fn format(&self) -> &ConsoleFormat {
        self.classifier.format()
    }

    pub fn classifier(&self) -> &LineClassifier {
        &self.classifier
    }

    pub fn poll_count(&self) -> usize {
        self.poll_count
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            progress: self.progress,
            tool_version: self.tool_version.clone(),
            error_message: self.error_message.clone(),
            current_phase: self.current_phase.clone(),
            elapsed: self.elapsed,
        }
    }
}
