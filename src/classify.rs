//! Classify single lines of a tool's console output.
//!
//! Classification never fails. A line that matches nothing yields an empty
//! [`ProgressSample`], and a line may match several categories at once.
use bitflags::bitflags;
use chrono::TimeDelta;
use log::trace;
use regex::Regex;

use crate::format::{ConsoleFormat, FormatError};
use crate::phase::case_insensitive;

bitflags! {
    /// The categories a single console output line was found to belong to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LineCategory: u8 {
        const VERSION = 1;
        const FILE_NUMBER = 1 << 1;
        const PERCENT = 1 << 2;
        const ITEMS = 1 << 3;
        const PHASE = 1 << 4;
        const FILE_STEP = 1 << 5;
        const ERROR = 1 << 6;
    }
}

/// A phase-marker match, carrying what the accumulator needs from the table entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseMatch {
    pub label: Box<str>,
    pub checkpoint: u8,
    pub per_file: bool,
}

/// Everything that could be learned from one line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSample {
    pub categories: LineCategory,
    pub phase: Option<PhaseMatch>,
    /// A milestone within the current file's pass, in percent of that pass
    pub file_step: Option<u8>,
    /// `(processed, total)`
    pub items: Option<(u64, u64)>,
    pub percent: Option<f32>,
    /// `(file number, file count)`
    pub file: Option<(u32, u32)>,
    pub error: Option<String>,
    pub version: Option<String>,
    /// The last leading timestamp token, as reported by the tool
    pub elapsed: Option<TimeDelta>,
}

impl ProgressSample {
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.elapsed.is_none()
    }
}

/// Splits console output lines into [`ProgressSample`]s according to a [`ConsoleFormat`].
///
/// All regular expressions are compiled once, when the classifier is built.
#[derive(Debug, Clone)]
pub struct LineClassifier {
    format: ConsoleFormat,
    tool_name: String,
    executable: String,
    file_number: Regex,
    percent: Regex,
    items: Regex,
    timestamp: Regex,
}

impl LineClassifier {
    pub fn new(mut format: ConsoleFormat) -> Result<Self, FormatError> {
        format.validate()?;
        let markers = &format.markers;
        let file_number = case_insensitive(&markers.file_number)?;
        let percent = case_insensitive(&markers.percent)?;
        let items = case_insensitive(&markers.items)?;
        let timestamp = case_insensitive(&markers.timestamp)?;
        Ok(Self {
            tool_name: format.tool_name.to_lowercase(),
            executable: format.executable.to_lowercase(),
            format,
            file_number,
            percent,
            items,
            timestamp,
        })
    }

    pub fn format(&self) -> &ConsoleFormat {
        &self.format
    }

    /// Classify `line`, the `line_index`-th (0-based) line of the file.
    ///
    /// The version banner is only looked for when `version_known` is false.
    pub fn classify(&self, line: &str, line_index: usize, version_known: bool) -> ProgressSample {
        let mut sample = ProgressSample::default();
        let line = line.trim();
        if line.is_empty() {
            return sample;
        }
        let lowered = line.to_lowercase();

        if !version_known && line_index < self.format.version_line_limit {
            if let Some(version) = self.parse_version(line, &lowered) {
                sample.categories |= LineCategory::VERSION;
                sample.version = Some(version);
            }
        }

        if let Some((number, count)) = self.parse_file_number(line) {
            sample.categories |= LineCategory::FILE_NUMBER;
            sample.file = Some((number, count));
        }

        if let Some(percent) = self.parse_percent(line) {
            sample.categories |= LineCategory::PERCENT;
            sample.percent = Some(percent);
        } else if let Some(items) = self.parse_items(line) {
            sample.categories |= LineCategory::ITEMS;
            sample.items = Some(items);
        }

        let (content, elapsed) = self.strip_timestamps(line);
        sample.elapsed = elapsed;
        let content_lowered = content.to_lowercase();

        if let Some((label, phase)) = self.format.phases.match_line(content, &content_lowered) {
            sample.categories |= LineCategory::PHASE;
            sample.phase = Some(PhaseMatch {
                label: label.into(),
                checkpoint: phase.checkpoint,
                per_file: phase.per_file,
            });
        }

        if let Some(steps) = self.format.file_steps.as_ref() {
            if let Some((_, step)) = steps.match_line(content, &content_lowered) {
                sample.categories |= LineCategory::FILE_STEP;
                sample.file_step = Some(step.checkpoint);
            }
        }

        if self.is_error(&lowered) {
            sample.categories |= LineCategory::ERROR;
            sample.error = Some(line.to_string());
        }

        if !sample.categories.is_empty() {
            trace!("{} line {line_index} {:?}: {line}", self.format.name, sample.categories);
        }
        sample
    }

    /// The version is the banner text before the first `(`
    fn parse_version(&self, line: &str, lowered: &str) -> Option<String> {
        if !lowered.starts_with(self.tool_name.as_str()) {
            return None;
        }
        if !self.executable.is_empty() && lowered.contains(self.executable.as_str()) {
            return None;
        }
        let version = match line.split_once('(') {
            Some((before, _)) => before.trim(),
            None => line.trim(),
        };
        (!version.is_empty()).then(|| version.to_string())
    }

    fn parse_file_number(&self, line: &str) -> Option<(u32, u32)> {
        let caps = self.file_number.captures(line)?;
        let number = caps.get(1)?.as_str().parse().ok()?;
        let count = caps.get(2)?.as_str().parse().ok()?;
        Some((number, count))
    }

    fn parse_percent(&self, line: &str) -> Option<f32> {
        let caps = self.percent.captures(line)?;
        caps.get(1)?.as_str().parse().ok()
    }

    fn parse_items(&self, line: &str) -> Option<(u64, u64)> {
        let caps = self.items.captures(line)?;
        let processed = caps.get(1)?.as_str().parse().ok()?;
        let total = caps.get(2)?.as_str().parse().ok()?;
        Some((processed, total))
    }

    fn is_error(&self, lowered: &str) -> bool {
        lowered.contains("error")
            && !self
                .format
                .benign_error_phrases
                .iter()
                .any(|phrase| lowered.contains(phrase.as_str()))
    }

    /// Remove a leading run of `[h:mm]` / `[h:mm:ss]` tokens, returning the rest of the
    /// line and the last timestamp in the run
    pub fn strip_timestamps<'l>(&self, line: &'l str) -> (&'l str, Option<TimeDelta>) {
        let mut rest = line.trim_start();
        let mut elapsed = None;
        while let Some(caps) = self.timestamp.captures(rest) {
            let Some(token) = caps.get(0) else { break };
            if token.end() == 0 {
                break;
            }
            elapsed = Self::timestamp_delta(&caps);
            rest = rest[token.end()..].trim_start();
        }
        (rest, elapsed)
    }

    /// A token whose fields overflow [`TimeDelta`] has no elapsed time
    fn timestamp_delta(caps: &regex::Captures) -> Option<TimeDelta> {
        let field = |i: usize| -> Option<i64> {
            match caps.get(i) {
                Some(m) => m.as_str().parse().ok(),
                None => Some(0),
            }
        };
        let hours = TimeDelta::try_hours(field(1)?)?;
        let minutes = TimeDelta::try_minutes(field(2)?)?;
        let seconds = TimeDelta::try_seconds(field(3)?)?;
        hours.checked_add(&minutes)?.checked_add(&seconds)
    }

    /// If `line` reports item or percent progress, return the text before the
    /// `processing` marker, which names the task being counted
    pub fn progress_key<'l>(&self, line: &'l str) -> Option<&'l str> {
        let found = self.percent.find(line).or_else(|| self.items.find(line))?;
        let (prefix, _) = self.strip_timestamps(&line[..found.start()]);
        Some(prefix.trim_end_matches(|c: char| c.is_whitespace() || c == '-'))
    }
}
