//! Fold [`ProgressSample`]s into an overall completion percentage.
//!
//! The phase floor only ever rises. Item and percent counters describe the most
//! recent task only, and the per-file step floor restarts with every file marker.
use chrono::TimeDelta;
use log::debug;

use crate::classify::ProgressSample;
use crate::format::ConsoleFormat;
use crate::phase::COMPLETE;

/// The number of pseudo items a percent-mode task is divided into
const PERCENT_MODE_ITEM_COUNT: u64 = 10000;

/// Running state for one pass over a console output file
#[derive(Debug, Clone)]
pub struct ProgressAccumulator<'a> {
    format: &'a ConsoleFormat,
    current_checkpoint: u8,
    current_phase: Option<Box<str>>,
    in_per_file_phase: bool,
    file_step: u8,
    items_processed: u64,
    items_total: u64,
    percent_complete: f32,
    using_percent_mode: bool,
    current_file_number: u32,
    total_file_count: u32,
    version: Option<String>,
    error: Option<String>,
    elapsed: Option<TimeDelta>,
    debug_level: u8,
}

impl<'a> ProgressAccumulator<'a> {
    pub fn new(format: &'a ConsoleFormat) -> Self {
        Self {
            format,
            current_checkpoint: format.phases.initial_checkpoint,
            current_phase: None,
            in_per_file_phase: false,
            file_step: 0,
            items_processed: 0,
            items_total: 0,
            percent_complete: 0.0,
            using_percent_mode: false,
            current_file_number: 0,
            total_file_count: 0,
            version: None,
            error: None,
            elapsed: None,
            debug_level: 0,
        }
    }

    pub fn with_debug_level(mut self, debug_level: u8) -> Self {
        self.debug_level = debug_level;
        self
    }

    /// Fold one line's sample into the running state
    pub fn fold(&mut self, sample: ProgressSample) {
        if let Some(phase) = sample.phase {
            if phase.checkpoint > self.current_checkpoint {
                self.current_checkpoint = phase.checkpoint;
                self.in_per_file_phase = phase.per_file;
                self.current_phase = Some(phase.label);
                self.reset_task_counters();
                self.file_step = 0;
            }
        }

        if let Some((number, count)) = sample.file {
            self.current_file_number = number;
            self.total_file_count = count;
            self.reset_task_counters();
            self.file_step = 0;
        }

        if let Some(step) = sample.file_step {
            if step > self.file_step {
                self.file_step = step;
                self.reset_task_counters();
            }
        }

        if let Some((processed, total)) = sample.items {
            self.items_processed = processed;
            self.items_total = total;
            self.using_percent_mode = false;
        }

        if let Some(percent) = sample.percent {
            self.percent_complete = percent;
            self.using_percent_mode = true;
        }

        if let Some(error) = sample.error {
            if self.error.is_none() {
                self.error = Some(error);
            } else if self.debug_level >= 2 {
                debug!("Ignoring additional {} error line: {error}", self.format.name);
            }
        }

        if let Some(version) = sample.version {
            if self.version.is_none() {
                self.version = Some(version);
            }
        }

        if sample.elapsed.is_some() {
            self.elapsed = sample.elapsed;
        }
    }

    fn reset_task_counters(&mut self) {
        self.items_processed = 0;
        self.items_total = 0;
        self.percent_complete = 0.0;
        self.using_percent_mode = false;
    }

    /// The fraction of the current task that is complete, from the most recent
    /// item-count or percent line
    pub fn task_fraction(&self) -> f64 {
        let (processed, total) = if self.using_percent_mode {
            // Percentages are counted as hundredths of a percent out of 10000
            let processed = (self.percent_complete * 100.0) as u64;
            (processed, PERCENT_MODE_ITEM_COUNT)
        } else {
            (self.items_processed, self.items_total)
        };
        if total > 0 {
            (processed as f64 / total as f64).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// The fraction of the current file's pass that is complete
    pub fn intra_pass_fraction(&self) -> f64 {
        let task = self.task_fraction();
        match self.format.file_steps.as_ref() {
            Some(steps) if self.in_per_file_phase => {
                let step = self.file_step.min(COMPLETE);
                let next = steps.next_checkpoint(step);
                let within = step as f64 + (next - step) as f64 * task;
                (within / COMPLETE as f64).clamp(0.0, 1.0)
            }
            _ => task,
        }
    }

    /// The checkpoint the current phase interpolates toward
    pub fn next_checkpoint(&self) -> u8 {
        self.format.phases.next_checkpoint(self.current_checkpoint)
    }

    /// Compute the overall progress, in percent, for everything folded so far.
    ///
    /// In a per-file phase of a multi-file run the span between this phase and the
    /// next is shared evenly between the files.
    pub fn overall_progress(&self) -> f32 {
        let floor = self.current_checkpoint.min(COMPLETE);
        let next = self.next_checkpoint().max(floor);
        let span = (next - floor) as f64;
        let floor_f = floor as f64;

        let fraction = if self.in_per_file_phase {
            self.intra_pass_fraction()
        } else {
            self.task_fraction()
        };

        let reported = if self.in_per_file_phase && self.total_file_count > 1 {
            let count = self.total_file_count as f64;
            let index = self.current_file_number.clamp(1, self.total_file_count) - 1;
            floor_f + span * (index as f64 + fraction) / count
        } else {
            (floor_f + span * fraction).clamp(floor_f, next as f64)
        };
        reported as f32
    }

    pub fn current_checkpoint(&self) -> u8 {
        self.current_checkpoint
    }

    pub fn current_phase(&self) -> Option<&str> {
        self.current_phase.as_deref()
    }

    /// `(current file number, total file count)`; `(0, 0)` for a single-file run
    pub fn file_position(&self) -> (u32, u32) {
        (self.current_file_number, self.total_file_count)
    }

    pub fn items(&self) -> (u64, u64) {
        (self.items_processed, self.items_total)
    }

    pub fn using_percent_mode(&self) -> bool {
        self.using_percent_mode
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn elapsed(&self) -> Option<TimeDelta> {
        self.elapsed
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::classify::LineClassifier;
    use crate::phase::{PhaseTable, Signature};

    fn fold_lines<'a>(
        classifier: &LineClassifier,
        accumulator: &mut ProgressAccumulator<'a>,
        lines: &[&str],
    ) {
        for (i, line) in lines.iter().enumerate() {
            let sample = classifier.classify(line, i, accumulator.version().is_some());
            accumulator.fold(sample);
        }
    }

    fn two_pass_format() -> ConsoleFormat {
        ConsoleFormat::new("Tool", "Tool", "tool").with_phases(
            PhaseTable::new()
                .phase("Loading", Signature::starts_with("Loading library"), 1)
                .per_file_phase("First pass", Signature::starts_with("File #"), 5)
                .per_file_phase("Second pass", Signature::starts_with("Second pass"), 75)
                .phase("Cross-run", Signature::starts_with("Cross-run analysis"), 90)
                .phase("Finished", Signature::starts_with("Finished"), 100),
        )
    }

    #[test]
    fn test_library_ladder_finishes() {
        let format = ConsoleFormat::dia_nn_library();
        let classifier = LineClassifier::new(format.clone()).unwrap();
        let mut acc = ProgressAccumulator::new(&format);
        fold_lines(
            &classifier,
            &mut acc,
            &["DIA-NN 1.8.1 (desc)", "Loading FASTA x", "Processing FASTA"],
        );
        assert_eq!(acc.current_checkpoint(), 5);
        assert_eq!(acc.overall_progress(), 5.0);
        assert_eq!(acc.current_phase(), Some("Processing FASTA"));
        fold_lines(&classifier, &mut acc, &["Finished"]);
        assert_eq!(acc.overall_progress(), 100.0);
        assert_eq!(acc.version(), Some("DIA-NN 1.8.1"));
    }

    #[test]
    fn test_item_interpolation() {
        let format = ConsoleFormat::new("TopPIC", "TopPIC", "toppic.exe").with_phases(
            PhaseTable::new()
                .phase("Non PTM filtering", Signature::starts_with("Non PTM filtering"), 10)
                .phase("Non PTM search", Signature::starts_with("Non PTM search"), 30),
        );
        let classifier = LineClassifier::new(format.clone()).unwrap();
        let mut acc = ProgressAccumulator::new(&format);
        fold_lines(
            &classifier,
            &mut acc,
            &["Non PTM filtering - processing 500 of 1504 spectra."],
        );
        assert_eq!(acc.next_checkpoint(), 30);
        let expected = 10.0 + 20.0 * (500.0 / 1504.0);
        assert!((acc.overall_progress() - expected).abs() < 1e-3);
        assert!((acc.overall_progress() - 16.65).abs() < 0.01);
    }

    #[test]
    fn test_percent_mode() {
        let format = ConsoleFormat::toppic();
        let classifier = LineClassifier::new(format.clone()).unwrap();
        let mut acc = ProgressAccumulator::new(&format);
        fold_lines(
            &classifier,
            &mut acc,
            &[
                "E-value computation - processing 10 of 100 spectra.",
                "E-value computation - processing 50.5%",
            ],
        );
        assert!(acc.using_percent_mode());
        // 5050 of 10000
        assert!((acc.task_fraction() - 0.505).abs() < 1e-9);
        assert!((acc.overall_progress() - (80.0 + 5.0 * 0.505)).abs() < 1e-4);

        // An item line switches back to item mode
        fold_lines(&classifier, &mut acc, &["E-value computation - processing 1 of 4 spectra."]);
        assert!(!acc.using_percent_mode());
        assert!((acc.task_fraction() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_phase_advance_resets_items() {
        let format = ConsoleFormat::toppic();
        let classifier = LineClassifier::new(format.clone()).unwrap();
        let mut acc = ProgressAccumulator::new(&format);
        fold_lines(
            &classifier,
            &mut acc,
            &[
                "Non PTM filtering - processing 1504 of 1504 spectra.",
                "Non PTM search - started.",
            ],
        );
        assert_eq!(acc.items(), (0, 0));
        assert_eq!(acc.overall_progress(), 30.0);
    }

    #[test]
    fn test_phase_floor_never_regresses() {
        let format = ConsoleFormat::toppic();
        let classifier = LineClassifier::new(format.clone()).unwrap();
        let mut acc = ProgressAccumulator::new(&format);
        fold_lines(
            &classifier,
            &mut acc,
            &["E-value computation - started.", "Non PTM filtering - started."],
        );
        assert_eq!(acc.current_checkpoint(), 80);
        assert_eq!(acc.current_phase(), Some("E-value computation"));
    }

    #[test]
    fn test_multi_file_bridges_to_second_pass() {
        let format = two_pass_format();
        let classifier = LineClassifier::new(format.clone()).unwrap();
        let mut acc = ProgressAccumulator::new(&format);
        fold_lines(
            &classifier,
            &mut acc,
            &[
                "Loading library lib.speclib",
                "[0:01] File #1/2",
                "[0:10] File #2/2",
                "[0:12] processing 100.0%",
            ],
        );
        assert_eq!(acc.file_position(), (2, 2));
        assert_eq!(acc.next_checkpoint(), 75);
        assert!((acc.overall_progress() - 75.0).abs() < 1e-4);
    }

    #[test]
    fn test_multi_file_interpolation() {
        let format = two_pass_format();
        let classifier = LineClassifier::new(format.clone()).unwrap();
        let mut acc = ProgressAccumulator::new(&format);
        fold_lines(&classifier, &mut acc, &["File #1/4"]);
        assert!((acc.overall_progress() - 5.0).abs() < 1e-4);
        fold_lines(&classifier, &mut acc, &["File #3/4", "processing 50 of 100 items"]);
        // 5 + 70 * (2 + 0.5) / 4
        assert!((acc.overall_progress() - 48.75).abs() < 1e-4);

        // Second pass restarts the file numbering above the new floor
        fold_lines(&classifier, &mut acc, &["Second pass: reanalysing", "File #1/4"]);
        assert_eq!(acc.current_phase(), Some("Second pass"));
        assert_eq!(acc.items(), (0, 0));
        assert!((acc.overall_progress() - 75.0).abs() < 1e-4);
    }

    #[test]
    fn test_file_steps_drive_intra_pass_fraction() {
        let format = ConsoleFormat::dia_nn_search();
        let classifier = LineClassifier::new(format.clone()).unwrap();
        let mut acc = ProgressAccumulator::new(&format);
        fold_lines(
            &classifier,
            &mut acc,
            &[
                "[0:00] Loading spectral library lib.speclib",
                "[0:02] File #1/2",
                "[0:02] Loading run run1.mzML",
                "[0:09] Removing low confidence identifications",
            ],
        );
        assert!((acc.intra_pass_fraction() - 0.70).abs() < 1e-9);
        // 5 + 80 * (0 + 0.7) / 2
        assert!((acc.overall_progress() - 33.0).abs() < 1e-4);

        fold_lines(&classifier, &mut acc, &["[0:20] File #2/2"]);
        assert_eq!(acc.intra_pass_fraction(), 0.0);
        assert!((acc.overall_progress() - 45.0).abs() < 1e-4);
        assert_eq!(acc.elapsed(), Some(TimeDelta::minutes(20)));
    }

    #[test]
    fn test_single_file_per_file_phase() {
        let format = ConsoleFormat::dia_nn_search();
        let classifier = LineClassifier::new(format.clone()).unwrap();
        let mut acc = ProgressAccumulator::new(&format);
        fold_lines(
            &classifier,
            &mut acc,
            &["File #1/1", "Quantification of precursors"],
        );
        // 5 + 80 * 0.95
        assert!((acc.overall_progress() - 81.0).abs() < 1e-4);
    }

    #[test]
    fn test_first_error_is_kept() {
        let format = ConsoleFormat::toppic();
        let classifier = LineClassifier::new(format.clone()).unwrap();
        let mut acc = ProgressAccumulator::new(&format).with_debug_level(2);
        fold_lines(
            &classifier,
            &mut acc,
            &[
                "error tolerance: 15 ppm",
                "error: index corrupt",
                "error: could not write output",
            ],
        );
        assert_eq!(acc.error(), Some("error: index corrupt"));
    }

    #[test]
    fn test_nothing_seen() {
        let format = ConsoleFormat::toppic();
        let acc = ProgressAccumulator::new(&format);
        assert_eq!(acc.overall_progress(), 0.0);
        assert_eq!(acc.file_position(), (0, 0));
        assert!(acc.version().is_none());
    }
}
