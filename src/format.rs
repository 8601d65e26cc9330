//! Console output formats of the supported analysis tools.
//!
//! A [`ConsoleFormat`] bundles everything that is specific to one tool's console output:
//! the phase ladder, the optional per-file step ladder, how the version banner looks,
//! and which lines mention "error" without reporting one. The progress estimation
//! itself is format-agnostic.
use std::fmt::Display;
#[cfg(feature = "serde")]
use std::fs;
#[allow(unused)]
use std::io::{self, prelude::*};
use std::path;
use std::str::FromStr;

use thiserror::Error;

use crate::phase::{Phase, PhaseTable, PhaseTableError, Signature};

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("Invalid phase table: {0}")]
    PhaseTable(
        #[from]
        #[source]
        PhaseTableError,
    ),
    #[error("Invalid marker pattern: {0}")]
    InvalidMarker(
        #[from]
        #[source]
        regex::Error,
    ),
    #[error("Unknown console output format {0:?}")]
    UnknownFormat(String),
    #[error("Encountered an IO error: {0}")]
    IOError(
        #[from]
        #[source]
        io::Error,
    ),
    #[cfg(feature = "serde")]
    #[error("Failed to decode console output format: {0}")]
    Json(
        #[from]
        #[source]
        serde_json::Error,
    ),
}

/// The regular expressions for the progress markers shared by all tools.
///
/// These are compiled case-insensitively by [`LineClassifier`](crate::classify::LineClassifier).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MarkerSyntax {
    /// `File #<n>/<m>`, capturing the file number and the file count
    pub file_number: String,
    /// `processing <float>%`, capturing the percentage
    pub percent: String,
    /// `processing <int> of <int> <word>`, capturing both counts
    pub items: String,
    /// One leading `[h:mm]` or `[h:mm:ss]` token, capturing each field
    pub timestamp: String,
}

impl Default for MarkerSyntax {
    fn default() -> Self {
        Self {
            file_number: r"File\s*#\s*(\d+)\s*/\s*(\d+)".to_string(),
            percent: r"processing\s+(\d+(?:\.\d+)?)\s*%".to_string(),
            items: r"processing\s+(\d+)\s+of\s+(\d+)\s+\w+".to_string(),
            timestamp: r"^\[(\d+):(\d{2})(?::(\d{2}))?\]".to_string(),
        }
    }
}

/// Everything the progress tracker needs to know about one tool's console output
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConsoleFormat {
    /// A short name for the format, used in log messages
    pub name: String,
    /// The tool name that starts the version banner, e.g. `DIA-NN`
    pub tool_name: String,
    /// The executable's file name. Lines containing it are echoed command lines,
    /// never version banners.
    pub executable: String,
    /// Only this many lines at the start of the file are considered for the version banner
    pub version_line_limit: usize,
    pub phases: PhaseTable,
    /// Milestones within a single file's pass, as a percent of that pass
    #[cfg_attr(feature = "serde", serde(default))]
    pub file_steps: Option<PhaseTable>,
    /// Lower-cased phrases that contain "error" but only echo a setting
    #[cfg_attr(feature = "serde", serde(default))]
    pub benign_error_phrases: Vec<String>,
    /// The file name the plugin redirects the tool's console output to
    pub console_output_file: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub markers: MarkerSyntax,
}

impl ConsoleFormat {
    pub fn new<S: Into<String>>(name: S, tool_name: S, executable: S) -> Self {
        let name = name.into();
        let console_output_file = format!("{name}_ConsoleOutput.txt");
        Self {
            name,
            tool_name: tool_name.into(),
            executable: executable.into(),
            version_line_limit: 4,
            phases: PhaseTable::default(),
            file_steps: None,
            benign_error_phrases: Vec::new(),
            console_output_file,
            markers: MarkerSyntax::default(),
        }
    }

    pub fn with_phases(mut self, phases: PhaseTable) -> Self {
        self.phases = phases;
        self
    }

    pub fn with_file_steps(mut self, file_steps: PhaseTable) -> Self {
        self.file_steps = Some(file_steps);
        self
    }

    pub fn with_version_line_limit(mut self, limit: usize) -> Self {
        self.version_line_limit = limit;
        self
    }

    pub fn with_benign_error_phrase<S: AsRef<str>>(mut self, phrase: S) -> Self {
        self.benign_error_phrases.push(phrase.as_ref().to_lowercase());
        self
    }

    pub fn with_console_output_file<S: Into<String>>(mut self, file_name: S) -> Self {
        self.console_output_file = file_name.into();
        self
    }

    pub fn with_markers(mut self, markers: MarkerSyntax) -> Self {
        self.markers = markers;
        self
    }

    /// Look up a phase of the top-level ladder by label
    pub fn get_phase(&self, label: &str) -> Option<&Phase> {
        self.phases.get(label)
    }

    /// Check every phase ladder. Literal signatures and benign error phrases are
    /// lower-cased in place.
    pub fn validate(&mut self) -> Result<(), FormatError> {
        self.phases.validate()?;
        self.phases.normalize();
        if let Some(steps) = self.file_steps.as_mut() {
            steps.validate()?;
            steps.normalize();
        }
        for phrase in self.benign_error_phrases.iter_mut() {
            *phrase = phrase.to_lowercase();
        }
        Ok(())
    }

    /// DIA-NN building a predicted spectral library from a FASTA file
    pub fn dia_nn_library() -> Self {
        let phases = PhaseTable::new()
            .phase("Loading FASTA", Signature::starts_with("Loading FASTA"), 1)
            .phase("Processing FASTA", Signature::starts_with("Processing FASTA"), 5)
            .phase(
                "Assembling elution groups",
                Signature::starts_with("Assembling elution groups"),
                10,
            )
            .phase(
                "Encoding peptides",
                Signature::starts_with("Encoding peptides for spectra and RTs prediction"),
                15,
            )
            .phase(
                "Predicting spectra",
                Signature::starts_with("Predicting spectra and IMs"),
                20,
            )
            .phase("Predicting RTs", Signature::starts_with("Predicting RTs"), 70)
            .phase(
                "Decoding spectra",
                Signature::starts_with("Decoding predicted spectra and IMs"),
                80,
            )
            .phase("Decoding RTs", Signature::starts_with("Decoding RTs"), 85)
            .phase(
                "Saving library",
                Signature::starts_with("Saving the library to"),
                90,
            )
            .phase(
                "Initialising library",
                Signature::starts_with("Initialising library"),
                92,
            )
            .phase(
                "Saving spectral library",
                Signature::starts_with("Saving spectral library to"),
                95,
            )
            .phase("Log saved", Signature::starts_with("Log saved to"), 98)
            .phase("Finished", Signature::starts_with("Finished"), 100);

        Self::new("DIA-NN", "DIA-NN", "diann.exe")
            .with_phases(phases)
            .with_benign_error_phrase("error tolerance:")
            .with_benign_error_phrase("error tolerance for")
            .with_console_output_file("DIA-NN_ConsoleOutput.txt")
    }

    /// DIA-NN searching one or more runs against a spectral library in a single pass
    pub fn dia_nn_search() -> Self {
        Self::dia_nn_search_with_passes(false)
    }

    /// DIA-NN searching the runs, building a new library from them, then searching
    /// them again (match-between-runs)
    pub fn dia_nn_search_two_pass() -> Self {
        Self::dia_nn_search_with_passes(true)
    }

    fn dia_nn_search_with_passes(two_pass: bool) -> Self {
        let mut phases = PhaseTable::new()
            .phase(
                "Loading spectral library",
                Signature::starts_with("Loading spectral library"),
                1,
            )
            .phase(
                "Initialising library",
                Signature::starts_with("Initialising library"),
                3,
            )
            .per_file_phase("First pass", Signature::starts_with("File #"), 5);

        if two_pass {
            phases = phases
                .phase(
                    "Creating library from runs",
                    Signature::starts_with("Creating spectral library from the DIA data"),
                    42,
                )
                .per_file_phase("Second pass", Signature::starts_with("Second pass"), 45);
        }

        let phases = phases
            .phase("Cross-run analysis", Signature::starts_with("Cross-run analysis"), 85)
            .phase(
                "Reading quantification information",
                Signature::starts_with("Reading quantification information"),
                86,
            )
            .phase(
                "Quantifying peptides",
                Signature::starts_with("Quantifying peptides"),
                87,
            )
            .phase(
                "Assembling protein groups",
                Signature::starts_with("Assembling protein groups"),
                88,
            )
            .phase(
                "Quantifying proteins",
                Signature::starts_with("Quantifying proteins"),
                89,
            )
            .phase(
                "Calculating q-values",
                Signature::starts_with("Calculating q-values for protein and gene groups"),
                90,
            )
            .phase("Writing report", Signature::starts_with("Writing report"), 91)
            .phase("Report saved", Signature::starts_with("Report saved to"), 93)
            .phase(
                "Saving matrices",
                Signature::starts_with("Saving precursor levels matrix"),
                94,
            )
            .phase(
                "Stats report saved",
                Signature::starts_with("Stats report saved to"),
                95,
            )
            .phase(
                "Generating spectral library",
                Signature::starts_with("Generating spectral library"),
                96,
            )
            .phase(
                "Saving spectral library",
                Signature::starts_with("Saving spectral library to"),
                97,
            )
            .phase("Log saved", Signature::starts_with("Log saved to"), 99)
            .phase("Finished", Signature::starts_with("Finished"), 100);

        let file_steps = PhaseTable::new()
            .phase("Loading run", Signature::starts_with("Loading run"), 2)
            .phase(
                "Detectable precursors",
                Signature::contains("library precursors are potentially detectable"),
                10,
            )
            .phase("Processing", Signature::starts_with("Processing..."), 15)
            .phase("Calibrating", Signature::starts_with("Calibrating"), 25)
            .phase("Recalibrating", Signature::starts_with("Recalibrating"), 45)
            .phase("RT window", Signature::starts_with("RT window set to"), 55)
            .phase(
                "Removing low confidence identifications",
                Signature::starts_with("Removing low confidence identifications"),
                70,
            )
            .phase(
                "Removing interfering precursors",
                Signature::starts_with("Removing interfering precursors"),
                75,
            )
            .phase(
                "Training neural networks",
                Signature::starts_with("Training neural networks"),
                80,
            )
            .phase(
                "Calculating protein q-values",
                Signature::starts_with("Calculating protein q-values"),
                90,
            )
            .phase("Quantification", Signature::starts_with("Quantification"), 95);

        Self::dia_nn_library()
            .with_phases(phases)
            .with_file_steps(file_steps)
    }

    /// TopPIC searching top-down spectra against a protein database
    pub fn toppic() -> Self {
        let phases = PhaseTable::new()
            .phase(
                "Generating index files",
                Signature::starts_with("Generating index files"),
                2,
            )
            .phase(
                "Zero unexpected shift filtering",
                Signature::starts_with("Zero unexpected shift filtering"),
                10,
            )
            .phase(
                "Non PTM filtering",
                Signature::starts_with("Non PTM filtering"),
                10,
            )
            .phase(
                "Zero unexpected shift search",
                Signature::starts_with("Zero unexpected shift search"),
                30,
            )
            .phase("Non PTM search", Signature::starts_with("Non PTM search"), 30)
            .phase(
                "One unexpected shift filtering",
                Signature::starts_with("One unexpected shift filtering"),
                35,
            )
            .phase(
                "One PTM filtering",
                Signature::starts_with("One PTM filtering"),
                35,
            )
            .phase(
                "One unexpected shift search",
                Signature::starts_with("One unexpected shift search"),
                45,
            )
            .phase("One PTM search", Signature::starts_with("One PTM search"), 45)
            .phase(
                "Diagonal filtering",
                Signature::starts_with("Diagonal filtering"),
                50,
            )
            .phase(
                "Diagonal PTM filtering",
                Signature::starts_with("Diagonal PTM filtering"),
                50,
            )
            .phase(
                "Two unexpected shift search",
                Signature::starts_with("Two unexpected shift search"),
                65,
            )
            .phase("Two PTM search", Signature::starts_with("Two PTM search"), 65)
            .phase("Combining PrSMs", Signature::starts_with("Combining PRSMs"), 75)
            .phase(
                "E-value computation",
                Signature::starts_with("E-value computation"),
                80,
            )
            .phase(
                "Finding PrSM clusters",
                Signature::starts_with("Finding PrSM clusters"),
                85,
            )
            .phase(
                "Top PrSM selecting",
                Signature::starts_with("Top PrSM selecting"),
                87,
            )
            .phase("FDR computation", Signature::starts_with("FDR computation"), 88)
            .phase(
                "PrSM filtering by E-value",
                Signature::starts_with("PrSM filtering by E-value"),
                89,
            )
            .phase(
                "Outputting PrSM table",
                Signature::starts_with("Outputting the PrSM result table"),
                90,
            )
            .phase(
                "Generating PrSM xml files",
                Signature::starts_with("Generating xml files"),
                92,
            )
            .phase(
                "Converting xml files to json",
                Signature::starts_with("Converting xml files to json"),
                95,
            )
            .phase(
                "Finding protein species",
                Signature::starts_with("Finding protein species"),
                96,
            )
            .phase("TopPIC finished", Signature::starts_with("TopPIC finished"), 100);

        Self::new("TopPIC", "TopPIC", "toppic.exe")
            .with_phases(phases)
            .with_version_line_limit(8)
            .with_benign_error_phrase("error tolerance:")
            .with_benign_error_phrase("error tolerance for")
            .with_benign_error_phrase("error-tolerance")
            .with_console_output_file("TopPIC_ConsoleOutput.txt")
    }

    #[cfg(feature = "serde")]
    /// Write the format out in JSON format to `writer`
    pub fn to_writer<W: Write>(&self, writer: W) -> serde_json::Result<()> {
        serde_json::to_writer_pretty(writer, self)
    }

    #[cfg(feature = "serde")]
    /// Read a format in JSON format from `reader` and validate it
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, FormatError> {
        let mut format: Self = serde_json::from_reader(reader)?;
        format.validate()?;
        Ok(format)
    }

    #[cfg(feature = "serde")]
    /// Read a format from a JSON file
    pub fn from_path<P: AsRef<path::Path>>(path: P) -> Result<Self, FormatError> {
        let handle = io::BufReader::new(fs::File::open(path)?);
        Self::from_reader(handle)
    }

    /// The default console output path for this format inside `working_directory`
    pub fn console_output_path<P: AsRef<path::Path>>(&self, working_directory: P) -> path::PathBuf {
        working_directory.as_ref().join(&self.console_output_file)
    }
}

/// The console output formats with built-in phase tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum KnownFormat {
    #[cfg_attr(feature = "cli", value(name = "diann-library"))]
    DiaNNLibrary,
    #[cfg_attr(feature = "cli", value(name = "diann-search"))]
    DiaNNSearch,
    #[cfg_attr(feature = "cli", value(name = "diann-search-two-pass"))]
    DiaNNSearchTwoPass,
    #[cfg_attr(feature = "cli", value(name = "toppic"))]
    TopPIC,
}

impl KnownFormat {
    pub fn to_format(self) -> ConsoleFormat {
        match self {
            Self::DiaNNLibrary => ConsoleFormat::dia_nn_library(),
            Self::DiaNNSearch => ConsoleFormat::dia_nn_search(),
            Self::DiaNNSearchTwoPass => ConsoleFormat::dia_nn_search_two_pass(),
            Self::TopPIC => ConsoleFormat::toppic(),
        }
    }
}

impl Display for KnownFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::DiaNNLibrary => "diann-library",
            Self::DiaNNSearch => "diann-search",
            Self::DiaNNSearchTwoPass => "diann-search-two-pass",
            Self::TopPIC => "toppic",
        };
        f.write_str(name)
    }
}

impl FromStr for KnownFormat {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "diann-library" | "dia-nn-library" => Ok(Self::DiaNNLibrary),
            "diann-search" | "dia-nn-search" => Ok(Self::DiaNNSearch),
            "diann-search-two-pass" | "dia-nn-search-two-pass" | "diann-mbr" => {
                Ok(Self::DiaNNSearchTwoPass)
            }
            "toppic" => Ok(Self::TopPIC),
            _ => Err(FormatError::UnknownFormat(s.to_string())),
        }
    }
}

impl From<KnownFormat> for ConsoleFormat {
    fn from(value: KnownFormat) -> Self {
        value.to_format()
    }
}
