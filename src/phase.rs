//! Phase tables: ordered mappings from a milestone phrase to a progress checkpoint.
//!
//! The literal phrases are tool-output-format specific and are treated as data. See
//! [`ConsoleFormat`](crate::format::ConsoleFormat) for the built-in tables.
#[allow(unused)]
use std::io::prelude::*;

use indexmap::map::{Iter, Keys};
use indexmap::IndexMap;
use regex::{Regex, RegexBuilder};
use thiserror::Error;

/// The checkpoint reported once a run reaches the end of its phase ladder
pub const COMPLETE: u8 = 100;

#[derive(Debug, Error)]
pub enum PhaseTableError {
    #[error("Checkpoint {checkpoint} of phase {label:?} is greater than 100")]
    CheckpointOutOfRange { label: String, checkpoint: u8 },
    #[error("Invalid phase signature pattern: {0}")]
    InvalidPattern(
        #[from]
        #[source]
        regex::Error,
    ),
}

/// How a [`Phase`] recognizes its milestone line.
///
/// All comparisons ignore case. Literal signatures are compared against the
/// lower-cased line, so their text must be lower-cased too. The [`Signature::starts_with`]
/// and [`Signature::contains`] constructors do that, and [`PhaseTable::normalize`] fixes
/// up variants built directly.
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "SignatureRepr", into = "SignatureRepr")
)]
pub enum Signature {
    StartsWith(String),
    Contains(String),
    Pattern(Regex),
}

impl Signature {
    pub fn starts_with<S: AsRef<str>>(prefix: S) -> Self {
        Self::StartsWith(prefix.as_ref().to_lowercase())
    }

    pub fn contains<S: AsRef<str>>(text: S) -> Self {
        Self::Contains(text.as_ref().to_lowercase())
    }

    /// Compile `pattern` as a case-insensitive regular expression
    pub fn pattern(pattern: &str) -> Result<Self, PhaseTableError> {
        let pattern = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self::Pattern(pattern))
    }

    /// Lower-case the text of a literal signature in place
    pub fn normalize(&mut self) {
        match self {
            Self::StartsWith(text) | Self::Contains(text) => {
                if text.chars().any(char::is_uppercase) {
                    *text = text.to_lowercase();
                }
            }
            Self::Pattern(_) => {}
        }
    }

    /// Test a line against this signature. `lowered` must be `text.to_lowercase()`.
    #[inline]
    pub fn matches(&self, text: &str, lowered: &str) -> bool {
        match self {
            Self::StartsWith(prefix) => lowered.starts_with(prefix.as_str()),
            Self::Contains(needle) => lowered.contains(needle.as_str()),
            Self::Pattern(pattern) => pattern.is_match(text),
        }
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::StartsWith(a), Self::StartsWith(b)) => a == b,
            (Self::Contains(a), Self::Contains(b)) => a == b,
            (Self::Pattern(a), Self::Pattern(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

#[cfg(feature = "serde")]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
enum SignatureRepr {
    StartsWith(String),
    Contains(String),
    Pattern(String),
}

#[cfg(feature = "serde")]
impl TryFrom<SignatureRepr> for Signature {
    type Error = PhaseTableError;

    fn try_from(value: SignatureRepr) -> Result<Self, Self::Error> {
        match value {
            SignatureRepr::StartsWith(s) => Ok(Self::starts_with(s)),
            SignatureRepr::Contains(s) => Ok(Self::contains(s)),
            SignatureRepr::Pattern(s) => Self::pattern(&s),
        }
    }
}

#[cfg(feature = "serde")]
impl From<Signature> for SignatureRepr {
    fn from(value: Signature) -> Self {
        match value {
            Signature::StartsWith(s) => Self::StartsWith(s),
            Signature::Contains(s) => Self::Contains(s),
            Signature::Pattern(p) => Self::Pattern(p.as_str().to_string()),
        }
    }
}

/// A milestone in a tool's console output
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Phase {
    pub signature: Signature,
    /// The overall progress, in percent, at which this phase begins
    pub checkpoint: u8,
    /// Whether this phase is repeated once per input file, e.g. the first or second
    /// search pass of a multi-run DIA-NN analysis
    #[cfg_attr(feature = "serde", serde(default))]
    pub per_file: bool,
}

impl Phase {
    pub fn new(signature: Signature, checkpoint: u8) -> Self {
        Self {
            signature,
            checkpoint,
            per_file: false,
        }
    }
}

/**
An ordered mapping from phase label to [`Phase`].

Lookups walk the table in declaration order, so when two signatures could
match the same line, the one declared first wins. Checkpoints do not need to
increase in declaration order.

A wrapper around [`indexmap::IndexMap`].
*/
#[derive(Default, Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhaseTable {
    /// The phases keyed by a human-readable label, ordered by declaration
    #[cfg_attr(feature = "serde", serde(with = "indexmap::map::serde_seq"))]
    pub phases: IndexMap<Box<str>, Phase>,

    /// The phase floor before any milestone has been seen
    #[cfg_attr(feature = "serde", serde(default))]
    pub initial_checkpoint: u8,
}

impl PhaseTable {
    pub fn new() -> PhaseTable {
        PhaseTable::default()
    }

    /// Append a phase, builder style. Checkpoints above 100 are clamped.
    pub fn phase<T: Into<Box<str>>>(mut self, label: T, signature: Signature, checkpoint: u8) -> Self {
        self.insert(label, Phase::new(signature, checkpoint.min(COMPLETE)));
        self
    }

    /// Append a phase that recurs once per input file, builder style.
    pub fn per_file_phase<T: Into<Box<str>>>(
        mut self,
        label: T,
        signature: Signature,
        checkpoint: u8,
    ) -> Self {
        let mut phase = Phase::new(signature, checkpoint.min(COMPLETE));
        phase.per_file = true;
        self.insert(label, phase);
        self
    }

    /// Insert `phase` under `label`, returning the phase previously stored there
    #[inline]
    pub fn insert<T: Into<Box<str>>>(&mut self, label: T, phase: Phase) -> Option<Phase> {
        self.phases.insert(label.into(), phase)
    }

    #[inline]
    pub fn get(&self, label: &str) -> Option<&Phase> {
        self.phases.get(label)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn keys(&self) -> Keys<'_, Box<str>, Phase> {
        self.phases.keys()
    }

    /// Iterate over the labels and phases in declaration order
    pub fn iter(&self) -> Iter<'_, Box<str>, Phase> {
        self.phases.iter()
    }

    /// Find the first phase, in declaration order, whose signature matches `text`.
    /// `lowered` must be `text.to_lowercase()`.
    pub fn match_line(&self, text: &str, lowered: &str) -> Option<(&str, &Phase)> {
        self.phases
            .iter()
            .find(|(_, phase)| phase.signature.matches(text, lowered))
            .map(|(label, phase)| (label.as_ref(), phase))
    }

    /// The smallest checkpoint strictly greater than `current`, or 100 if there is none
    pub fn next_checkpoint(&self, current: u8) -> u8 {
        self.phases
            .values()
            .map(|phase| phase.checkpoint)
            .filter(|checkpoint| *checkpoint > current)
            .min()
            .unwrap_or(COMPLETE)
    }

    /// Lower-case every literal signature, see [`Signature`]
    pub fn normalize(&mut self) {
        for phase in self.phases.values_mut() {
            phase.signature.normalize();
        }
    }

    /// Check that every checkpoint lies in `[0, 100]`
    pub fn validate(&self) -> Result<(), PhaseTableError> {
        if self.initial_checkpoint > COMPLETE {
            return Err(PhaseTableError::CheckpointOutOfRange {
                label: "<initial>".to_string(),
                checkpoint: self.initial_checkpoint,
            });
        }
        for (label, phase) in self.iter() {
            if phase.checkpoint > COMPLETE {
                return Err(PhaseTableError::CheckpointOutOfRange {
                    label: label.to_string(),
                    checkpoint: phase.checkpoint,
                });
            }
        }
        Ok(())
    }

    #[cfg(feature = "serde")]
    /// Write the table out in JSON format to `writer`
    pub fn to_writer<W: Write>(&self, writer: W) -> serde_json::Result<()> {
        serde_json::to_writer(writer, self)
    }

    #[cfg(feature = "serde")]
    /// Read a table in JSON format from `reader`
    pub fn from_reader<R: Read>(reader: R) -> serde_json::Result<Self> {
        serde_json::from_reader(reader)
    }
}

/// Build a [`Regex`] that ignores case, for the format-agnostic markers
pub(crate) fn case_insensitive(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

#[cfg(test)]
mod test {
    use super::*;

    fn ladder() -> PhaseTable {
        PhaseTable::new()
            .phase("loading", Signature::starts_with("Loading"), 1)
            .phase("finished", Signature::starts_with("Finished"), 100)
            .phase("assembling", Signature::contains("elution groups"), 30)
            .phase("processing", Signature::starts_with("Processing"), 10)
    }

    #[test]
    fn test_next_checkpoint() {
        let table = ladder();
        assert_eq!(table.next_checkpoint(0), 1);
        assert_eq!(table.next_checkpoint(1), 10);
        assert_eq!(table.next_checkpoint(10), 30);
        assert_eq!(table.next_checkpoint(15), 30);
        assert_eq!(table.next_checkpoint(30), 100);
        assert_eq!(table.next_checkpoint(100), 100);
        assert_eq!(PhaseTable::new().next_checkpoint(40), 100);
    }

    #[test]
    fn test_next_checkpoint_never_regresses() {
        let table = ladder();
        for current in 0..=100u8 {
            let next = table.next_checkpoint(current);
            assert!(next > current || next == 100, "{current} -> {next}");
        }
    }

    #[test]
    fn test_match_in_declaration_order() {
        let table = PhaseTable::new()
            .phase("first", Signature::starts_with("Saving"), 90)
            .phase("second", Signature::starts_with("Saving spectral library"), 95);
        let text = "Saving spectral library to lib.speclib";
        let (label, phase) = table.match_line(text, &text.to_lowercase()).unwrap();
        assert_eq!(label, "first");
        assert_eq!(phase.checkpoint, 90);
    }

    #[test]
    fn test_signature_case() {
        let sig = Signature::starts_with("Loading FASTA");
        let text = "LOADING fasta uniprot.fasta";
        assert!(sig.matches(text, &text.to_lowercase()));

        let sig = Signature::pattern(r"^\d+ library precursors").unwrap();
        let text = "1234 Library precursors are potentially detectable";
        assert!(sig.matches(text, &text.to_lowercase()));
        assert!(!sig.matches("library precursors", "library precursors"));
    }

    #[test]
    fn test_normalize_direct_variants() {
        let mut table = PhaseTable::new();
        table.insert("loading", Phase::new(Signature::StartsWith("Loading FASTA".into()), 1));
        table.insert("groups", Phase::new(Signature::Contains("Elution Groups".into()), 10));
        table.normalize();
        let text = "Loading FASTA uniprot.fasta";
        assert_eq!(table.match_line(text, &text.to_lowercase()).unwrap().0, "loading");
        let text = "Assembling elution groups";
        assert_eq!(table.match_line(text, &text.to_lowercase()).unwrap().0, "groups");
        assert_eq!(table.get("loading").unwrap().signature, Signature::starts_with("Loading FASTA"));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            Signature::pattern("(unclosed"),
            Err(PhaseTableError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_validate() {
        let mut table = ladder();
        assert!(table.validate().is_ok());
        table.insert("bad", Phase::new(Signature::contains("x"), 120));
        assert!(matches!(
            table.validate(),
            Err(PhaseTableError::CheckpointOutOfRange { checkpoint: 120, .. })
        ));
        let clamped = PhaseTable::new().phase("x", Signature::contains("x"), 250);
        assert_eq!(clamped.get("x").unwrap().checkpoint, 100);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_json_round_trip_preserves_order() -> serde_json::Result<()> {
        let table = ladder()
            .per_file_phase("pass", Signature::pattern(r"^File #\d+").unwrap(), 5);
        let mut buffer = Vec::new();
        table.to_writer(&mut buffer)?;
        let restored = PhaseTable::from_reader(buffer.as_slice())?;
        assert_eq!(restored, table);
        let labels: Vec<_> = restored.keys().map(|k| k.as_ref()).collect();
        assert_eq!(labels, ["loading", "finished", "assembling", "processing", "pass"]);
        Ok(())
    }
}
