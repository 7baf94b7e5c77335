//! Structural analysis of piano scores.
//!
//! A [`ScoreContainer`] holds the sanitized notes and sustain pedal of one
//! score. Everything else derives from it: chords, hand labels, key
//! signature, sustain regions, bar length and downbeats, and pedal-aware
//! duration correction. [`analyze`] runs the whole pipeline.

pub mod analyzer;
pub mod chords;
pub mod container;
pub mod features;
pub mod hands;
pub mod interval;
pub mod key;
pub mod normalize;
pub mod note;
pub mod regions;
pub mod rhythm;
pub mod running_average;
pub mod smf;

pub use analyzer::{analyze, analyze_with, build_container, label_hands, ChordSummary, HandCounts, ScoreAnalysis};
pub use chords::{make_chords, make_single_handed_chords, Chord};
pub use container::{NoteRef, OffsetEdit, PitchLane, ScoreContainer, DEFAULT_MIN_GAP};
pub use features::{extract_features, note_features, FeatureScaling, NoteFeatures, FEATURE_COUNT};
pub use hands::{HandAssigner, HandAssignment, HandBoundary, ViterbiHands};
pub use interval::{DisjointIndex, Interval, IntervalSeq, OverlappingIndex};
pub use key::{key_signature, Accidental, KeySignature, SemitoneProfile};
pub use normalize::{normalize_durations, plan_normalization, NormalizeCase, NormalizePlan, NormalizeReport};
pub use note::{Hand, Note, PlainScore, SustainEvent, PITCH_MAX, PITCH_MIN};
pub use regions::{regions, Region, RegionSpan};
pub use rhythm::{baseline_bar_length, downbeats, golden_section_minimize, BarGrid};
pub use running_average::{PitchSample, RunningAverage};
pub use smf::{read_file, read_tracks, write_file, write_tracks, MidiScore};

/// Errors from score analysis operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid input at index {index}: {reason}")]
    InvalidInput { index: usize, reason: String },

    #[error("MIDI parse error: {0}")]
    MidiParse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
