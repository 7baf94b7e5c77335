//! Tunables for the analysis passes.
//!
//! Every field has a compiled default matching the values the algorithms
//! were tuned with; config files only need to name what they change.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ingestion sanitation of the note arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanitizeConfig {
    /// Minimum silence between two notes of the same pitch, in beats.
    /// Default: 1/128
    #[serde(default = "SanitizeConfig::default_min_gap")]
    pub min_gap: f64,
}

impl SanitizeConfig {
    fn default_min_gap() -> f64 {
        1.0 / 128.0
    }
}

impl Default for SanitizeConfig {
    fn default() -> Self {
        Self {
            min_gap: Self::default_min_gap(),
        }
    }
}

/// Chord clustering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordConfig {
    /// Largest onset gap (beats) two neighbouring chords may have and still merge.
    /// Default: 0.1
    #[serde(default = "ChordConfig::default_merge_threshold")]
    pub merge_threshold: f64,

    /// Chords wider than this (semitones) are candidates for a hand split.
    /// Default: 12
    #[serde(default = "ChordConfig::default_single_hand_span")]
    pub single_hand_span: u8,

    /// Above this span a two-note chord is split too.
    /// Default: 18
    #[serde(default = "ChordConfig::default_wide_span")]
    pub wide_span: u8,
}

impl ChordConfig {
    fn default_merge_threshold() -> f64 {
        0.1
    }

    fn default_single_hand_span() -> u8 {
        12
    }

    fn default_wide_span() -> u8 {
        18
    }
}

impl Default for ChordConfig {
    fn default() -> Self {
        Self {
            merge_threshold: Self::default_merge_threshold(),
            single_hand_span: Self::default_single_hand_span(),
            wide_span: Self::default_wide_span(),
        }
    }
}

/// Hand assignment decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandConfig {
    /// Softness of the pitch-range prior, in semitones.
    /// Default: 7
    #[serde(default = "HandConfig::default_spread")]
    pub spread: f64,

    /// Width of the running-average window, in beats.
    /// Default: 4
    #[serde(default = "HandConfig::default_window")]
    pub window: f64,
}

impl HandConfig {
    fn default_spread() -> f64 {
        7.0
    }

    fn default_window() -> f64 {
        4.0
    }
}

impl Default for HandConfig {
    fn default() -> Self {
        Self {
            spread: Self::default_spread(),
            window: Self::default_window(),
        }
    }
}

/// Which downbeat walk to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownbeatStrategy {
    /// Gaussian-weighted base-note scoring over chord windows.
    #[default]
    ChordWeighted,
    /// Walk sustain-bounded region onsets on the baseline grid.
    SustainRegions,
}

impl DownbeatStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChordWeighted => "chord_weighted",
            Self::SustainRegions => "sustain_regions",
        }
    }
}

impl fmt::Display for DownbeatStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DownbeatStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chord_weighted" => Ok(Self::ChordWeighted),
            "sustain_regions" => Ok(Self::SustainRegions),
            other => Err(format!("unknown downbeat strategy '{other}'")),
        }
    }
}

/// Rhythmic structure inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RhythmConfig {
    /// Golden-section search tolerance.
    /// Default: 1e-5
    #[serde(default = "RhythmConfig::default_tolerance")]
    pub tolerance: f64,

    /// Union note durations into the baseline samples.
    /// Default: false
    #[serde(default)]
    pub include_note_durations: bool,

    #[serde(default)]
    pub strategy: DownbeatStrategy,
}

impl RhythmConfig {
    fn default_tolerance() -> f64 {
        1e-5
    }
}

impl Default for RhythmConfig {
    fn default() -> Self {
        Self {
            tolerance: Self::default_tolerance(),
            include_note_durations: false,
            strategy: DownbeatStrategy::default(),
        }
    }
}

/// Resolution strategy for pedal-ambiguous note offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizePolicy {
    /// Keep pedal-driven sustain; offsets may grow to the pedal release.
    #[default]
    AcousticResult,
    /// Snap offsets to the next chord for a readable score.
    NotesDisplay,
}

impl NormalizePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AcousticResult => "acoustic_result",
            Self::NotesDisplay => "notes_display",
        }
    }
}

impl fmt::Display for NormalizePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NormalizePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "acoustic_result" | "acoustic" => Ok(Self::AcousticResult),
            "notes_display" | "display" => Ok(Self::NotesDisplay),
            other => Err(format!("unknown normalize policy '{other}'")),
        }
    }
}

/// Duration normalization against sustain pedal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizeConfig {
    #[serde(default)]
    pub policy: NormalizePolicy,

    /// Distance (beats) within which a near-miss counts as landing on a pedal boundary.
    /// Default: 0.25
    #[serde(default = "NormalizeConfig::default_margin")]
    pub margin: f64,

    /// Shortest note the normalizer will produce, in beats.
    /// Default: 1/64
    #[serde(default = "NormalizeConfig::default_min_length")]
    pub min_length: f64,

    /// Write a debug tag into the channel of ambiguous notes.
    /// Default: false
    #[serde(default)]
    pub tag_ambiguous: bool,
}

impl NormalizeConfig {
    fn default_margin() -> f64 {
        0.25
    }

    fn default_min_length() -> f64 {
        1.0 / 64.0
    }
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            policy: NormalizePolicy::default(),
            margin: Self::default_margin(),
            min_length: Self::default_min_length(),
            tag_ambiguous: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_parses_short_and_long_names() {
        assert_eq!("display".parse::<NormalizePolicy>(), Ok(NormalizePolicy::NotesDisplay));
        assert_eq!(
            "acoustic_result".parse::<NormalizePolicy>(),
            Ok(NormalizePolicy::AcousticResult)
        );
        assert!("loud".parse::<NormalizePolicy>().is_err());
    }

    #[test]
    fn strategy_round_trips_through_display() {
        for strategy in [DownbeatStrategy::ChordWeighted, DownbeatStrategy::SustainRegions] {
            assert_eq!(strategy.to_string().parse::<DownbeatStrategy>(), Ok(strategy));
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        assert_eq!(SanitizeConfig::default().min_gap, 0.0078125);
        assert_eq!(NormalizeConfig::default().min_length, 0.015625);
        assert_eq!(ChordConfig::default().merge_threshold, 0.1);
        assert_eq!(HandConfig::default().spread, 7.0);
    }
}
