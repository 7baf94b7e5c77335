use scoreconf::ScoreConfig;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::chords::{make_chords, make_single_handed_chords, Chord};
use crate::container::ScoreContainer;
use crate::hands::{HandAssigner, HandAssignment, ViterbiHands};
use crate::key::{key_signature, KeySignature, SemitoneProfile};
use crate::normalize::{normalize_durations, NormalizeReport};
use crate::note::{Hand, PlainScore};
use crate::regions::{regions, RegionSpan};
use crate::rhythm::{downbeats, BarGrid};
use crate::Result;

/// One chord, flattened for output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordSummary {
    pub onset: f64,
    pub last_onset: f64,
    pub pitches: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hand: Option<Hand>,
}

impl ChordSummary {
    pub fn new(container: &ScoreContainer, chord: &Chord, hand: Option<Hand>) -> Self {
        Self {
            onset: chord.onset(),
            last_onset: chord.last_onset(),
            pitches: chord.notes().iter().map(|&n| container.note(n).pitch).collect(),
            hand,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandCounts {
    pub left: usize,
    pub right: usize,
}

/// Everything one analysis pass learned about a score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreAnalysis {
    pub notes: usize,
    pub sustains: usize,
    /// Single-handed chords with their decoded hands.
    pub chords: Vec<ChordSummary>,
    pub hands: HandCounts,
    pub hand_cost: f64,
    pub key: KeySignature,
    pub key_name: String,
    pub semitone_profile: SemitoneProfile,
    pub regions: Vec<RegionSpan>,
    pub bar_grid: BarGrid,
    pub normalization: NormalizeReport,
}

/// Sanitize and index a plain score with the configured minimum gap.
pub fn build_container(score: PlainScore, config: &ScoreConfig) -> Result<ScoreContainer> {
    ScoreContainer::build(score.notes, score.sustains, config.sanitize.min_gap)
}

/// Decode hands for the container and write them into each note's channel.
pub fn label_hands(
    container: &mut ScoreContainer,
    config: &ScoreConfig,
    assigner: &dyn HandAssigner,
) -> (Vec<Chord>, HandAssignment) {
    let chords = make_single_handed_chords(container, &config.chords);
    let assignment = assigner.assign(container, &chords);
    container.apply_hands(&assignment.labels);
    (chords, assignment)
}

/// Run the full pipeline with the default Viterbi hand decoder.
pub fn analyze(container: &mut ScoreContainer, config: &ScoreConfig) -> ScoreAnalysis {
    analyze_with(container, config, &ViterbiHands::from_config(&config.hands))
}

/// Run the full pipeline: chords, hands, key, regions, bar grid, then
/// duration normalization written back into the container.
pub fn analyze_with(
    container: &mut ScoreContainer,
    config: &ScoreConfig,
    assigner: &dyn HandAssigner,
) -> ScoreAnalysis {
    let chords = make_chords(container, config.chords.merge_threshold);

    let (hand_chords, assignment) = label_hands(container, config, assigner);
    let chord_summaries = hand_chords
        .iter()
        .enumerate()
        .map(|(i, chord)| ChordSummary::new(container, chord, assignment.hands.get(i).copied()))
        .collect();

    let (key, semitone_profile) = key_signature(container, &chords);
    let regions = regions(container);
    let bar_grid = downbeats(container, &chords, &regions, &config.rhythm);
    let region_spans = regions.iter().map(|r| r.span()).collect();

    let normalization = normalize_durations(container, &chords, &config.normalize);

    let analysis = ScoreAnalysis {
        notes: container.len(),
        sustains: container.sustains().len(),
        chords: chord_summaries,
        hands: HandCounts {
            left: assignment.count(Hand::Left),
            right: assignment.count(Hand::Right),
        },
        hand_cost: assignment.cost,
        key,
        key_name: key.name(),
        semitone_profile,
        regions: region_spans,
        bar_grid,
        normalization,
    };

    info!(
        notes = analysis.notes,
        chords = analysis.chords.len(),
        key = %analysis.key_name,
        "analyzed score"
    );
    analysis
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::{Note, SustainEvent};

    fn sample_score() -> PlainScore {
        let mut notes = Vec::new();
        // Left hand bass on each beat, right hand C major melody on the offbeats.
        let melody = [60, 62, 64, 65, 67, 69, 71, 72];
        for (i, &pitch) in melody.iter().enumerate() {
            let t = i as f64;
            notes.push(Note::new(t, t + 0.45, 36 + (i % 2) as u8 * 7, 70));
            notes.push(Note::new(t + 0.5, t + 0.95, pitch + 12, 80));
        }
        let sustains = vec![SustainEvent::new(0.0, 3.9), SustainEvent::new(4.0, 7.9)];
        PlainScore::new(notes, sustains)
    }

    #[test]
    fn full_pipeline_on_a_small_piece() {
        let config = ScoreConfig::default();
        let mut container = build_container(sample_score(), &config).unwrap();
        let analysis = analyze(&mut container, &config);

        assert_eq!(analysis.notes, 16);
        assert_eq!(analysis.sustains, 2);
        assert_eq!(analysis.chords.len(), 16);
        assert_eq!(analysis.hands, HandCounts { left: 8, right: 8 });
        assert_eq!(analysis.key, KeySignature::NATURAL);
        assert_eq!(analysis.regions.len(), 2);
        assert!(analysis.bar_grid.bar_length.is_some());
        assert!(analysis.normalization.changed > 0);

        let json = serde_json::to_string(&analysis).unwrap();
        assert!(json.contains("\"key_name\":\"C major\""));
    }

    #[test]
    fn hands_are_written_into_channels() {
        let config = ScoreConfig::default();
        let mut container = build_container(sample_score(), &config).unwrap();
        label_hands(&mut container, &config, &ViterbiHands::default());

        for note in container.notes() {
            let expected = if note.pitch < 60 { Hand::Left } else { Hand::Right };
            assert_eq!(Hand::from_channel(note.channel), Some(expected), "{note:?}");
        }
    }

    #[test]
    fn empty_score_gives_neutral_analysis() {
        let config = ScoreConfig::default();
        let mut container = build_container(PlainScore::default(), &config).unwrap();
        let analysis = analyze(&mut container, &config);

        assert!(analysis.chords.is_empty());
        assert_eq!(analysis.key, KeySignature::NATURAL);
        assert!(analysis.bar_grid.downbeats.is_empty());
        assert_eq!(analysis.normalization.changed, 0);
    }
}
