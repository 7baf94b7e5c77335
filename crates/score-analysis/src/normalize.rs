//! Note-offset correction against the sustain pedal.
//!
//! Recorded offsets say when a key came up, not when the sound stopped. Each
//! note (except those in the last chord) is classified by where its onset and
//! offset fall relative to the pedal intervals, and the policy decides what
//! the offset becomes for that case.
//!
//! Cases are decided per pedal press, not per [`crate::regions::Region`]: a
//! region can span several presses once a held note joins them, and the
//! target offset depends on the exact press.

use std::collections::BTreeMap;

use scoreconf::{NormalizeConfig, NormalizePolicy};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::chords::Chord;
use crate::container::{NoteRef, OffsetEdit, ScoreContainer};
use crate::interval::DisjointIndex;
use crate::note::{Note, SustainEvent};

/// Channel written into ambiguous notes when tagging is on.
pub const AMBIGUOUS_CHANNEL: u8 = 15;

/// Where a note sits relative to the pedal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizeCase {
    /// Onset and offset under the same pedal press.
    SameSustain,
    /// Offset under the press right after the onset's.
    AdjacentSustains,
    /// Offset two or more presses after the onset's.
    StraddlesSustains,
    /// Onset pedaled, offset dry.
    OnsetOnly,
    /// Onset pedaled, offset just misses a press.
    OnsetWithNearOffset,
    /// Onset dry, offset pedaled.
    OffsetOnly,
    /// Onset dry, offset just misses a press.
    NearOffsetOnly,
    /// No pedal involvement.
    Dry,
    /// Zero-length or malformed note.
    Degenerate,
}

impl NormalizeCase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SameSustain => "same_sustain",
            Self::AdjacentSustains => "adjacent_sustains",
            Self::StraddlesSustains => "straddles_sustains",
            Self::OnsetOnly => "onset_only",
            Self::OnsetWithNearOffset => "onset_with_near_offset",
            Self::OffsetOnly => "offset_only",
            Self::NearOffsetOnly => "near_offset_only",
            Self::Dry => "dry",
            Self::Degenerate => "degenerate",
        }
    }
}

impl std::fmt::Display for NormalizeCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A note's case plus the pedal press that decides its new offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub case: NormalizeCase,
    pub sustain: Option<usize>,
}

impl Classification {
    fn new(case: NormalizeCase, sustain: Option<usize>) -> Self {
        Self { case, sustain }
    }
}

/// Classify one note against onset-sorted, disjoint pedal intervals.
///
/// An onset up to `margin` before a press counts as pedaled by it. An
/// offset within `margin` of either edge of a press counts as near it.
pub fn classify(note: &Note, sustains: &[SustainEvent], margin: f64) -> Classification {
    if !(note.onset.is_finite() && note.offset.is_finite()) || note.offset <= note.onset {
        return Classification::new(NormalizeCase::Degenerate, None);
    }

    let index = DisjointIndex::new(sustains);
    let onset_sustain = index.at(note.onset).or_else(|| {
        index
            .first_after(note.onset)
            .filter(|&i| sustains[i].onset - note.onset <= margin)
    });
    let offset_sustain = index.at(note.offset);
    let near_sustain = || {
        index.nearest(note.offset).filter(|&i| {
            let s = &sustains[i];
            (s.onset - note.offset).abs() <= margin || (note.offset - s.offset).abs() <= margin
        })
    };

    use NormalizeCase::*;
    match (onset_sustain, offset_sustain) {
        (Some(on), Some(off)) if off <= on => Classification::new(SameSustain, Some(off)),
        (Some(on), Some(off)) if off == on + 1 => Classification::new(AdjacentSustains, Some(off)),
        (Some(_), Some(off)) => Classification::new(StraddlesSustains, Some(off)),
        (Some(_), None) => match near_sustain() {
            Some(near) => Classification::new(OnsetWithNearOffset, Some(near)),
            None => Classification::new(OnsetOnly, None),
        },
        (None, Some(off)) => Classification::new(OffsetOnly, Some(off)),
        (None, None) => match near_sustain() {
            Some(near) => Classification::new(NearOffsetOnly, Some(near)),
            None => Classification::new(Dry, None),
        },
    }
}

/// Target offset for a classified note, and whether the choice is ambiguous.
///
/// `next` is the onset of the following chord.
pub fn resolve(
    note: &Note,
    class: Classification,
    sustains: &[SustainEvent],
    next: f64,
    config: &NormalizeConfig,
) -> (f64, bool) {
    use NormalizeCase::*;

    let pedal_end = class.sustain.map(|i| sustains[i].offset).unwrap_or(note.offset);
    let (offset, ambiguous) = match (config.policy, class.case) {
        (_, Degenerate) => (note.onset + config.min_length, false),
        (_, Dry) => (note.offset, false),

        (NormalizePolicy::AcousticResult, SameSustain | AdjacentSustains | OffsetOnly) => (pedal_end, false),
        (NormalizePolicy::AcousticResult, StraddlesSustains | OnsetWithNearOffset | NearOffsetOnly) => {
            (pedal_end, true)
        }
        (NormalizePolicy::AcousticResult, OnsetOnly) => (note.offset, false),

        (NormalizePolicy::NotesDisplay, StraddlesSustains) => (note.offset, false),
        (NormalizePolicy::NotesDisplay, OnsetOnly) => (note.offset.min(next), false),
        (
            NormalizePolicy::NotesDisplay,
            SameSustain | AdjacentSustains | OnsetWithNearOffset | OffsetOnly | NearOffsetOnly,
        ) => (next, false),
    };

    (offset.max(note.onset + config.min_length), ambiguous)
}

/// What a normalization pass did.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizeReport {
    pub policy: NormalizePolicy,
    pub cases: BTreeMap<NormalizeCase, usize>,
    /// Notes whose offset moved.
    pub changed: usize,
    /// Edits cut short to keep same-pitch notes apart.
    pub clamped: usize,
    /// Arena positions of notes whose case was ambiguous.
    pub ambiguous: Vec<usize>,
}

impl NormalizeReport {
    pub fn count(&self, case: NormalizeCase) -> usize {
        self.cases.get(&case).copied().unwrap_or(0)
    }
}

/// Planned edits, not yet written into the container.
#[derive(Debug, Clone, Default)]
pub struct NormalizePlan {
    pub edits: Vec<OffsetEdit>,
    pub tags: Vec<(NoteRef, u8)>,
    pub report: NormalizeReport,
}

/// Classify every note and decide its new offset without touching the arena.
pub fn plan_normalization(
    container: &ScoreContainer,
    chords: &[Chord],
    config: &NormalizeConfig,
) -> NormalizePlan {
    let sustains = container.sustains();
    let mut plan = NormalizePlan {
        report: NormalizeReport {
            policy: config.policy,
            ..NormalizeReport::default()
        },
        ..NormalizePlan::default()
    };

    for pair in chords.windows(2) {
        let next = pair[1].onset();
        for &note_ref in pair[0].notes() {
            let note = container.note(note_ref);
            let class = classify(note, sustains, config.margin);
            let (offset, ambiguous) = resolve(note, class, sustains, next, config);

            *plan.report.cases.entry(class.case).or_insert(0) += 1;
            if ambiguous {
                plan.report.ambiguous.push(note_ref.index());
                if config.tag_ambiguous {
                    plan.tags.push((note_ref, AMBIGUOUS_CHANNEL));
                }
            }
            if offset != note.offset {
                plan.edits.push(OffsetEdit::new(note_ref, offset));
            }
        }
    }

    plan
}

/// Correct note offsets in place and report what changed.
pub fn normalize_durations(
    container: &mut ScoreContainer,
    chords: &[Chord],
    config: &NormalizeConfig,
) -> NormalizeReport {
    let plan = plan_normalization(container, chords, config);
    let mut report = plan.report;

    report.clamped = container.apply_offsets(&plan.edits, config.min_length);
    report.changed = plan.edits.len();
    container.apply_channels(&plan.tags);

    for (case, count) in &report.cases {
        debug!(case = %case, count, "normalization case");
    }
    info!(
        policy = %config.policy,
        changed = report.changed,
        clamped = report.clamped,
        ambiguous = report.ambiguous.len(),
        "normalized durations"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chords::make_chords;

    fn make_note(onset: f64, offset: f64, pitch: u8) -> Note {
        Note::new(onset, offset, pitch, 64)
    }

    fn pedals(spans: &[(f64, f64)]) -> Vec<SustainEvent> {
        spans.iter().map(|&(a, b)| SustainEvent::new(a, b)).collect()
    }

    fn config(policy: NormalizePolicy) -> NormalizeConfig {
        NormalizeConfig {
            policy,
            ..NormalizeConfig::default()
        }
    }

    /// Normalize a note followed by a closing note at `next`; return the first note's offset.
    fn run(note: Note, next: f64, sustains: &[(f64, f64)], policy: NormalizePolicy) -> (f64, NormalizeReport) {
        let mut container =
            ScoreContainer::new(vec![note, make_note(next, next + 0.5, 90)], pedals(sustains)).unwrap();
        let chords = make_chords(&container, 0.1);
        let report = normalize_durations(&mut container, &chords, &config(policy));
        (container.notes()[0].offset, report)
    }

    #[test]
    fn classification_covers_each_case() {
        let sustains = pedals(&[(0.0, 2.0), (2.0, 4.0), (4.0, 6.0), (10.0, 12.0)]);
        let case = |onset, offset| classify(&make_note(onset, offset, 60), &sustains, 0.25).case;

        assert_eq!(case(0.5, 1.5), NormalizeCase::SameSustain);
        assert_eq!(case(1.5, 2.5), NormalizeCase::AdjacentSustains);
        assert_eq!(case(1.0, 4.5), NormalizeCase::StraddlesSustains);
        assert_eq!(case(5.0, 8.0), NormalizeCase::OnsetOnly);
        assert_eq!(case(5.0, 6.2), NormalizeCase::OnsetWithNearOffset);
        assert_eq!(case(7.0, 11.0), NormalizeCase::OffsetOnly);
        assert_eq!(case(7.0, 9.8), NormalizeCase::NearOffsetOnly);
        assert_eq!(case(7.0, 8.0), NormalizeCase::Dry);
        assert_eq!(case(7.0, 7.0), NormalizeCase::Degenerate);
        assert_eq!(case(9.9, 10.5), NormalizeCase::SameSustain, "onset just before a press counts");
    }

    #[test]
    fn classification_follows_the_press_not_the_region() {
        let notes = vec![
            make_note(0.0, 2.5, 40),
            make_note(0.5, 1.0, 64),
            make_note(2.2, 2.8, 67),
        ];
        let sustains = pedals(&[(0.0, 1.8), (2.0, 3.0)]);
        let container = ScoreContainer::new(notes, sustains.clone()).unwrap();
        assert_eq!(crate::regions::regions(&container).len(), 1);

        let short = classify(&container.notes()[1], &sustains, 0.25);
        assert_eq!(short, Classification::new(NormalizeCase::SameSustain, Some(0)));
        let late = classify(&container.notes()[2], &sustains, 0.25);
        assert_eq!(late, Classification::new(NormalizeCase::SameSustain, Some(1)));
    }

    #[test]
    fn acoustic_extends_to_pedal_release() {
        let (offset, report) = run(make_note(0.0, 0.5, 60), 1.0, &[(0.0, 2.0)], NormalizePolicy::AcousticResult);
        assert_eq!(offset, 2.0);
        assert_eq!(report.count(NormalizeCase::SameSustain), 1);
        assert_eq!(report.changed, 1);

        let (offset, _) = run(make_note(1.5, 2.5, 60), 3.0, &[(0.0, 2.0), (2.0, 4.0)], NormalizePolicy::AcousticResult);
        assert_eq!(offset, 4.0);
    }

    #[test]
    fn display_snaps_to_next_chord() {
        let (offset, _) = run(make_note(0.0, 0.5, 60), 1.0, &[(0.0, 2.0)], NormalizePolicy::NotesDisplay);
        assert_eq!(offset, 1.0);

        let (offset, _) = run(make_note(0.5, 3.0, 60), 2.0, &[(0.0, 1.0)], NormalizePolicy::NotesDisplay);
        assert_eq!(offset, 2.0, "onset-only notes are cut at the next chord");
    }

    #[test]
    fn straddling_is_ambiguous_under_acoustic_only() {
        let spans = [(0.0, 2.0), (2.0, 4.0), (4.0, 6.0)];
        let (offset, report) = run(make_note(1.0, 4.5, 60), 5.0, &spans, NormalizePolicy::AcousticResult);
        assert_eq!(offset, 6.0);
        assert_eq!(report.ambiguous, vec![0]);

        let (offset, report) = run(make_note(1.0, 4.5, 60), 5.0, &spans, NormalizePolicy::NotesDisplay);
        assert_eq!(offset, 4.5);
        assert!(report.ambiguous.is_empty());
        assert_eq!(report.changed, 0);
    }

    #[test]
    fn dry_notes_are_untouched() {
        let (offset, report) = run(make_note(0.0, 0.7, 60), 1.0, &[], NormalizePolicy::NotesDisplay);
        assert_eq!(offset, 0.7);
        assert_eq!(report.count(NormalizeCase::Dry), 1);
    }

    #[test]
    fn degenerate_notes_get_minimum_length() {
        let (offset, report) = run(make_note(0.0, 0.0, 60), 1.0, &[], NormalizePolicy::AcousticResult);
        assert_eq!(offset, 1.0 / 64.0);
        assert_eq!(report.count(NormalizeCase::Degenerate), 1);
    }

    #[test]
    fn pedal_extension_stops_before_the_next_repeat() {
        let mut container = ScoreContainer::new(
            vec![make_note(0.0, 0.5, 60), make_note(1.0, 1.5, 60), make_note(2.0, 2.5, 72)],
            pedals(&[(0.0, 3.0)]),
        )
        .unwrap();
        let chords = make_chords(&container, 0.1);
        let report = normalize_durations(&mut container, &chords, &config(NormalizePolicy::AcousticResult));

        assert_eq!(container.notes()[0].offset, 1.0 - container.min_gap());
        assert_eq!(report.clamped, 1);
        assert_eq!(container.notes()[2].offset, 2.5, "last chord is left alone");
    }

    #[test]
    fn ambiguous_notes_can_be_tagged() {
        let mut container = ScoreContainer::new(
            vec![make_note(0.2, 0.9, 60), make_note(2.0, 2.5, 72)],
            pedals(&[(1.0, 3.0)]),
        )
        .unwrap();
        let chords = make_chords(&container, 0.1);
        let config = NormalizeConfig {
            tag_ambiguous: true,
            ..NormalizeConfig::default()
        };
        let report = normalize_durations(&mut container, &chords, &config);

        assert_eq!(report.count(NormalizeCase::NearOffsetOnly), 1);
        assert_eq!(container.notes()[0].channel, AMBIGUOUS_CHANNEL);
        assert_eq!(container.notes()[0].offset, 3.0);
    }
}
