use std::collections::VecDeque;

use scoreconf::ChordConfig;
use tracing::debug;

use crate::container::{NoteRef, ScoreContainer};

/// A cluster of near-simultaneous notes played as one unit.
///
/// Notes are kept in arena order, which is onset order.
#[derive(Debug, Clone, PartialEq)]
pub struct Chord {
    notes: Vec<NoteRef>,
    /// Onset of the earliest not-yet-absorbed repeat of any member pitch.
    /// A chord may not grow past it.
    max_offset: Option<f64>,
    onset: f64,
    last_onset: f64,
}

impl Chord {
    fn seed(container: &ScoreContainer, note: NoteRef) -> Self {
        let onset = container.note(note).onset;
        let max_offset = container
            .next_in_lane(note)
            .map(|next| container.note(next).onset);
        Self {
            notes: vec![note],
            max_offset,
            onset,
            last_onset: onset,
        }
    }

    fn from_parts(container: &ScoreContainer, notes: Vec<NoteRef>, max_offset: Option<f64>) -> Self {
        let onset = container.note(notes[0]).onset;
        let last_onset = container.note(notes[notes.len() - 1]).onset;
        Self {
            notes,
            max_offset,
            onset,
            last_onset,
        }
    }

    pub fn notes(&self) -> &[NoteRef] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Onset of the leading note.
    pub fn onset(&self) -> f64 {
        self.onset
    }

    /// Onset of the trailing note.
    pub fn last_onset(&self) -> f64 {
        self.last_onset
    }

    pub fn max_offset(&self) -> Option<f64> {
        self.max_offset
    }

    pub fn first(&self) -> NoteRef {
        self.notes[0]
    }

    pub fn last(&self) -> NoteRef {
        self.notes[self.notes.len() - 1]
    }

    /// Lowest-pitched member; the earliest wins a tie.
    pub fn lowest(&self, container: &ScoreContainer) -> NoteRef {
        let mut best = self.notes[0];
        for &note in &self.notes[1..] {
            if container.note(note).pitch < container.note(best).pitch {
                best = note;
            }
        }
        best
    }

    /// Highest-pitched member; the earliest wins a tie.
    pub fn highest(&self, container: &ScoreContainer) -> NoteRef {
        let mut best = self.notes[0];
        for &note in &self.notes[1..] {
            if container.note(note).pitch > container.note(best).pitch {
                best = note;
            }
        }
        best
    }

    /// Distance in semitones between the lowest and highest member.
    pub fn span(&self, container: &ScoreContainer) -> u8 {
        container.note(self.highest(container)).pitch - container.note(self.lowest(container)).pitch
    }

    pub fn mean_pitch(&self, container: &ScoreContainer) -> f64 {
        let total: f64 = self
            .notes
            .iter()
            .map(|&n| container.note(n).pitch as f64)
            .sum();
        total / self.notes.len() as f64
    }

    /// Whether `right` may be absorbed into `self`.
    fn can_merge(&self, right: &Chord, threshold: f64) -> bool {
        let below_limit = self.max_offset.map_or(true, |limit| right.last_onset < limit);
        below_limit && right.onset - self.last_onset <= threshold
    }

    fn absorb(&mut self, right: Chord) {
        self.notes.extend(right.notes);
        self.last_onset = right.last_onset;
        self.max_offset = match (self.max_offset, right.max_offset) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
    }
}

/// Cluster the container's notes into chords.
///
/// Greedy right-merge over a linked list of chords. A chord only ever
/// absorbs its right neighbour; when its left neighbour is the better
/// match it waits for that neighbour to absorb it on a later pop.
pub fn make_chords(container: &ScoreContainer, threshold: f64) -> Vec<Chord> {
    let mut chords: Vec<Option<Chord>> = container
        .refs()
        .map(|note| Some(Chord::seed(container, note)))
        .collect();
    let count = chords.len();
    if count == 0 {
        return Vec::new();
    }

    let mut prev: Vec<Option<usize>> = (0..count).map(|i| i.checked_sub(1)).collect();
    let mut next: Vec<Option<usize>> = (0..count).map(|i| (i + 1 < count).then_some(i + 1)).collect();
    let mut queue: VecDeque<usize> = (0..count).collect();
    let mut merges = 0usize;

    while let Some(c) = queue.pop_front() {
        let Some(current) = chords[c].as_ref() else {
            continue;
        };

        let right = next[c].and_then(|r| chords[r].as_ref().map(|chord| (r, chord)));
        let left = prev[c].and_then(|l| chords[l].as_ref());

        let Some((r, right_chord)) = right else {
            continue;
        };
        if !current.can_merge(right_chord, threshold) {
            continue;
        }

        let right_gap = right_chord.onset - current.last_onset;
        let prefer_right = match left {
            Some(left_chord) if left_chord.can_merge(current, threshold) => {
                right_gap < current.onset - left_chord.last_onset
            }
            _ => true,
        };
        if !prefer_right {
            continue;
        }

        let Some(absorbed) = chords[r].take() else {
            continue;
        };
        if let Some(current) = chords[c].as_mut() {
            current.absorb(absorbed);
        }
        next[c] = next[r];
        if let Some(after) = next[r] {
            prev[after] = Some(c);
        }
        merges += 1;
        queue.push_back(c);
    }

    let chords: Vec<Chord> = chords.into_iter().flatten().collect();
    debug!(notes = count, merges, chords = chords.len(), "clustered chords");
    chords
}

/// Cluster into chords, then split any chord one hand cannot reach.
pub fn make_single_handed_chords(container: &ScoreContainer, config: &ChordConfig) -> Vec<Chord> {
    let chords = make_chords(container, config.merge_threshold);
    split_wide_chords(container, chords, config.single_hand_span, config.wide_span)
}

/// Split chords wider than `span` semitones (two-note chords only above `wide_span`).
///
/// The lowest and highest notes anchor the two halves; every other note
/// joins the anchor nearer in pitch, the lower one on a tie.
pub fn split_wide_chords(
    container: &ScoreContainer,
    chords: Vec<Chord>,
    span: u8,
    wide_span: u8,
) -> Vec<Chord> {
    let mut out = Vec::with_capacity(chords.len());
    let mut splits = 0usize;

    for chord in chords {
        let width = chord.span(container);
        if width <= span || (width <= wide_span && chord.len() <= 2) {
            out.push(chord);
            continue;
        }

        let low = container.note(chord.lowest(container)).pitch as i32;
        let high = container.note(chord.highest(container)).pitch as i32;
        let (mut left, mut right) = (Vec::new(), Vec::new());
        for &note in chord.notes() {
            let pitch = container.note(note).pitch as i32;
            if pitch - low <= high - pitch {
                left.push(note);
            } else {
                right.push(note);
            }
        }

        splits += 1;
        out.push(Chord::from_parts(container, left, chord.max_offset));
        out.push(Chord::from_parts(container, right, chord.max_offset));
    }

    out.sort_by(|a, b| a.onset.total_cmp(&b.onset));
    if splits > 0 {
        debug!(splits, "split wide chords");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::Note;

    fn make_note(onset: f64, pitch: u8) -> Note {
        Note::new(onset, onset + 0.5, pitch, 64)
    }

    fn container(notes: Vec<Note>) -> ScoreContainer {
        ScoreContainer::new(notes, vec![]).unwrap()
    }

    fn pitches(container: &ScoreContainer, chord: &Chord) -> Vec<u8> {
        chord.notes().iter().map(|&n| container.note(n).pitch).collect()
    }

    #[test]
    fn near_notes_merge_and_far_notes_do_not() {
        let score = container(vec![make_note(0.0, 60), make_note(0.02, 64), make_note(5.0, 67)]);
        let chords = make_chords(&score, 0.1);

        assert_eq!(chords.len(), 2);
        assert_eq!(pitches(&score, &chords[0]), vec![60, 64]);
        assert_eq!(chords[0].onset(), 0.0);
        assert_eq!(pitches(&score, &chords[1]), vec![67]);
        assert_eq!(chords[1].onset(), 5.0);
    }

    #[test]
    fn gap_just_over_threshold_stays_apart() {
        let score = container(vec![make_note(0.0, 60), make_note(0.15, 64)]);
        assert_eq!(make_chords(&score, 0.1).len(), 2);
    }

    #[test]
    fn chains_within_threshold_collapse() {
        let score = container(vec![make_note(0.0, 60), make_note(0.08, 64), make_note(0.16, 67)]);
        let chords = make_chords(&score, 0.1);
        assert_eq!(chords.len(), 1, "single linkage joins the whole run");
        assert_eq!(chords[0].last_onset(), 0.16);
    }

    #[test]
    fn repeated_pitch_blocks_a_merge() {
        let score = container(vec![
            Note::new(0.0, 0.02, 60, 64),
            Note::new(0.05, 0.5, 60, 64),
        ]);
        let chords = make_chords(&score, 0.1);
        assert_eq!(chords.len(), 2, "a chord may not hold the same key twice");
        assert_eq!(chords[0].max_offset(), Some(0.05));
    }

    #[test]
    fn merged_chord_keeps_growing_right() {
        // The first merge is re-queued and later absorbs the third note.
        let score = container(vec![make_note(0.0, 60), make_note(0.08, 64), make_note(0.11, 67)]);
        let chords = make_chords(&score, 0.1);
        assert_eq!(chords.len(), 1);
        assert_eq!(pitches(&score, &chords[0]), vec![60, 64, 67]);
    }

    #[test]
    fn empty_container_has_no_chords() {
        let score = container(vec![]);
        assert!(make_chords(&score, 0.1).is_empty());
    }

    #[test]
    fn wide_chord_splits_between_anchors() {
        let score = container(vec![
            make_note(0.0, 48),
            make_note(0.0, 64),
            make_note(0.0, 79),
            make_note(0.0, 84),
        ]);
        let chords = make_single_handed_chords(&score, &ChordConfig::default());

        assert_eq!(chords.len(), 2);
        assert_eq!(pitches(&score, &chords[0]), vec![48, 64]);
        assert_eq!(pitches(&score, &chords[1]), vec![79, 84]);
    }

    #[test]
    fn split_needs_three_notes_below_wide_span() {
        let config = ChordConfig::default();

        let dyad = container(vec![make_note(0.0, 60), make_note(0.0, 75)]);
        assert_eq!(make_single_handed_chords(&dyad, &config).len(), 1);

        let triad = container(vec![make_note(0.0, 60), make_note(0.0, 64), make_note(0.0, 75)]);
        assert_eq!(make_single_handed_chords(&triad, &config).len(), 2);

        let wide_dyad = container(vec![make_note(0.0, 40), make_note(0.0, 60)]);
        assert_eq!(make_single_handed_chords(&wide_dyad, &config).len(), 2);
    }

    #[test]
    fn equidistant_note_joins_the_left() {
        let score = container(vec![make_note(0.0, 40), make_note(0.0, 50), make_note(0.0, 60)]);
        let chords = make_single_handed_chords(&score, &ChordConfig::default());
        assert_eq!(pitches(&score, &chords[0]), vec![40, 50]);
        assert_eq!(pitches(&score, &chords[1]), vec![60]);
    }
}
