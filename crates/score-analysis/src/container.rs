//! The note arena and its per-pitch index.
//!
//! A [`ScoreContainer`] owns one onset-sorted `Vec<Note>` for its whole life.
//! Everything downstream (chords, regions, hand labels) holds [`NoteRef`]
//! handles into it instead of copies, so an edit made through one handle is
//! seen through all of them.
//!
//! Handles carry the generation of the arena they came from. Operations that
//! change the number of notes never touch the arena in place; they build a
//! new container with a fresh generation, and using an old handle against it
//! panics instead of silently reading the wrong note.

use std::sync::atomic::{AtomicU32, Ordering};

use tracing::{debug, warn};

use crate::interval::{DisjointIndex, IntervalSeq, OverlappingIndex};
use crate::note::{Hand, Note, PlainScore, SustainEvent};
use crate::{Error, Result};

/// Default minimum silence between repeated notes of one pitch (1/128 beat).
pub const DEFAULT_MIN_GAP: f64 = 1.0 / 128.0;

/// One lane per possible `u8` pitch value; only 21..=108 are expected.
const LANES: usize = 256;

static NEXT_GENERATION: AtomicU32 = AtomicU32::new(1);

/// Handle to a note inside one container generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NoteRef {
    index: u32,
    generation: u32,
}

impl NoteRef {
    /// Position in the arena (onset order).
    pub fn index(self) -> usize {
        self.index as usize
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

/// A requested offset change, applied after an analysis pass finishes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffsetEdit {
    pub note: NoteRef,
    pub offset: f64,
}

impl OffsetEdit {
    pub fn new(note: NoteRef, offset: f64) -> Self {
        Self { note, offset }
    }
}

/// The same-pitch notes of a container, viewed as an interval sequence.
#[derive(Debug, Clone, Copy)]
pub struct PitchLane<'a> {
    notes: &'a [Note],
    refs: &'a [NoteRef],
}

impl<'a> PitchLane<'a> {
    pub fn refs(&self) -> &'a [NoteRef] {
        self.refs
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// The note of this pitch sounding at `t`.
    pub fn at(&self, t: f64) -> Option<NoteRef> {
        DisjointIndex::new(self).at(t).map(|i| self.refs[i])
    }

    /// First note of this pitch starting strictly after `t`.
    pub fn first_after(&self, t: f64) -> Option<NoteRef> {
        DisjointIndex::new(self).first_after(t).map(|i| self.refs[i])
    }

    /// Last note of this pitch ending strictly before `t`.
    pub fn last_before(&self, t: f64) -> Option<NoteRef> {
        DisjointIndex::new(self).last_before(t).map(|i| self.refs[i])
    }

    pub fn nearest(&self, t: f64) -> Option<NoteRef> {
        DisjointIndex::new(self).nearest(t).map(|i| self.refs[i])
    }
}

impl IntervalSeq for PitchLane<'_> {
    fn len(&self) -> usize {
        self.refs.len()
    }

    fn onset_at(&self, index: usize) -> f64 {
        self.notes[self.refs[index].index()].onset
    }

    fn offset_at(&self, index: usize) -> f64 {
        self.notes[self.refs[index].index()].offset
    }
}

/// Owner of the sanitized note arena, the sustain list, and the per-pitch lanes.
#[derive(Debug)]
pub struct ScoreContainer {
    generation: u32,
    notes: Vec<Note>,
    sustains: Vec<SustainEvent>,
    lanes: Vec<Vec<NoteRef>>,
    /// Position of each arena note within its lane.
    lane_slots: Vec<u32>,
    min_gap: f64,
}

impl ScoreContainer {
    /// Build with the default 1/128-beat minimum gap.
    pub fn new(notes: Vec<Note>, sustains: Vec<SustainEvent>) -> Result<Self> {
        Self::build(notes, sustains, DEFAULT_MIN_GAP)
    }

    /// Sort, sanitize, and index a score.
    ///
    /// Only non-finite timestamps are rejected; everything else is repaired
    /// on a best-effort basis.
    pub fn build(notes: Vec<Note>, sustains: Vec<SustainEvent>, min_gap: f64) -> Result<Self> {
        for (index, note) in notes.iter().enumerate() {
            if !note.onset.is_finite() || !note.offset.is_finite() {
                return Err(Error::InvalidInput {
                    index,
                    reason: format!("note timestamps must be finite, got {}..{}", note.onset, note.offset),
                });
            }
        }
        for (index, sustain) in sustains.iter().enumerate() {
            if !sustain.onset.is_finite() || !sustain.offset.is_finite() {
                return Err(Error::InvalidInput {
                    index,
                    reason: format!(
                        "sustain timestamps must be finite, got {}..{}",
                        sustain.onset, sustain.offset
                    ),
                });
            }
        }

        let input_count = notes.len();
        let mut notes = notes;
        // Stable: equal onsets keep insertion order.
        notes.sort_by(|a, b| a.onset.total_cmp(&b.onset));

        let notes = sanitize_notes(notes, min_gap.max(0.0));
        let sustains = sanitize_sustains(sustains);

        debug!(
            input = input_count,
            kept = notes.len(),
            sustains = sustains.len(),
            "built score container"
        );

        Ok(Self::from_sanitized(notes, sustains, min_gap))
    }

    /// Index an arena that is already sorted and sanitized.
    fn from_sanitized(notes: Vec<Note>, sustains: Vec<SustainEvent>, min_gap: f64) -> Self {
        let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
        let mut lanes: Vec<Vec<NoteRef>> = vec![Vec::new(); LANES];
        let mut lane_slots = Vec::with_capacity(notes.len());

        for (index, note) in notes.iter().enumerate() {
            let lane = &mut lanes[note.pitch as usize];
            lane_slots.push(lane.len() as u32);
            lane.push(NoteRef {
                index: index as u32,
                generation,
            });
        }

        Self {
            generation,
            notes,
            sustains,
            lanes,
            lane_slots,
            min_gap,
        }
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn min_gap(&self) -> f64 {
        self.min_gap
    }

    /// The arena, in onset order.
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn sustains(&self) -> &[SustainEvent] {
        &self.sustains
    }

    /// Handles to every note, in onset order.
    pub fn refs(&self) -> impl Iterator<Item = NoteRef> + '_ {
        let generation = self.generation;
        (0..self.notes.len() as u32).map(move |index| NoteRef { index, generation })
    }

    /// Handle for the note at an arena position.
    pub fn ref_at(&self, index: usize) -> NoteRef {
        assert!(index < self.notes.len(), "arena index {index} out of range");
        NoteRef {
            index: index as u32,
            generation: self.generation,
        }
    }

    fn check(&self, note: NoteRef) {
        assert_eq!(
            note.generation, self.generation,
            "NoteRef from arena generation {} used against generation {}",
            note.generation, self.generation
        );
    }

    pub fn note(&self, note: NoteRef) -> &Note {
        self.check(note);
        &self.notes[note.index()]
    }

    pub fn note_mut(&mut self, note: NoteRef) -> &mut Note {
        self.check(note);
        &mut self.notes[note.index()]
    }

    /// All notes of one pitch, onset-sorted and non-overlapping.
    pub fn lane(&self, pitch: u8) -> PitchLane<'_> {
        PitchLane {
            notes: &self.notes,
            refs: &self.lanes[pitch as usize],
        }
    }

    /// The next note of the same pitch.
    pub fn next_in_lane(&self, note: NoteRef) -> Option<NoteRef> {
        self.check(note);
        let pitch = self.notes[note.index()].pitch;
        let slot = self.lane_slots[note.index()] as usize;
        self.lanes[pitch as usize].get(slot + 1).copied()
    }

    /// The previous note of the same pitch.
    pub fn prev_in_lane(&self, note: NoteRef) -> Option<NoteRef> {
        self.check(note);
        let pitch = self.notes[note.index()].pitch;
        let slot = self.lane_slots[note.index()] as usize;
        slot.checked_sub(1)
            .map(|prev| self.lanes[pitch as usize][prev])
    }

    /// Overlapping-interval lookups across every note.
    pub fn note_index(&self) -> OverlappingIndex<'_, [Note]> {
        OverlappingIndex::new(self.notes.as_slice())
    }

    /// Disjoint lookups over the sustain pedal.
    pub fn sustain_index(&self) -> DisjointIndex<'_, [SustainEvent]> {
        DisjointIndex::new(self.sustains.as_slice())
    }

    /// Copy everything out into plain lists, dropping every handle.
    pub fn to_plain_data(&self) -> PlainScore {
        PlainScore {
            notes: self.notes.clone(),
            sustains: self.sustains.clone(),
        }
    }

    /// A new container holding only the notes `keep` accepts.
    pub fn retain(&self, mut keep: impl FnMut(&Note) -> bool) -> Self {
        let notes: Vec<Note> = self.notes.iter().filter(|n| keep(n)).copied().collect();
        Self::from_sanitized(notes, self.sustains.clone(), self.min_gap)
    }

    /// Drop ghost notes: too short or too quiet to be intentional.
    pub fn remove_artifacts(&self, min_duration: f64, min_velocity: u8) -> Self {
        let cleaned = self.retain(|n| n.duration() >= min_duration && n.velocity >= min_velocity);
        debug!(
            removed = self.len() - cleaned.len(),
            "removed artifact notes"
        );
        cleaned
    }

    /// Combine several containers (e.g. tracks) into one new container.
    pub fn merge(parts: &[&ScoreContainer]) -> Result<Self> {
        let min_gap = parts.first().map_or(DEFAULT_MIN_GAP, |c| c.min_gap);
        let notes = parts.iter().flat_map(|c| c.notes.iter().copied()).collect();
        let sustains = parts.iter().flat_map(|c| c.sustains.iter().copied()).collect();
        Self::build(notes, sustains, min_gap)
    }

    /// Write hand labels into the channel scratch field.
    pub fn apply_hands(&mut self, labels: &[(NoteRef, Hand)]) {
        for &(note, hand) in labels {
            self.note_mut(note).channel = hand.channel();
        }
    }

    /// Overwrite the channel scratch field.
    pub fn apply_channels(&mut self, labels: &[(NoteRef, u8)]) {
        for &(note, channel) in labels {
            self.note_mut(note).channel = channel;
        }
    }

    /// Apply offset edits, keeping each pitch lane disjoint.
    ///
    /// An offset is kept at least `min_length` after its onset, then clamped
    /// to `min_gap` before the next same-pitch onset; the lane bound wins.
    /// Returns how many edits were clamped.
    pub fn apply_offsets(&mut self, edits: &[OffsetEdit], min_length: f64) -> usize {
        let mut clamped = 0;
        for edit in edits {
            let note = edit.note;
            let onset = self.note(note).onset;
            let ceiling = self
                .next_in_lane(note)
                .map(|next| self.notes[next.index()].onset - self.min_gap)
                .unwrap_or(f64::INFINITY);

            let mut offset = edit.offset.max(onset + min_length);
            if offset > ceiling {
                offset = ceiling;
            }
            if offset < onset {
                offset = onset;
            }
            if offset != edit.offset {
                clamped += 1;
            }
            if offset - onset < min_length {
                debug!(
                    pitch = self.note(note).pitch,
                    onset,
                    length = offset - onset,
                    min_length,
                    "offset held below minimum length by next same-pitch onset"
                );
            }
            self.notes[note.index()].offset = offset;
        }
        clamped
    }
}

/// Repair same-pitch notes that sit closer than `min_gap`.
///
/// For a pair (earlier A, later B) that is too close: a B wholly inside A is
/// absorbed into A; otherwise A is cut to end `min_gap` before B, or dropped
/// when the cut would leave nothing.
fn sanitize_notes(mut notes: Vec<Note>, min_gap: f64) -> Vec<Note> {
    let mut keep = vec![true; notes.len()];
    let mut last: Vec<Option<usize>> = vec![None; LANES];

    for i in 0..notes.len() {
        if notes[i].offset < notes[i].onset {
            warn!(
                pitch = notes[i].pitch,
                onset = notes[i].onset,
                "note ends before it starts; treating as zero length"
            );
            notes[i].offset = notes[i].onset;
        }

        let lane = notes[i].pitch as usize;
        if let Some(j) = last[lane] {
            let (a, b) = (notes[j], notes[i]);
            if b.onset - a.offset < min_gap {
                if b.offset <= a.offset {
                    keep[i] = false;
                    notes[j].velocity = a.velocity.max(b.velocity);
                    continue;
                }
                let trimmed = b.onset - min_gap;
                if trimmed <= a.onset {
                    keep[j] = false;
                } else {
                    notes[j].offset = trimmed;
                }
            }
        }
        last[lane] = Some(i);
    }

    notes
        .into_iter()
        .zip(keep)
        .filter_map(|(note, keep)| keep.then_some(note))
        .collect()
}

/// Sort pedal intervals and coalesce overlapping ones.
fn sanitize_sustains(mut sustains: Vec<SustainEvent>) -> Vec<SustainEvent> {
    sustains.sort_by(|a, b| a.onset.total_cmp(&b.onset));

    let mut merged: Vec<SustainEvent> = Vec::with_capacity(sustains.len());
    for mut sustain in sustains {
        sustain.offset = sustain.offset.max(sustain.onset);
        match merged.last_mut() {
            Some(prev) if sustain.onset < prev.offset => {
                prev.offset = prev.offset.max(sustain.offset);
            }
            _ => merged.push(sustain),
        }
    }
    merged
}
