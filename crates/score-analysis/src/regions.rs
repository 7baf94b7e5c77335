use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::container::{NoteRef, ScoreContainer};
use crate::interval::Interval;

/// A run of notes bounded by sustain-pedal presses.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub onset: f64,
    pub offset: f64,
    pub notes: Vec<NoteRef>,
}

impl Region {
    pub fn duration(&self) -> f64 {
        self.offset - self.onset
    }

    pub fn span(&self) -> RegionSpan {
        RegionSpan {
            onset: self.onset,
            offset: self.offset,
            notes: self.notes.len(),
        }
    }
}

impl Interval for Region {
    fn onset(&self) -> f64 {
        self.onset
    }

    fn offset(&self) -> f64 {
        self.offset
    }
}

/// Serializable summary of a [`Region`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionSpan {
    pub onset: f64,
    pub offset: f64,
    pub notes: usize,
}

/// Segment the container's notes into sustain-bounded regions.
///
/// Walking notes from the latest offset backwards, each time a note ends
/// before the current pedal press the group counter steps back past that
/// press. Group ids are then flipped to run forwards in time, and a pass in
/// onset order keeps any note from falling back into an earlier group than
/// one already seen.
pub fn regions(container: &ScoreContainer) -> Vec<Region> {
    let notes = container.notes();
    if notes.is_empty() {
        return Vec::new();
    }
    let sustains = container.sustains();

    let mut by_offset: Vec<usize> = (0..notes.len()).collect();
    by_offset.sort_by(|&a, &b| notes[b].offset.total_cmp(&notes[a].offset));

    let mut ids = vec![0usize; notes.len()];
    let mut pedal = sustains.len();
    let mut group = 0usize;
    for &i in &by_offset {
        while pedal > 0 && notes[i].offset < sustains[pedal - 1].onset {
            pedal -= 1;
            group += 1;
        }
        ids[i] = group;
    }

    // Arena order is onset order.
    let mut floor = 0usize;
    for id in ids.iter_mut() {
        *id = (group - *id).max(floor);
        floor = *id;
    }

    let mut out: Vec<Region> = Vec::new();
    let mut current_id = None;
    for (i, &id) in ids.iter().enumerate() {
        let note = &notes[i];
        let note_ref = container.ref_at(i);
        match out.last_mut() {
            Some(region) if current_id == Some(id) => {
                region.onset = region.onset.min(note.onset);
                region.offset = region.offset.max(note.offset);
                region.notes.push(note_ref);
            }
            _ => {
                out.push(Region {
                    onset: note.onset,
                    offset: note.offset,
                    notes: vec![note_ref],
                });
                current_id = Some(id);
            }
        }
    }

    debug!(regions = out.len(), sustains = sustains.len(), "segmented regions");
    out
}
