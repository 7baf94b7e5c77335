//! Smoothed pitch centroid over a sliding time window.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::container::ScoreContainer;
use crate::note::Note;

/// Pitch summary of the notes around one onset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchSample {
    pub onset: f64,
    /// Mean pitch of the notes in the window.
    pub mean: f64,
    /// Highest minus lowest pitch in the window.
    pub span: f64,
}

/// One [`PitchSample`] per note, each over the centred window
/// `[onset - window/2, onset + window/2]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningAverage {
    window: f64,
    samples: Vec<PitchSample>,
}

impl RunningAverage {
    pub fn new(container: &ScoreContainer, window: f64) -> Self {
        Self::from_notes(container.notes(), window)
    }

    /// `notes` must be sorted by onset.
    pub fn from_notes(notes: &[Note], window: f64) -> Self {
        let half = window.max(0.0) / 2.0;
        let mut samples = Vec::with_capacity(notes.len());

        // Monotonic deques of indices: pitches non-increasing in `highs`,
        // non-decreasing in `lows`.
        let mut highs: VecDeque<usize> = VecDeque::new();
        let mut lows: VecDeque<usize> = VecDeque::new();
        let (mut lo, mut hi) = (0usize, 0usize);
        let mut sum = 0.0;

        for note in notes {
            let t = note.onset;

            while hi < notes.len() && notes[hi].onset <= t + half {
                let pitch = notes[hi].pitch;
                while highs.back().is_some_and(|&j| notes[j].pitch <= pitch) {
                    highs.pop_back();
                }
                highs.push_back(hi);
                while lows.back().is_some_and(|&j| notes[j].pitch >= pitch) {
                    lows.pop_back();
                }
                lows.push_back(hi);
                sum += pitch as f64;
                hi += 1;
            }

            while lo < hi && notes[lo].onset < t - half {
                sum -= notes[lo].pitch as f64;
                lo += 1;
            }
            while highs.front().is_some_and(|&j| j < lo) {
                highs.pop_front();
            }
            while lows.front().is_some_and(|&j| j < lo) {
                lows.pop_front();
            }

            // The current note is always inside its own window.
            let count = (hi - lo).max(1) as f64;
            let high = highs.front().map_or(note.pitch, |&j| notes[j].pitch);
            let low = lows.front().map_or(note.pitch, |&j| notes[j].pitch);
            samples.push(PitchSample {
                onset: t,
                mean: sum / count,
                span: (high - low) as f64,
            });
        }

        Self { window, samples }
    }

    pub fn window(&self) -> f64 {
        self.window
    }

    pub fn samples(&self) -> &[PitchSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample of the last note starting at or before `t`.
    pub fn at(&self, t: f64) -> Option<&PitchSample> {
        let i = self.samples.partition_point(|s| s.onset <= t);
        i.checked_sub(1).map(|i| &self.samples[i])
    }

    /// The piece's opening sample.
    pub fn initial(&self) -> Option<&PitchSample> {
        self.samples.first()
    }

    /// Centroid at `t`, falling back to the opening sample before the first note.
    pub fn centroid_at(&self, t: f64) -> Option<f64> {
        self.at(t).or_else(|| self.initial()).map(|s| s.mean)
    }
}
