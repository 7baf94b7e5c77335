//! Flat per-note feature vectors for an external hand classifier.

use serde::{Deserialize, Serialize};

use crate::chords::Chord;
use crate::container::ScoreContainer;
use crate::running_average::RunningAverage;

pub const FEATURE_COUNT: usize = 12;

/// Features of one note, in arena order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteFeatures {
    pub pitch: f32,
    pub duration: f32,
    pub velocity: f32,
    /// Beats since the previous note started (0 for the first note).
    pub since_prev: f32,
    /// Beats until the next note starts (0 for the last note).
    pub until_next: f32,
    pub chord_size: f32,
    /// 0 for the chord's lowest note, 1 for its highest.
    pub chord_rank: f32,
    pub chord_offset: f32,
    pub window_mean: f32,
    pub window_span: f32,
    pub window_offset: f32,
    /// 1 when the onset is under the pedal.
    pub sustained: f32,
}

impl NoteFeatures {
    pub fn to_vec(&self) -> Vec<f32> {
        self.to_array().to_vec()
    }

    pub fn to_array(&self) -> [f32; FEATURE_COUNT] {
        [
            self.pitch,
            self.duration,
            self.velocity,
            self.since_prev,
            self.until_next,
            self.chord_size,
            self.chord_rank,
            self.chord_offset,
            self.window_mean,
            self.window_span,
            self.window_offset,
            self.sustained,
        ]
    }
}

/// Per-feature standardization applied before a model sees the vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaling {
    pub mean: [f32; FEATURE_COUNT],
    pub std: [f32; FEATURE_COUNT],
}

impl FeatureScaling {
    /// Leaves vectors unchanged.
    pub fn identity() -> Self {
        Self {
            mean: [0.0; FEATURE_COUNT],
            std: [1.0; FEATURE_COUNT],
        }
    }

    /// Mean and population standard deviation of each feature.
    pub fn fit(samples: &[NoteFeatures]) -> Self {
        if samples.is_empty() {
            return Self::identity();
        }
        let n = samples.len() as f64;
        let mut mean = [0.0f64; FEATURE_COUNT];
        let mut var = [0.0f64; FEATURE_COUNT];

        for sample in samples {
            for (m, v) in mean.iter_mut().zip(sample.to_array()) {
                *m += v as f64 / n;
            }
        }
        for sample in samples {
            for (i, v) in sample.to_array().into_iter().enumerate() {
                let d = v as f64 - mean[i];
                var[i] += d * d / n;
            }
        }

        Self {
            mean: mean.map(|m| m as f32),
            std: var.map(|v| v.sqrt() as f32),
        }
    }

    /// Standardize one vector. Constant features divide by 1.
    pub fn apply(&self, features: &NoteFeatures) -> Vec<f32> {
        features
            .to_array()
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                let std = if self.std[i] > 0.0 { self.std[i] } else { 1.0 };
                (v - self.mean[i]) / std
            })
            .collect()
    }
}

impl Default for FeatureScaling {
    fn default() -> Self {
        Self::identity()
    }
}

/// Raw features for every note, in arena order.
pub fn note_features(container: &ScoreContainer, chords: &[Chord], window: f64) -> Vec<NoteFeatures> {
    let notes = container.notes();
    let average = RunningAverage::new(container, window);
    let pedal = container.sustain_index();

    let mut membership: Vec<Option<usize>> = vec![None; notes.len()];
    for (c, chord) in chords.iter().enumerate() {
        for &note in chord.notes() {
            membership[note.index()] = Some(c);
        }
    }

    let mut out = Vec::with_capacity(notes.len());
    for (i, note) in notes.iter().enumerate() {
        let pitch = note.pitch as f64;
        let sample = average.samples()[i];

        let (size, rank, chord_mean) = match membership[i] {
            Some(c) => {
                let chord = &chords[c];
                let low = container.note(chord.lowest(container)).pitch as f64;
                let width = chord.span(container).max(1) as f64;
                (chord.len() as f64, (pitch - low) / width, chord.mean_pitch(container))
            }
            None => (1.0, 0.0, pitch),
        };

        out.push(NoteFeatures {
            pitch: pitch as f32,
            duration: note.duration() as f32,
            velocity: note.velocity as f32,
            since_prev: i.checked_sub(1).map_or(0.0, |p| note.onset - notes[p].onset) as f32,
            until_next: notes.get(i + 1).map_or(0.0, |n| n.onset - note.onset) as f32,
            chord_size: size as f32,
            chord_rank: rank as f32,
            chord_offset: (pitch - chord_mean) as f32,
            window_mean: sample.mean as f32,
            window_span: sample.span as f32,
            window_offset: (pitch - sample.mean) as f32,
            sustained: if pedal.at(note.onset).is_some() { 1.0 } else { 0.0 },
        });
    }
    out
}

/// Scaled feature vectors for every note, in arena order.
pub fn extract_features(
    container: &ScoreContainer,
    chords: &[Chord],
    window: f64,
    scaling: &FeatureScaling,
) -> Vec<Vec<f32>> {
    note_features(container, chords, window)
        .iter()
        .map(|f| scaling.apply(f))
        .collect()
}
