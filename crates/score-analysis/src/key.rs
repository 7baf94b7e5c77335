use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chords::Chord;
use crate::container::ScoreContainer;

/// Major-key tonic names by number of fifths, from 7 flats to 7 sharps.
const TONIC_NAMES: [&str; 15] = [
    "Cb", "Gb", "Db", "Ab", "Eb", "Bb", "F", "C", "G", "D", "A", "E", "B", "F#", "C#",
];

/// Semitone offsets of the major scale from its tonic.
const MAJOR_SCALE: [u8; 7] = [0, 2, 4, 5, 7, 9, 11];

/// Candidate signatures in tie-break order: fewer accidentals first, sharps before flats.
const CANDIDATES: [i8; 15] = [0, 1, -1, 2, -2, 3, -3, 4, -4, 5, -5, 6, -6, 7, -7];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accidental {
    Flat,
    Natural,
    Sharp,
}

/// A major key signature, as a count of fifths (negative = flats).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeySignature {
    pub fifths: i8,
}

impl KeySignature {
    pub const NATURAL: KeySignature = KeySignature { fifths: 0 };

    /// Clamps to the playable range of -7..=7.
    pub fn new(fifths: i8) -> Self {
        Self {
            fifths: fifths.clamp(-7, 7),
        }
    }

    /// Pitch class of the major tonic (C = 0).
    pub fn tonic_pitch_class(&self) -> u8 {
        (7 * self.fifths as i32).rem_euclid(12) as u8
    }

    pub fn accidental(&self) -> Accidental {
        match self.fifths.signum() {
            -1 => Accidental::Flat,
            1 => Accidental::Sharp,
            _ => Accidental::Natural,
        }
    }

    /// Which of the 12 pitch classes belong to the scale.
    pub fn pitch_classes(&self) -> [bool; 12] {
        let tonic = self.tonic_pitch_class();
        let mut mask = [false; 12];
        for step in MAJOR_SCALE {
            mask[((tonic + step) % 12) as usize] = true;
        }
        mask
    }

    pub fn name(&self) -> String {
        format!("{} major", TONIC_NAMES[(self.fifths + 7) as usize])
    }
}

impl Default for KeySignature {
    fn default() -> Self {
        Self::NATURAL
    }
}

impl std::fmt::Display for KeySignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

/// Counts of semitone steps between consecutive chords, binned by the
/// pitch class of the lower note.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemitoneProfile {
    pub bins: [u32; 12],
}

impl SemitoneProfile {
    pub fn from_chords(container: &ScoreContainer, chords: &[Chord]) -> Self {
        let mut bins = [0u32; 12];
        for pair in chords.windows(2) {
            for &a in pair[0].notes() {
                let pa = container.note(a).pitch;
                for &b in pair[1].notes() {
                    let pb = container.note(b).pitch;
                    if pa.abs_diff(pb) == 1 {
                        bins[(pa.min(pb) % 12) as usize] += 1;
                    }
                }
            }
        }
        Self { bins }
    }

    pub fn total(&self) -> u32 {
        self.bins.iter().sum()
    }

    /// Steps landing on the key's 3-4 and 7-1 half steps.
    pub fn score(&self, key: KeySignature) -> u32 {
        let tonic = key.tonic_pitch_class() as usize;
        self.bins[(tonic + 4) % 12] + self.bins[(tonic + 11) % 12]
    }

    /// Best-scoring signature; natural when nothing was counted.
    pub fn best_key(&self) -> KeySignature {
        let mut best = KeySignature::NATURAL;
        let mut best_score = self.score(best);
        for &fifths in &CANDIDATES[1..] {
            let key = KeySignature::new(fifths);
            let score = self.score(key);
            if score > best_score {
                best = key;
                best_score = score;
            }
        }
        best
    }
}

/// Infer the key signature from half-step motion between chords.
pub fn key_signature(container: &ScoreContainer, chords: &[Chord]) -> (KeySignature, SemitoneProfile) {
    let profile = SemitoneProfile::from_chords(container, chords);
    let key = profile.best_key();
    debug!(key = %key, steps = profile.total(), "inferred key signature");
    (key, profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chords::make_chords;
    use crate::note::Note;

    fn melody(pitches: &[u8]) -> ScoreContainer {
        let notes = pitches
            .iter()
            .enumerate()
            .map(|(i, &p)| Note::new(i as f64, i as f64 + 0.9, p, 64))
            .collect();
        ScoreContainer::new(notes, vec![]).unwrap()
    }

    fn key_of(pitches: &[u8]) -> KeySignature {
        let container = melody(pitches);
        let chords = make_chords(&container, 0.1);
        key_signature(&container, &chords).0
    }

    #[test]
    fn tonic_pitch_classes() {
        assert_eq!(KeySignature::new(0).tonic_pitch_class(), 0);
        assert_eq!(KeySignature::new(1).tonic_pitch_class(), 7);
        assert_eq!(KeySignature::new(-1).tonic_pitch_class(), 5);
        assert_eq!(KeySignature::new(-3).tonic_pitch_class(), 3);
        assert_eq!(KeySignature::new(7).tonic_pitch_class(), 1);
        assert_eq!(KeySignature::new(-7).tonic_pitch_class(), 11);
    }

    #[test]
    fn names_and_accidentals() {
        assert_eq!(KeySignature::new(-3).name(), "Eb major");
        assert_eq!(KeySignature::new(6).to_string(), "F# major");
        assert_eq!(KeySignature::new(-2).accidental(), Accidental::Flat);
        assert_eq!(KeySignature::NATURAL.accidental(), Accidental::Natural);
        assert_eq!(KeySignature::new(12).fifths, 7);
    }

    #[test]
    fn scale_mask_of_g_major() {
        let mask = KeySignature::new(1).pitch_classes();
        let members: Vec<usize> = (0..12).filter(|&pc| mask[pc]).collect();
        assert_eq!(members, vec![0, 2, 4, 6, 7, 9, 11]);
    }

    #[test]
    fn c_major_scale_is_natural() {
        assert_eq!(key_of(&[60, 62, 64, 65, 67, 69, 71, 72]), KeySignature::NATURAL);
    }

    #[test]
    fn g_major_scale_has_one_sharp() {
        assert_eq!(key_of(&[67, 69, 71, 72, 74, 76, 78, 79]), KeySignature::new(1));
    }

    #[test]
    fn e_flat_major_scale_has_three_flats() {
        assert_eq!(key_of(&[63, 65, 67, 68, 70, 72, 74, 75]), KeySignature::new(-3));
    }

    #[test]
    fn enharmonic_tie_prefers_fewer_accidentals() {
        // B major and Cb major share every pitch class.
        assert_eq!(key_of(&[71, 73, 75, 76, 78, 80, 82, 83]), KeySignature::new(5));
    }

    #[test]
    fn no_half_steps_gives_natural() {
        assert_eq!(key_of(&[]), KeySignature::NATURAL);
        assert_eq!(key_of(&[60, 64, 67, 72]), KeySignature::NATURAL);
    }
}
