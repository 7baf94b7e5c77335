//! Left/right hand assignment for single-handed chords.
//!
//! A two-state Viterbi decode: each chord pays a pitch-range cost for the
//! hand it is given, and each step between chords pays a transition cost
//! that penalises large same-hand leaps and implausible hand crossings.

use scoreconf::HandConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chords::Chord;
use crate::container::{NoteRef, ScoreContainer};
use crate::note::Hand;
use crate::running_average::RunningAverage;

/// Pitch used as the split point when there is nothing to average.
const MIDDLE_C: f64 = 60.0;

/// Largest leap (semitones) one hand makes for free.
const FREE_JUMP: i32 = 13;
/// Past this leap a same-hand move costs the full penalty.
const STRETCH_JUMP: i32 = 16;

/// Where the split between the hands lies at a point in time.
pub trait HandBoundary {
    fn boundary_at(&self, t: f64) -> f64;
}

impl HandBoundary for RunningAverage {
    fn boundary_at(&self, t: f64) -> f64 {
        self.centroid_at(t).unwrap_or(MIDDLE_C)
    }
}

/// A fixed split pitch.
impl HandBoundary for f64 {
    fn boundary_at(&self, _t: f64) -> f64 {
        *self
    }
}

/// Strategy for labelling chords with hands.
///
/// `ViterbiHands` is the built-in decoder; a learned classifier fed by
/// `features::extract_features` can stand in for it.
pub trait HandAssigner: Send + Sync {
    fn assign(&self, container: &ScoreContainer, chords: &[Chord]) -> HandAssignment;
}

/// Result of a hand decode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandAssignment {
    /// One hand per chord.
    pub hands: Vec<Hand>,
    /// The same hands spread over every chord member.
    pub labels: Vec<(NoteRef, Hand)>,
    /// Total path cost of the decode.
    pub cost: f64,
}

impl HandAssignment {
    pub fn count(&self, hand: Hand) -> usize {
        self.labels.iter().filter(|(_, h)| *h == hand).count()
    }
}

/// Cost in `[0, 1]` of playing `pitch` with `hand` given the split pitch.
///
/// Notes far on the hand's own side cost near 0, far on the other side near 1.
pub fn range_cost(pitch: u8, hand: Hand, boundary: f64, spread: f64) -> f64 {
    let distance = pitch as f64 - boundary;
    let signed = match hand {
        Hand::Right => distance,
        Hand::Left => -distance,
    };
    0.5 - 0.5 * (signed / spread.max(f64::EPSILON)).tanh()
}

/// Cost of moving from one note and hand to the next.
pub fn transition_cost(prev_pitch: u8, prev_hand: Hand, pitch: u8, hand: Hand) -> f64 {
    let diff = pitch as i32 - prev_pitch as i32;
    let jump = diff.abs();

    if prev_hand == hand {
        return if jump <= FREE_JUMP {
            0.0
        } else if jump <= STRETCH_JUMP {
            0.5 + 0.5 * (jump - FREE_JUMP) as f64 / (STRETCH_JUMP - FREE_JUMP) as f64
        } else {
            2.0
        };
    }

    let follows_swap = match hand {
        Hand::Right => diff > 0,
        Hand::Left => diff < 0,
    };
    let extra = if diff == 0 {
        0.9
    } else if follows_swap {
        0.0
    } else if jump > FREE_JUMP {
        0.5
    } else {
        1.5
    };
    0.5 + extra
}

/// Viterbi decode of `chords` against an arbitrary boundary.
pub fn decode_hands(
    container: &ScoreContainer,
    chords: &[Chord],
    boundary: &dyn HandBoundary,
    spread: f64,
) -> HandAssignment {
    if chords.is_empty() {
        return HandAssignment::default();
    }

    let chord_cost = |chord: &Chord, hand: Hand| -> f64 {
        let split = boundary.boundary_at(chord.onset());
        chord
            .notes()
            .iter()
            .map(|&n| range_cost(container.note(n).pitch, hand, split, spread))
            .sum()
    };

    let mut costs: Vec<[f64; 2]> = Vec::with_capacity(chords.len());
    let mut back: Vec<[Hand; 2]> = Vec::with_capacity(chords.len());

    let first = &chords[0];
    costs.push([chord_cost(first, Hand::Left), chord_cost(first, Hand::Right)]);
    back.push([Hand::Left, Hand::Right]);

    for i in 1..chords.len() {
        let prev_pitch = container.note(chords[i - 1].last()).pitch;
        let pitch = container.note(chords[i].first()).pitch;
        let mut row = [0.0; 2];
        let mut pointers = [Hand::Left; 2];

        for hand in Hand::ALL {
            let local = chord_cost(&chords[i], hand);
            let mut best = (f64::INFINITY, Hand::Left);
            for prev_hand in Hand::ALL {
                let total = costs[i - 1][prev_hand.index()]
                    + local
                    + transition_cost(prev_pitch, prev_hand, pitch, hand);
                if total < best.0 {
                    best = (total, prev_hand);
                }
            }
            row[hand.index()] = best.0;
            pointers[hand.index()] = best.1;
        }

        costs.push(row);
        back.push(pointers);
    }

    let last = &costs[costs.len() - 1];
    let (mut hand, cost) = if last[Hand::Right.index()] <= last[Hand::Left.index()] {
        (Hand::Right, last[Hand::Right.index()])
    } else {
        (Hand::Left, last[Hand::Left.index()])
    };

    let mut hands = vec![hand; chords.len()];
    for i in (1..chords.len()).rev() {
        hands[i] = hand;
        hand = back[i][hand.index()];
    }
    hands[0] = hand;

    let labels: Vec<(NoteRef, Hand)> = chords
        .iter()
        .zip(&hands)
        .flat_map(|(chord, &hand)| chord.notes().iter().map(move |&n| (n, hand)))
        .collect();

    let assignment = HandAssignment { hands, labels, cost };
    debug!(
        chords = chords.len(),
        cost,
        left = assignment.count(Hand::Left),
        right = assignment.count(Hand::Right),
        "decoded hands"
    );
    assignment
}

/// Viterbi decoder using the piece's running pitch average as the split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViterbiHands {
    pub spread: f64,
    pub window: f64,
}

impl ViterbiHands {
    pub fn from_config(config: &HandConfig) -> Self {
        Self {
            spread: config.spread,
            window: config.window,
        }
    }
}

impl Default for ViterbiHands {
    fn default() -> Self {
        Self::from_config(&HandConfig::default())
    }
}

impl HandAssigner for ViterbiHands {
    fn assign(&self, container: &ScoreContainer, chords: &[Chord]) -> HandAssignment {
        let average = RunningAverage::new(container, self.window);
        decode_hands(container, chords, &average, self.spread)
    }
}
