use serde::{Deserialize, Serialize};

use crate::interval::Interval;

/// Lowest piano key (A0).
pub const PITCH_MIN: u8 = 21;
/// Highest piano key (C8).
pub const PITCH_MAX: u8 = 108;

/// A single note, timed in beats.
///
/// `channel` doubles as a scratch label: hand decoding writes the hand
/// there and normalization may write a debug tag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub onset: f64,
    pub offset: f64,
    pub pitch: u8,
    pub velocity: u8,
    pub channel: u8,
    pub release_velocity: u8,
}

impl Note {
    pub fn new(onset: f64, offset: f64, pitch: u8, velocity: u8) -> Self {
        Self {
            onset,
            offset,
            pitch,
            velocity,
            channel: 0,
            release_velocity: 0,
        }
    }

    pub fn duration(&self) -> f64 {
        self.offset - self.onset
    }

    /// Changing the duration moves the offset only.
    pub fn set_duration(&mut self, duration: f64) {
        self.offset = self.onset + duration;
    }

    /// True when the pitch lies on an 88-key piano.
    pub fn is_piano_key(&self) -> bool {
        (PITCH_MIN..=PITCH_MAX).contains(&self.pitch)
    }
}

impl Interval for Note {
    fn onset(&self) -> f64 {
        self.onset
    }

    fn offset(&self) -> f64 {
        self.offset
    }
}

/// A sustain-pedal-down interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SustainEvent {
    pub onset: f64,
    pub offset: f64,
}

impl SustainEvent {
    pub fn new(onset: f64, offset: f64) -> Self {
        Self { onset, offset }
    }

    pub fn duration(&self) -> f64 {
        self.offset - self.onset
    }
}

impl Interval for SustainEvent {
    fn onset(&self) -> f64 {
        self.onset
    }

    fn offset(&self) -> f64 {
        self.offset
    }
}

/// Which hand plays a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hand {
    Left,
    Right,
}

impl Hand {
    pub const ALL: [Hand; 2] = [Hand::Left, Hand::Right];

    pub fn index(self) -> usize {
        match self {
            Hand::Left => 0,
            Hand::Right => 1,
        }
    }

    /// Value written into a note's channel field.
    pub fn channel(self) -> u8 {
        match self {
            Hand::Right => 0,
            Hand::Left => 1,
        }
    }

    pub fn from_channel(channel: u8) -> Option<Self> {
        match channel {
            0 => Some(Hand::Right),
            1 => Some(Hand::Left),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Hand::Left => "left",
            Hand::Right => "right",
        }
    }
}

impl std::fmt::Display for Hand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flat note and sustain lists: the exchange format at the I/O boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlainScore {
    pub notes: Vec<Note>,
    pub sustains: Vec<SustainEvent>,
}

impl PlainScore {
    pub fn new(notes: Vec<Note>, sustains: Vec<SustainEvent>) -> Self {
        Self { notes, sustains }
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty() && self.sustains.is_empty()
    }

    /// Latest offset of any note or pedal, in beats.
    pub fn end(&self) -> f64 {
        let notes = self.notes.iter().map(|n| n.offset);
        let sustains = self.sustains.iter().map(|s| s.offset);
        notes.chain(sustains).fold(0.0, f64::max)
    }
}
