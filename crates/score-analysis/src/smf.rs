//! Standard MIDI File bridge.
//!
//! Decoding goes through `midly`; encoding writes format 1 bytes by hand.
//! Times are converted between ticks and beats with the file's PPQ.

use std::collections::HashMap;
use std::path::Path;

use midly::{MetaMessage, MidiMessage, Smf, TrackEventKind};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::note::{Note, PlainScore, SustainEvent};
use crate::{Error, Result};

pub const DEFAULT_PPQ: u16 = 480;
/// 120 BPM.
pub const DEFAULT_TEMPO: u32 = 500_000;

const SUSTAIN_CONTROLLER: u8 = 64;
const PEDAL_DOWN: u8 = 64;

/// Decoded file: one plain score per file track, conductor track included,
/// so track indices match the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MidiScore {
    pub ppq: u16,
    /// Microseconds per beat of the first tempo event.
    pub tempo: u32,
    pub tracks: Vec<PlainScore>,
}

impl MidiScore {
    /// Tracks that hold at least one note.
    pub fn note_tracks(&self) -> impl Iterator<Item = (usize, &PlainScore)> {
        self.tracks.iter().enumerate().filter(|(_, t)| !t.notes.is_empty())
    }

    /// Encode the tracks as they stand. The tempo is written at the start of
    /// the first track, so a decoded file re-encodes with the same layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        encode(&self.tracks, self.ppq, self.tempo)
    }
}

/// Decode SMF bytes into per-track notes and pedal intervals.
///
/// CC64 at or above 64 is pedal down. A NoteOff's velocity becomes the
/// note's release velocity. Notes and pedals still open at the end of a
/// track are closed there.
pub fn read_tracks(bytes: &[u8]) -> Result<MidiScore> {
    let smf = Smf::parse(bytes).map_err(|e| Error::MidiParse(e.to_string()))?;

    let ppq = match smf.header.timing {
        midly::Timing::Metrical(ticks) => ticks.as_int().max(1),
        midly::Timing::Timecode(_, _) => DEFAULT_PPQ,
    };
    let beats = |tick: u64| tick as f64 / ppq as f64;

    let mut tempo = None;
    let mut tracks = Vec::with_capacity(smf.tracks.len());

    for (track_index, track) in smf.tracks.iter().enumerate() {
        let mut current_tick: u64 = 0;
        // (channel, pitch) → stack of (onset tick, velocity)
        let mut pending: HashMap<(u8, u8), Vec<(u64, u8)>> = HashMap::new();
        let mut pedal_down: Option<u64> = None;
        let mut score = PlainScore::default();

        for event in track {
            current_tick += event.delta.as_int() as u64;

            match event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(t)) => {
                    tempo.get_or_insert(t.as_int());
                }
                TrackEventKind::Midi { channel, message } => {
                    let ch = channel.as_int();
                    match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            pending
                                .entry((ch, key.as_int()))
                                .or_default()
                                .push((current_tick, vel.as_int()));
                        }
                        MidiMessage::NoteOff { key, vel } | MidiMessage::NoteOn { key, vel } => {
                            let key = (ch, key.as_int());
                            if let Some((onset, velocity)) = pending.get_mut(&key).and_then(|s| s.pop()) {
                                let mut note = Note::new(beats(onset), beats(current_tick), key.1, velocity);
                                note.channel = ch;
                                note.release_velocity = vel.as_int();
                                score.notes.push(note);
                            }
                        }
                        MidiMessage::Controller { controller, value }
                            if controller.as_int() == SUSTAIN_CONTROLLER =>
                        {
                            match (value.as_int() >= PEDAL_DOWN, pedal_down) {
                                (true, None) => pedal_down = Some(current_tick),
                                (false, Some(start)) => {
                                    score.sustains.push(SustainEvent::new(beats(start), beats(current_tick)));
                                    pedal_down = None;
                                }
                                _ => {}
                            }
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        for ((ch, pitch), stack) in pending {
            for (onset, velocity) in stack {
                let mut note = Note::new(beats(onset), beats(current_tick), pitch, velocity);
                note.channel = ch;
                score.notes.push(note);
            }
        }
        if let Some(start) = pedal_down {
            score.sustains.push(SustainEvent::new(beats(start), beats(current_tick)));
        }

        score.notes.sort_by(|a, b| a.onset.total_cmp(&b.onset).then(a.pitch.cmp(&b.pitch)));

        let off_piano = score.notes.iter().filter(|n| !n.is_piano_key()).count();
        if off_piano > 0 {
            warn!(track = track_index, notes = off_piano, "notes outside the piano range");
        }
        debug!(
            track = track_index,
            notes = score.notes.len(),
            sustains = score.sustains.len(),
            "decoded track"
        );
        tracks.push(score);
    }

    Ok(MidiScore {
        ppq,
        tempo: tempo.unwrap_or(DEFAULT_TEMPO),
        tracks,
    })
}

pub fn read_file(path: &Path) -> Result<MidiScore> {
    let bytes = std::fs::read(path)?;
    read_tracks(&bytes)
}

/// Encode scores as format 1 SMF bytes: an empty conductor track, then one
/// track per score.
///
/// Each note's channel field is used as its MIDI channel, so hand labels
/// survive the trip. Pedal intervals are written as CC64 127/0 on channel 0.
pub fn write_tracks(tracks: &[PlainScore], ppq: u16) -> Vec<u8> {
    let mut with_conductor = Vec::with_capacity(tracks.len() + 1);
    with_conductor.push(PlainScore::default());
    with_conductor.extend_from_slice(tracks);
    encode(&with_conductor, ppq, DEFAULT_TEMPO)
}

pub fn write_file(path: &Path, tracks: &[PlainScore], ppq: u16) -> Result<()> {
    std::fs::write(path, write_tracks(tracks, ppq))?;
    Ok(())
}

fn encode(tracks: &[PlainScore], ppq: u16, tempo: u32) -> Vec<u8> {
    let ppq = ppq.max(1);
    let conductor = PlainScore::default();
    let tracks: Vec<&PlainScore> = if tracks.is_empty() {
        vec![&conductor]
    } else {
        tracks.iter().collect()
    };
    let track_count = u16::try_from(tracks.len()).unwrap_or(u16::MAX);

    let mut out = Vec::new();
    let mut header = Vec::with_capacity(6);
    for field in [1u16, track_count, ppq] {
        header.extend_from_slice(&field.to_be_bytes());
    }
    write_chunk(&mut out, b"MThd", &header);

    for (index, score) in tracks.into_iter().take(track_count as usize).enumerate() {
        let tempo = (index == 0).then_some(tempo);
        write_chunk(&mut out, b"MTrk", &build_track(score, index, ppq, tempo));
    }
    out
}

fn write_chunk(out: &mut Vec<u8>, tag: &[u8; 4], body: &[u8]) {
    out.extend_from_slice(tag);
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(body);
}

/// Ordering of events sharing a tick: releases before presses.
fn event_rank(data: &[u8]) -> u8 {
    match (data[0] & 0xF0, data.get(2)) {
        (0x80, _) => 0,
        (0xB0, Some(0)) => 1,
        (0xB0, _) => 2,
        (0x90, _) => 3,
        _ => 4,
    }
}

fn build_track(score: &PlainScore, index: usize, ppq: u16, tempo: Option<u32>) -> Vec<u8> {
    let to_tick = |beats: f64| (beats * ppq as f64).round().max(0.0) as u64;
    let mut events: Vec<(u64, Vec<u8>)> = Vec::new();

    let mut silent = 0usize;
    for note in &score.notes {
        let channel = note.channel & 0x0F;
        let velocity = if note.velocity == 0 {
            silent += 1;
            1
        } else {
            note.velocity & 0x7F
        };
        let pitch = note.pitch & 0x7F;
        events.push((to_tick(note.onset), vec![0x90 | channel, pitch, velocity]));
        events.push((
            to_tick(note.offset),
            vec![0x80 | channel, pitch, note.release_velocity & 0x7F],
        ));
    }
    if silent > 0 {
        warn!(track = index, notes = silent, "zero-velocity notes written with velocity 1");
    }

    for sustain in &score.sustains {
        events.push((to_tick(sustain.onset), vec![0xB0, SUSTAIN_CONTROLLER, 127]));
        events.push((to_tick(sustain.offset), vec![0xB0, SUSTAIN_CONTROLLER, 0]));
    }

    events.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| event_rank(&a.1).cmp(&event_rank(&b.1))));

    let mut track_data = Vec::new();
    if let Some(tempo) = tempo {
        write_vlq(&mut track_data, 0);
        track_data.extend_from_slice(&[0xFF, 0x51, 0x03]);
        track_data.extend_from_slice(&tempo.to_be_bytes()[1..]);
    }
    if !(score.notes.is_empty() && score.sustains.is_empty()) {
        let name = format!("Track {index}");
        write_vlq(&mut track_data, 0);
        track_data.extend_from_slice(&[0xFF, 0x03]);
        write_vlq(&mut track_data, name.len() as u32);
        track_data.extend_from_slice(name.as_bytes());
    }

    let mut last_tick = 0u64;
    for (tick, data) in events {
        write_delta(&mut track_data, tick.saturating_sub(last_tick));
        track_data.extend_from_slice(&data);
        last_tick = tick;
    }

    write_vlq(&mut track_data, 0);
    track_data.extend_from_slice(&[0xFF, 0x2F, 0x00]);
    track_data
}

/// Write a delta time, bridging gaps too long for one VLQ with empty text
/// events.
fn write_delta(buf: &mut Vec<u8>, mut delta: u64) {
    while delta > MAX_VLQ as u64 {
        write_vlq(buf, MAX_VLQ);
        buf.extend_from_slice(&[0xFF, 0x01, 0x00]);
        delta -= MAX_VLQ as u64;
    }
    write_vlq(buf, delta as u32);
}

/// Largest value a four-byte VLQ can hold.
const MAX_VLQ: u32 = 0x0FFF_FFFF;

fn write_vlq(buf: &mut Vec<u8>, mut value: u32) {
    let mut bytes = [0u8; 5];
    let mut i = bytes.len() - 1;
    bytes[i] = (value & 0x7F) as u8;
    value >>= 7;
    while value > 0 {
        i -= 1;
        bytes[i] = (value & 0x7F) as u8 | 0x80;
        value >>= 7;
    }
    buf.extend_from_slice(&bytes[i..]);
}
