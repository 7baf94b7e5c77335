//! Whole-pipeline properties over synthetic scores.

use pretty_assertions::assert_eq;
use score_analysis::{
    analyze, baseline_bar_length, key_signature, make_chords, read_tracks, write_tracks, Hand, KeySignature, Note,
    PlainScore, ScoreContainer, SustainEvent,
};
use scoreconf::ScoreConfig;

/// Small deterministic generator so the property tests need no extra crates.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

fn random_notes(seed: u64, count: usize) -> Vec<Note> {
    let mut rng = Lcg(seed);
    (0..count)
        .map(|_| {
            // Onsets on a 1/32 beat grid so clusters of near-simultaneous notes appear.
            let onset = rng.below(256) as f64 / 32.0;
            let length = (1 + rng.below(64)) as f64 / 32.0;
            let pitch = 21 + rng.below(88) as u8;
            Note::new(onset, onset + length, pitch, 40 + rng.below(80) as u8)
        })
        .collect()
}

fn chord_pitches(container: &ScoreContainer, threshold: f64) -> Vec<Vec<u8>> {
    make_chords(container, threshold)
        .iter()
        .map(|chord| chord.notes().iter().map(|&n| container.note(n).pitch).collect())
        .collect()
}

#[test]
fn chords_partition_the_notes() {
    for seed in 1..20 {
        let container = ScoreContainer::new(random_notes(seed, 120), vec![]).unwrap();
        let chords = make_chords(&container, 0.1);

        let mut seen: Vec<usize> = chords
            .iter()
            .flat_map(|chord| chord.notes().iter().map(|n| n.index()))
            .collect();
        seen.sort_unstable();
        let expected: Vec<usize> = (0..container.len()).collect();
        assert_eq!(seen, expected, "seed {seed}");

        for pair in chords.windows(2) {
            assert!(pair[0].onset() <= pair[1].onset(), "seed {seed}: chords out of order");
        }
    }
}

#[test]
fn notes_within_threshold_share_a_chord() {
    let close = ScoreContainer::new(vec![Note::new(0.0, 1.0, 60, 64), Note::new(0.1, 1.0, 64, 64)], vec![]).unwrap();
    assert_eq!(chord_pitches(&close, 0.1), vec![vec![60, 64]]);

    let apart = ScoreContainer::new(vec![Note::new(0.0, 1.0, 60, 64), Note::new(0.25, 1.0, 64, 64)], vec![]).unwrap();
    assert_eq!(chord_pitches(&apart, 0.1), vec![vec![60], vec![64]]);
}

#[test]
fn near_simultaneous_notes_cluster() {
    let container = ScoreContainer::new(
        vec![
            Note::new(0.0, 1.0, 60, 64),
            Note::new(0.02, 1.0, 64, 64),
            Note::new(5.0, 6.0, 67, 64),
        ],
        vec![],
    )
    .unwrap();
    assert_eq!(chord_pitches(&container, 0.1), vec![vec![60, 64], vec![67]]);
}

#[test]
fn overlapping_repeat_is_absorbed() {
    let container = ScoreContainer::build(
        vec![Note::new(0.0, 1.0, 60, 60), Note::new(0.05, 1.0, 60, 60)],
        vec![],
        1.0 / 128.0,
    )
    .unwrap();
    assert_eq!(container.to_plain_data().notes, vec![Note::new(0.0, 1.0, 60, 60)]);
}

#[test]
fn plain_data_round_trips_through_a_fresh_container() {
    let notes = vec![
        Note::new(2.0, 3.0, 64, 70),
        Note::new(0.0, 1.0, 60, 80),
        Note::new(1.0, 1.5, 60, 90),
        Note::new(0.5, 4.0, 48, 50),
    ];
    let sustains = vec![SustainEvent::new(2.0, 3.0), SustainEvent::new(0.0, 1.5)];
    let container = ScoreContainer::new(notes, sustains).unwrap();

    let mut expected_notes = vec![
        Note::new(0.0, 1.0, 60, 80),
        Note::new(0.5, 4.0, 48, 50),
        Note::new(1.0, 1.5, 60, 90),
        Note::new(2.0, 3.0, 64, 70),
    ];
    // The first C4 runs into the second and is trimmed to leave the minimum gap.
    expected_notes[0].offset = 1.0 - 1.0 / 128.0;

    assert_eq!(
        container.to_plain_data(),
        PlainScore::new(
            expected_notes,
            vec![SustainEvent::new(0.0, 1.5), SustainEvent::new(2.0, 3.0)]
        )
    );
}

#[test]
fn key_is_octave_invariant() {
    // D major, up and down.
    let scale = [62u8, 64, 66, 67, 69, 71, 73, 74, 73, 71, 69, 67, 66, 64, 62];
    let build = |shift: u8| {
        let notes = scale
            .iter()
            .enumerate()
            .map(|(i, &p)| Note::new(i as f64 * 0.5, i as f64 * 0.5 + 0.4, p + shift, 64))
            .collect();
        ScoreContainer::new(notes, vec![]).unwrap()
    };

    let base = build(0);
    let raised = build(12);
    let (key, _) = key_signature(&base, &make_chords(&base, 0.1));
    let (raised_key, _) = key_signature(&raised, &make_chords(&raised, 0.1));

    assert_eq!(key, KeySignature::new(2));
    assert_eq!(raised_key, key);
}

#[test]
fn half_beat_durations_give_half_beat_bars() {
    let durations = [0.5, 1.0, 1.5, 0.5, 0.5, 1.0, 0.5];
    let bar = baseline_bar_length(&durations, 1e-5).unwrap();
    assert!((bar - 0.5).abs() < 1e-4, "got {bar}");
}

#[test]
fn analysis_survives_a_midi_round_trip() {
    let mut notes = Vec::new();
    for bar in 0..4 {
        let t = bar as f64 * 4.0;
        notes.push(Note::new(t, t + 3.5, 43, 70));
        for beat in 0..4 {
            let b = t + beat as f64;
            notes.push(Note::new(b, b + 0.5, 67 + 2 * (beat as u8 % 3), 90));
        }
    }
    let sustains: Vec<SustainEvent> = (0..4).map(|bar| SustainEvent::new(bar as f64 * 4.0, bar as f64 * 4.0 + 3.75)).collect();
    let bytes = write_tracks(&[PlainScore::new(notes, sustains)], 480);

    let midi = read_tracks(&bytes).unwrap();
    let (_, track) = midi.note_tracks().next().unwrap();
    assert_eq!(track.notes.len(), 20);
    assert_eq!(track.sustains.len(), 4);

    let config = ScoreConfig::default();
    let mut container = ScoreContainer::new(track.notes.clone(), track.sustains.clone()).unwrap();
    let analysis = analyze(&mut container, &config);

    assert_eq!(analysis.regions.len(), 4);
    assert_eq!(analysis.bar_grid.bar_length.map(|b| (b * 100.0).round() / 100.0), Some(3.75));
    assert!(container
        .notes()
        .iter()
        .filter(|n| n.pitch == 43)
        .all(|n| Hand::from_channel(n.channel) == Some(Hand::Left)));
}
