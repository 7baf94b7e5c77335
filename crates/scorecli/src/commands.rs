//! Subcommand implementations.

use std::path::Path;

use anyhow::{bail, Context, Result};
use score_analysis::{
    analyze as run_analysis, build_container, extract_features, label_hands, make_chords, normalize_durations,
    note_features, read_file, FeatureScaling, Hand, MidiScore, Note, PlainScore, ScoreContainer,
};
use scoreconf::{ConfigSources, ScoreConfig};
use tracing::info;

use crate::InputArgs;

fn load(path: &Path) -> Result<MidiScore> {
    read_file(path).with_context(|| format!("Failed to read MIDI file {}", path.display()))
}

fn save(path: &Path, midi: &MidiScore) -> Result<()> {
    std::fs::write(path, midi.to_bytes()).with_context(|| format!("Failed to write MIDI file {}", path.display()))
}

/// Build one container from the selected track, or from every note track merged.
pub fn select_notes(midi: &MidiScore, input: &InputArgs, config: &ScoreConfig) -> Result<ScoreContainer> {
    let container = match input.track {
        Some(index) => {
            let Some(track) = midi.tracks.get(index) else {
                bail!("track {index} not found; the file has {} tracks", midi.tracks.len());
            };
            build_container(track.clone(), config)?
        }
        None => {
            let parts = midi
                .note_tracks()
                .map(|(_, track)| build_container(track.clone(), config))
                .collect::<score_analysis::Result<Vec<_>>>()?;
            let refs: Vec<&ScoreContainer> = parts.iter().collect();
            ScoreContainer::merge(&refs)?
        }
    };

    if input.min_duration > 0.0 || input.min_velocity > 0 {
        return Ok(container.remove_artifacts(input.min_duration, input.min_velocity));
    }
    Ok(container)
}

pub fn analyze(path: &Path, input: &InputArgs, config: &ScoreConfig, pretty: bool) -> Result<()> {
    let midi = load(path)?;
    let mut container = select_notes(&midi, input, config)?;
    let analysis = run_analysis(&mut container, config);

    let json = if pretty {
        serde_json::to_string_pretty(&analysis)?
    } else {
        serde_json::to_string(&analysis)?
    };
    println!("{json}");
    Ok(())
}

/// Normalize each note track on its own and write them back in place.
pub fn normalize(input_path: &Path, output_path: &Path, config: &ScoreConfig) -> Result<()> {
    let mut midi = load(input_path)?;

    for (index, track) in midi.tracks.iter_mut().enumerate() {
        if track.notes.is_empty() {
            continue;
        }
        let mut container = build_container(std::mem::take(track), config)?;
        let chords = make_chords(&container, config.chords.merge_threshold);
        let report = normalize_durations(&mut container, &chords, &config.normalize);

        info!(
            track = index,
            changed = report.changed,
            ambiguous = report.ambiguous.len(),
            "normalized track"
        );
        *track = container.to_plain_data();
    }

    save(output_path, &midi)
}

/// Split the selected notes into a right hand track and a left hand track.
pub fn hands(input_path: &Path, output_path: &Path, input: &InputArgs, config: &ScoreConfig) -> Result<()> {
    let midi = load(input_path)?;
    let mut container = select_notes(&midi, input, config)?;

    let assigner = score_analysis::ViterbiHands::from_config(&config.hands);
    let (_, assignment) = label_hands(&mut container, config, &assigner);
    info!(
        right = assignment.count(Hand::Right),
        left = assignment.count(Hand::Left),
        "assigned hands"
    );

    // Empty conductor first, matching `write_tracks`.
    let mut tracks = vec![PlainScore::default()];
    tracks.extend(split_by_hand(&container.to_plain_data()));
    let out = MidiScore {
        ppq: midi.ppq,
        tempo: midi.tempo,
        tracks,
    };
    save(output_path, &out)
}

/// Right hand first. Pedal goes with the left hand track.
pub fn split_by_hand(score: &PlainScore) -> Vec<PlainScore> {
    let (right, left): (Vec<Note>, Vec<Note>) = score
        .notes
        .iter()
        .copied()
        .partition(|n| Hand::from_channel(n.channel) != Some(Hand::Left));
    vec![
        PlainScore::new(right, Vec::new()),
        PlainScore::new(left, score.sustains.clone()),
    ]
}

pub fn features(path: &Path, input: &InputArgs, config: &ScoreConfig, scale: bool) -> Result<()> {
    let midi = load(path)?;
    let container = select_notes(&midi, input, config)?;
    let chords = make_chords(&container, config.chords.merge_threshold);

    let scaling = if scale {
        FeatureScaling::fit(&note_features(&container, &chords, config.hands.window))
    } else {
        FeatureScaling::identity()
    };

    for row in extract_features(&container, &chords, config.hands.window, &scaling) {
        println!("{}", serde_json::to_string(&row)?);
    }
    Ok(())
}

pub fn show_config(config: &ScoreConfig, sources: &ConfigSources) {
    if sources.files.is_empty() {
        println!("# No config files found, using defaults");
    } else {
        for file in &sources.files {
            println!("# Loaded: {}", file.display());
        }
    }
    for var in &sources.env_overrides {
        println!("# Env override: {var}");
    }
    println!();
    print!("{}", config.to_toml());
}

#[cfg(test)]
mod tests {
    use super::*;
    use score_analysis::{write_file, SustainEvent};

    fn two_track_file(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("input.mid");
        let right = PlainScore::new(
            (0..8).map(|i| Note::new(i as f64, i as f64 + 0.5, 72 + (i % 3) as u8, 80)).collect(),
            vec![],
        );
        let left = PlainScore::new(
            (0..4).map(|i| Note::new(i as f64 * 4.0, i as f64 * 4.0 + 1.5, 40, 60)).collect(),
            vec![SustainEvent::new(0.0, 3.5), SustainEvent::new(4.0, 7.5)],
        );
        write_file(&path, &[right, left], 480).unwrap();
        path
    }

    fn all_tracks() -> InputArgs {
        InputArgs {
            track: None,
            min_duration: 0.0,
            min_velocity: 0,
        }
    }

    #[test]
    fn merges_note_tracks_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let midi = load(&two_track_file(dir.path())).unwrap();
        let config = ScoreConfig::default();

        let merged = select_notes(&midi, &all_tracks(), &config).unwrap();
        assert_eq!(merged.len(), 12);
        assert_eq!(merged.sustains().len(), 2);

        let second = InputArgs {
            track: Some(2),
            ..all_tracks()
        };
        assert_eq!(select_notes(&midi, &second, &config).unwrap().len(), 4);

        let missing = InputArgs {
            track: Some(9),
            ..all_tracks()
        };
        assert!(select_notes(&midi, &missing, &config).is_err());
    }

    #[test]
    fn quiet_notes_are_dropped_on_request() {
        let dir = tempfile::tempdir().unwrap();
        let midi = load(&two_track_file(dir.path())).unwrap();
        let loud_only = InputArgs {
            min_velocity: 70,
            ..all_tracks()
        };
        let container = select_notes(&midi, &loud_only, &ScoreConfig::default()).unwrap();
        assert_eq!(container.len(), 8);
    }

    #[test]
    fn hands_file_has_a_track_per_hand() {
        let dir = tempfile::tempdir().unwrap();
        let input = two_track_file(dir.path());
        let output = dir.path().join("hands.mid");

        hands(&input, &output, &all_tracks(), &ScoreConfig::default()).unwrap();

        let midi = load(&output).unwrap();
        let tracks: Vec<&PlainScore> = midi.note_tracks().map(|(_, t)| t).collect();
        assert_eq!(tracks.len(), 2);
        assert!(tracks[0].notes.iter().all(|n| n.pitch >= 72));
        assert!(tracks[1].notes.iter().all(|n| n.pitch == 40));
        assert_eq!(tracks[1].sustains.len(), 2);
    }

    #[test]
    fn normalize_writes_every_track() {
        let dir = tempfile::tempdir().unwrap();
        let input = two_track_file(dir.path());
        let output = dir.path().join("normalized.mid");

        normalize(&input, &output, &ScoreConfig::default()).unwrap();

        let before = load(&input).unwrap();
        let after = load(&output).unwrap();
        assert_eq!(after.tracks.len(), before.tracks.len());
        // Pedaled bass notes are stretched to the pedal release.
        let bass = &after.tracks[2].notes;
        assert_eq!(bass[0].offset, 3.5);
    }

    fn note_counts(midi: &MidiScore) -> Vec<(usize, usize)> {
        midi.note_tracks().map(|(i, t)| (i, t.notes.len())).collect()
    }

    #[test]
    fn normalize_keeps_tracks_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let input = two_track_file(dir.path());
        let once = dir.path().join("once.mid");
        let twice = dir.path().join("twice.mid");
        let config = ScoreConfig::default();

        normalize(&input, &once, &config).unwrap();
        normalize(&once, &twice, &config).unwrap();

        let before = load(&input).unwrap();
        let after_once = load(&once).unwrap();
        let after_twice = load(&twice).unwrap();
        assert_eq!(note_counts(&before), vec![(1, 8), (2, 4)]);
        assert_eq!(note_counts(&after_once), note_counts(&before));
        assert_eq!(note_counts(&after_twice), note_counts(&before));
        assert_eq!(after_twice.tracks.len(), before.tracks.len());
        assert_eq!(after_twice.tempo, before.tempo);

        // A track picked by index still points at the same part.
        let bass = InputArgs {
            track: Some(2),
            ..all_tracks()
        };
        let picked = select_notes(&after_twice, &bass, &config).unwrap();
        assert!(picked.notes().iter().all(|n| n.pitch == 40));
    }

    #[test]
    fn hands_file_starts_with_a_conductor_track() {
        let dir = tempfile::tempdir().unwrap();
        let input = two_track_file(dir.path());
        let output = dir.path().join("hands.mid");

        hands(&input, &output, &all_tracks(), &ScoreConfig::default()).unwrap();

        let midi = load(&output).unwrap();
        assert_eq!(midi.tracks.len(), 3);
        assert!(midi.tracks[0].notes.is_empty());
        let indices: Vec<usize> = midi.note_tracks().map(|(i, _)| i).collect();
        assert_eq!(indices, vec![1, 2]);
    }
}
