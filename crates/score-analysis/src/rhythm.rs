//! Bar length and downbeat inference.
//!
//! The bar length is the period that best explains the observed pedal (and
//! optionally note) durations: a golden-section search over a sawtooth
//! "distance to the nearest multiple" loss. Downbeats are then proposed by
//! one of two walks over that grid, see [`DownbeatStrategy`].

use scoreconf::{DownbeatStrategy, RhythmConfig};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::chords::Chord;
use crate::container::ScoreContainer;
use crate::regions::Region;

const INV_PHI: f64 = 0.618_033_988_749_894_9;

/// Medians below this many beats are doubled before searching.
const SHORT_MEDIAN: f64 = 3.0;
/// A minimizer this close to the lower edge means no periodic pattern.
const EDGE_MARGIN: f64 = 0.1;
/// Smallest half-width of the search interval, in beats.
const MIN_VARIANCE: f64 = 1.0 / 6.0;
/// Weight of the proximity term against the normalised turn count.
const PROXIMITY_WEIGHT: f64 = 5.0;
/// A region starting this many bars after the last downbeat opens a new bar.
const REGION_BAR_FRACTION: f64 = 0.75;

/// Minimize a unimodal `f` over `[lo, hi]` to within `tolerance`.
///
/// Stops early once floating point can no longer shrink the interval.
pub fn golden_section_minimize(f: impl Fn(f64) -> f64, lo: f64, hi: f64, tolerance: f64) -> f64 {
    let (mut lo, mut hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
    let tolerance = tolerance.max(f64::EPSILON);

    let mut c = hi - INV_PHI * (hi - lo);
    let mut d = lo + INV_PHI * (hi - lo);
    let (mut fc, mut fd) = (f(c), f(d));

    while hi - lo > tolerance {
        let width = hi - lo;
        if fc < fd {
            hi = d;
            d = c;
            fd = fc;
            c = hi - INV_PHI * (hi - lo);
            fc = f(c);
        } else {
            lo = c;
            c = d;
            fc = fd;
            d = lo + INV_PHI * (hi - lo);
            fd = f(d);
        }
        if hi - lo >= width {
            break;
        }
    }

    (lo + hi) / 2.0
}

/// Total distance from each duration to its nearest multiple of `period`.
pub fn periodic_loss(durations: &[f64], period: f64) -> f64 {
    durations
        .iter()
        .map(|&d| {
            let rem = d.rem_euclid(period);
            rem.min(period - rem)
        })
        .sum()
}

fn median(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Best-fitting bar length for a set of durations, in beats.
///
/// Returns `None` when there are no positive finite durations.
pub fn baseline_bar_length(durations: &[f64], tolerance: f64) -> Option<f64> {
    let mut samples: Vec<f64> = durations
        .iter()
        .copied()
        .filter(|d| d.is_finite() && *d > 0.0)
        .collect();
    if samples.is_empty() {
        return None;
    }
    samples.sort_by(f64::total_cmp);

    let raw = median(&samples);
    let center = if raw < SHORT_MEDIAN { raw * 2.0 } else { raw };
    let variance = MIN_VARIANCE.max(center / 2.0);
    // Keep the period strictly positive for tiny medians.
    let lo = (center - variance).max(center / 4.0);
    let hi = center + variance;

    let best = golden_section_minimize(|p| periodic_loss(&samples, p), lo, hi, tolerance);
    if best - lo <= EDGE_MARGIN {
        debug!(median = raw, "no periodic duration pattern, using the median");
        return Some(raw);
    }
    Some(best)
}

/// Durations the bar-length search learns from.
///
/// Pedal lengths, plus note lengths when asked or when there is no pedal.
pub fn duration_samples(container: &ScoreContainer, include_note_durations: bool) -> Vec<f64> {
    let mut samples: Vec<f64> = container.sustains().iter().map(|s| s.duration()).collect();
    if include_note_durations || samples.is_empty() {
        samples.extend(container.notes().iter().map(|n| n.duration()));
    }
    samples
}

/// Downbeats proposed by Gaussian-weighted scoring of each bar's bass notes.
///
/// Starting at the first chord, each window `[beat, beat + bar)` picks the
/// chord whose lowest note scores best on closeness to the window middle
/// plus how deep a melodic turn it ends. The next window starts one bar
/// after the pick. Empty windows are skipped a bar at a time.
pub fn chord_weighted_downbeats(container: &ScoreContainer, chords: &[Chord], bar: f64) -> Vec<f64> {
    if chords.is_empty() || !(bar.is_finite() && bar > 0.0) {
        return Vec::new();
    }

    let bases: Vec<(f64, u8)> = chords
        .iter()
        .map(|chord| {
            let note = container.note(chord.lowest(container));
            (note.onset, note.pitch)
        })
        .collect();

    // Length of the run of strictly higher bass notes right before each one.
    let mut pointy = vec![0usize; bases.len()];
    for i in 0..bases.len() {
        let pitch = bases[i].1;
        pointy[i] = bases[..i].iter().rev().take_while(|(_, p)| *p > pitch).count();
    }

    let sd = bar / 2.0;
    let mut out = Vec::new();
    let mut beat = chords[0].onset();
    let mut cursor = 0;

    while cursor < chords.len() {
        while cursor < chords.len() && chords[cursor].onset() < beat {
            cursor += 1;
        }
        if cursor == chords.len() {
            break;
        }

        let end = chords[cursor..].partition_point(|c| c.onset() < beat + bar) + cursor;
        if end == cursor {
            let bars = ((chords[cursor].onset() - beat) / bar).floor().max(1.0);
            beat += bars * bar;
            continue;
        }

        let mid = beat + bar / 2.0;
        let max_pointy = pointy[cursor..end].iter().copied().max().unwrap_or(0).max(1) as f64;
        let mut best = cursor;
        let mut best_score = f64::NEG_INFINITY;
        for i in cursor..end {
            let distance = bases[i].0 - mid;
            let proximity = PROXIMITY_WEIGHT * (-(distance * distance) / (2.0 * sd * sd)).exp();
            let score = proximity + pointy[i] as f64 / max_pointy;
            if score > best_score {
                best = i;
                best_score = score;
            }
        }

        let downbeat = bases[best].0;
        out.push(downbeat);
        beat = downbeat + bar;
        cursor = best + 1;
    }

    out
}

/// Downbeats taken from region onsets on the bar grid.
///
/// A region opens a new bar once it starts at least three quarters of a bar
/// after the previous downbeat; whole bars in between are filled in.
pub fn sustain_region_downbeats(regions: &[Region], bar: f64) -> Vec<f64> {
    if regions.is_empty() || !(bar.is_finite() && bar > 0.0) {
        return Vec::new();
    }

    let threshold = REGION_BAR_FRACTION * bar;
    let mut out: Vec<f64> = Vec::new();
    for region in regions {
        match out.last().copied() {
            None => out.push(region.onset),
            Some(last) if region.onset - last >= threshold => {
                let mut grid = last + bar;
                while region.onset - grid >= threshold {
                    out.push(grid);
                    grid += bar;
                }
                out.push(region.onset);
            }
            Some(_) => {}
        }
    }
    out
}

/// Inferred bar length and downbeat positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarGrid {
    pub strategy: DownbeatStrategy,
    pub bar_length: Option<f64>,
    pub downbeats: Vec<f64>,
}

/// Run the configured downbeat strategy.
pub fn downbeats(
    container: &ScoreContainer,
    chords: &[Chord],
    regions: &[Region],
    config: &RhythmConfig,
) -> BarGrid {
    let samples = match config.strategy {
        DownbeatStrategy::SustainRegions if !container.sustains().is_empty() => {
            regions.iter().map(Region::duration).collect()
        }
        _ => duration_samples(container, config.include_note_durations),
    };
    let bar_length = baseline_bar_length(&samples, config.tolerance);

    let downbeats = match (config.strategy, bar_length) {
        (_, None) => Vec::new(),
        (DownbeatStrategy::ChordWeighted, Some(bar)) => chord_weighted_downbeats(container, chords, bar),
        (DownbeatStrategy::SustainRegions, Some(bar)) => sustain_region_downbeats(regions, bar),
    };

    info!(
        strategy = %config.strategy,
        bar_length = ?bar_length,
        downbeats = downbeats.len(),
        "inferred bar grid"
    );

    BarGrid {
        strategy: config.strategy,
        bar_length,
        downbeats,
    }
}
