//! score - piano score analysis from the command line
//!
//! Subcommands:
//! - `score analyze <file>` - Chords, hands, key, bar grid and pedal report as JSON
//! - `score normalize <in> <out>` - Rewrite note offsets against the sustain pedal
//! - `score hands <in> <out>` - Split notes into right and left hand tracks
//! - `score features <file>` - Per-note feature vectors as JSON lines
//! - `score config` - Show the effective configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use scoreconf::{DownbeatStrategy, NormalizePolicy, ScoreConfig};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "score")]
#[command(about = "Chord, hand, meter, key and pedal analysis of piano MIDI")]
#[command(version)]
struct Cli {
    /// Config file used in place of ./scoreline.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Which notes of the input file to work on.
#[derive(Args, Clone, Debug)]
pub struct InputArgs {
    /// Only this track (0-based); by default all note tracks are merged
    #[arg(short, long)]
    pub track: Option<usize>,

    /// Drop notes shorter than this many beats before analysis
    #[arg(long, default_value = "0")]
    pub min_duration: f64,

    /// Drop notes quieter than this velocity before analysis
    #[arg(long, default_value = "0")]
    pub min_velocity: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a MIDI file and print the result as JSON
    Analyze {
        /// Input MIDI file
        file: PathBuf,

        #[command(flatten)]
        input: InputArgs,

        /// Downbeat walk to run
        #[arg(short, long)]
        strategy: Option<StrategyArg>,

        /// Pretty-print the JSON
        #[arg(long)]
        pretty: bool,
    },

    /// Correct note offsets against the sustain pedal
    Normalize {
        /// Input MIDI file
        input_file: PathBuf,

        /// Output MIDI file
        output_file: PathBuf,

        /// How ambiguous offsets are resolved
        #[arg(short, long)]
        policy: Option<PolicyArg>,

        /// Put notes with ambiguous offsets on their own channel
        #[arg(long)]
        tag_ambiguous: bool,
    },

    /// Write a two-track file with right and left hand notes
    Hands {
        /// Input MIDI file
        input_file: PathBuf,

        /// Output MIDI file
        output_file: PathBuf,

        #[command(flatten)]
        input: InputArgs,
    },

    /// Print per-note feature vectors, one JSON array per line
    Features {
        /// Input MIDI file
        file: PathBuf,

        #[command(flatten)]
        input: InputArgs,

        /// Standardize each feature across the file
        #[arg(long)]
        scale: bool,
    },

    /// Show the effective configuration and where it came from
    Config,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StrategyArg {
    ChordWeighted,
    SustainRegions,
}

impl From<StrategyArg> for DownbeatStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::ChordWeighted => DownbeatStrategy::ChordWeighted,
            StrategyArg::SustainRegions => DownbeatStrategy::SustainRegions,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PolicyArg {
    AcousticResult,
    NotesDisplay,
}

impl From<PolicyArg> for NormalizePolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::AcousticResult => NormalizePolicy::AcousticResult,
            PolicyArg::NotesDisplay => NormalizePolicy::NotesDisplay,
        }
    }
}

fn init_logging(config: &ScoreConfig) {
    // RUST_LOG wins over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.telemetry.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, sources) = ScoreConfig::load_with_sources_from(cli.config.as_deref())?;
    init_logging(&config);

    match cli.command {
        Commands::Analyze {
            file,
            input,
            strategy,
            pretty,
        } => {
            if let Some(strategy) = strategy {
                config.rhythm.strategy = strategy.into();
            }
            commands::analyze(&file, &input, &config, pretty)?;
        }
        Commands::Normalize {
            input_file,
            output_file,
            policy,
            tag_ambiguous,
        } => {
            if let Some(policy) = policy {
                config.normalize.policy = policy.into();
            }
            config.normalize.tag_ambiguous |= tag_ambiguous;
            commands::normalize(&input_file, &output_file, &config)?;
        }
        Commands::Hands {
            input_file,
            output_file,
            input,
        } => {
            commands::hands(&input_file, &output_file, &input, &config)?;
        }
        Commands::Features { file, input, scale } => {
            commands::features(&file, &input, &config, scale)?;
        }
        Commands::Config => {
            commands::show_config(&config, &sources);
        }
    }

    Ok(())
}
