//! Configuration loading for the score analysis tools.
//!
//! Kept dependency-light so the analysis library and the `score` binary can
//! both import it without dragging in each other.
//!
//! # Usage
//!
//! ```rust,no_run
//! use scoreconf::ScoreConfig;
//!
//! let config = ScoreConfig::load().expect("Failed to load config");
//! println!("chord merge threshold: {}", config.chords.merge_threshold);
//! println!("normalize policy: {}", config.normalize.policy);
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/scoreline/config.toml` (system)
//! 2. `~/.config/scoreline/config.toml` (user)
//! 3. `./scoreline.toml` (local override), or a path given on the command line
//! 4. Environment variables (`SCORELINE_*`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [sanitize]
//! min_gap = 0.0078125
//!
//! [chords]
//! merge_threshold = 0.1
//!
//! [hands]
//! spread = 7.0
//! window = 4.0
//!
//! [rhythm]
//! strategy = "sustain_regions"
//!
//! [normalize]
//! policy = "notes_display"
//!
//! [telemetry]
//! log_level = "debug"
//! ```

pub mod analysis;
pub mod loader;

pub use analysis::{
    ChordConfig, DownbeatStrategy, HandConfig, NormalizeConfig, NormalizePolicy, RhythmConfig,
    SanitizeConfig,
};
pub use loader::{discover_config_files_with_override, ConfigSources};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Logging settings for the binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// `tracing_subscriber` filter directive.
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

/// Complete configuration for one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ScoreConfig {
    #[serde(default)]
    pub sanitize: SanitizeConfig,
    #[serde(default)]
    pub chords: ChordConfig,
    #[serde(default)]
    pub hands: HandConfig,
    #[serde(default)]
    pub rhythm: RhythmConfig,
    #[serde(default)]
    pub normalize: NormalizeConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl ScoreConfig {
    /// Load configuration from all sources.
    ///
    /// Load order (later wins):
    /// 1. Compiled defaults
    /// 2. `/etc/scoreline/config.toml`
    /// 3. `~/.config/scoreline/config.toml`
    /// 4. `./scoreline.toml`
    /// 5. Environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration with `config_path` replacing the local override.
    pub fn load_from(config_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&std::path::Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = ScoreConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            loader::overlay_file(&mut config, &path)?;
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        // Build TOML manually for nicer formatting
        let mut output = String::new();

        output.push_str("# Score analysis configuration\n\n");

        output.push_str("[sanitize]\n");
        output.push_str(&format!("min_gap = {:?}\n", self.sanitize.min_gap));

        output.push_str("\n[chords]\n");
        output.push_str(&format!(
            "merge_threshold = {:?}\n",
            self.chords.merge_threshold
        ));
        output.push_str(&format!(
            "single_hand_span = {}\n",
            self.chords.single_hand_span
        ));
        output.push_str(&format!("wide_span = {}\n", self.chords.wide_span));

        output.push_str("\n[hands]\n");
        output.push_str(&format!("spread = {:?}\n", self.hands.spread));
        output.push_str(&format!("window = {:?}\n", self.hands.window));

        output.push_str("\n[rhythm]\n");
        output.push_str(&format!("tolerance = {:?}\n", self.rhythm.tolerance));
        output.push_str(&format!(
            "include_note_durations = {}\n",
            self.rhythm.include_note_durations
        ));
        output.push_str(&format!("strategy = \"{}\"\n", self.rhythm.strategy));

        output.push_str("\n[normalize]\n");
        output.push_str(&format!("policy = \"{}\"\n", self.normalize.policy));
        output.push_str(&format!("margin = {:?}\n", self.normalize.margin));
        output.push_str(&format!("min_length = {:?}\n", self.normalize.min_length));
        output.push_str(&format!(
            "tag_ambiguous = {}\n",
            self.normalize.tag_ambiguous
        ));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!(
            "log_level = \"{}\"\n",
            self.telemetry.log_level
        ));

        output
    }
}
