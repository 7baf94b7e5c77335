//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, ScoreConfig};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/scoreline/config.toml");
    if system.exists() {
        files.push(system);
    }

    // User config (XDG_CONFIG_HOME or ~/.config)
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("scoreline/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("scoreline.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Load a config file on top of the compiled defaults.
pub fn load_from_file(path: &Path) -> Result<ScoreConfig, ConfigError> {
    let mut config = ScoreConfig::default();
    overlay_file(&mut config, path)?;
    Ok(config)
}

/// Overlay the keys present in `path` onto `config`.
pub fn overlay_file(config: &mut ScoreConfig, path: &Path) -> Result<(), ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    overlay_toml(config, &contents, path)
}

/// Parse a TOML document and overlay only the keys it names.
fn overlay_toml(config: &mut ScoreConfig, contents: &str, path: &Path) -> Result<(), ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    if let Some(sanitize) = table.get("sanitize").and_then(|v| v.as_table()) {
        if let Some(v) = float(sanitize.get("min_gap")) {
            config.sanitize.min_gap = v;
        }
    }

    if let Some(chords) = table.get("chords").and_then(|v| v.as_table()) {
        if let Some(v) = float(chords.get("merge_threshold")) {
            config.chords.merge_threshold = v;
        }
        if let Some(v) = chords.get("single_hand_span").and_then(|v| v.as_integer()) {
            config.chords.single_hand_span = v.clamp(0, 127) as u8;
        }
        if let Some(v) = chords.get("wide_span").and_then(|v| v.as_integer()) {
            config.chords.wide_span = v.clamp(0, 127) as u8;
        }
    }

    if let Some(hands) = table.get("hands").and_then(|v| v.as_table()) {
        if let Some(v) = float(hands.get("spread")) {
            config.hands.spread = v;
        }
        if let Some(v) = float(hands.get("window")) {
            config.hands.window = v;
        }
    }

    if let Some(rhythm) = table.get("rhythm").and_then(|v| v.as_table()) {
        if let Some(v) = float(rhythm.get("tolerance")) {
            config.rhythm.tolerance = v;
        }
        if let Some(v) = rhythm.get("include_note_durations").and_then(|v| v.as_bool()) {
            config.rhythm.include_note_durations = v;
        }
        if let Some(v) = rhythm.get("strategy").and_then(|v| v.as_str()) {
            config.rhythm.strategy = parse_enum(v, path)?;
        }
    }

    if let Some(normalize) = table.get("normalize").and_then(|v| v.as_table()) {
        if let Some(v) = normalize.get("policy").and_then(|v| v.as_str()) {
            config.normalize.policy = parse_enum(v, path)?;
        }
        if let Some(v) = float(normalize.get("margin")) {
            config.normalize.margin = v;
        }
        if let Some(v) = float(normalize.get("min_length")) {
            config.normalize.min_length = v;
        }
        if let Some(v) = normalize.get("tag_ambiguous").and_then(|v| v.as_bool()) {
            config.normalize.tag_ambiguous = v;
        }
    }

    if let Some(telemetry) = table.get("telemetry").and_then(|v| v.as_table()) {
        if let Some(v) = telemetry.get("log_level").and_then(|v| v.as_str()) {
            config.telemetry.log_level = v.to_string();
        }
    }

    Ok(())
}

/// TOML integers are accepted wherever a float is expected.
fn float(value: Option<&toml::Value>) -> Option<f64> {
    match value? {
        toml::Value::Float(f) => Some(*f),
        toml::Value::Integer(i) => Some(*i as f64),
        _ => None,
    }
}

fn parse_enum<T: FromStr<Err = String>>(value: &str, path: &Path) -> Result<T, ConfigError> {
    value.parse().map_err(|message| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

/// Apply environment variable overrides to config.
///
/// Unparseable values are skipped rather than failing the load.
pub fn apply_env_overrides(config: &mut ScoreConfig, sources: &mut ConfigSources) {
    if let Some(v) = parsed_var("SCORELINE_MIN_GAP", sources) {
        config.sanitize.min_gap = v;
    }
    if let Some(v) = parsed_var("SCORELINE_MERGE_THRESHOLD", sources) {
        config.chords.merge_threshold = v;
    }
    if let Some(v) = parsed_var("SCORELINE_HAND_SPREAD", sources) {
        config.hands.spread = v;
    }
    if let Some(v) = parsed_var("SCORELINE_NORMALIZE_POLICY", sources) {
        config.normalize.policy = v;
    }
    if let Some(v) = parsed_var("SCORELINE_DOWNBEAT_STRATEGY", sources) {
        config.rhythm.strategy = v;
    }

    if let Ok(v) = env::var("SCORELINE_LOG_LEVEL") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("SCORELINE_LOG_LEVEL".to_string());
    }
    // Also support RUST_LOG
    if let Ok(v) = env::var("RUST_LOG") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }
}

fn parsed_var<T: FromStr>(name: &str, sources: &mut ConfigSources) -> Option<T> {
    let value = env::var(name).ok()?.parse().ok()?;
    sources.env_overrides.push(name.to_string());
    Some(value)
}
