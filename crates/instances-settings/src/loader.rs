//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`InstancesSettings::default()`]
//! 2. If `<data dir>/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `INSTANCES_*` environment variable overrides (highest priority)
//! 4. [`InstancesSettings::validate`] corrects out-of-range values
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{DEFAULT_DATA_DIR, InstancesSettings, MAX_CREATION_RETRY_BASE_SECS};

/// Name of the settings file inside the data directory.
pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// Environment variable naming the data directory.
pub const ENV_DATA_DIR: &str = "INSTANCES_DATA_DIR";

/// Resolve the path to the settings file (`<data dir>/settings.json`).
///
/// The data directory comes from `INSTANCES_DATA_DIR`, falling back to
/// `UserData/Instances` relative to the working directory.
pub fn settings_path() -> PathBuf {
    let dir = read_env_string(ENV_DATA_DIR).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
    PathBuf::from(dir).join(SETTINGS_FILE_NAME)
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<InstancesSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<InstancesSettings> {
    let mut settings = load_file_layers(path)?;
    apply_env_overrides(&mut settings);
    settings.validate();
    Ok(settings)
}

/// Defaults merged with the file at `path`, without env overrides.
pub fn load_file_layers(path: &Path) -> Result<InstancesSettings> {
    let defaults = serde_json::to_value(InstancesSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut InstancesSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup` (an env-var reader in production).
///
/// Invalid values are ignored with a warning and the file/default value kept.
pub fn apply_overrides<F>(settings: &mut InstancesSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read_parsed(&read, "INSTANCES_REJOIN_ON_RESTART", parse_bool) {
        settings.rejoin_on_restart = v;
    }
    if let Some(v) = read_parsed(&read, "INSTANCES_REJOIN_PREVIOUS_POSITION", parse_bool) {
        settings.rejoin_previous_position = v;
    }
    if let Some(v) = read_parsed(&read, "INSTANCES_START_ONLINE", parse_bool) {
        settings.start_in_online_session = v;
    }
    if let Some(v) = read_parsed(&read, "INSTANCES_HISTORY_MAX", |v| {
        parse_usize_range(v, 0, 1000)
    }) {
        settings.history_max_count = v;
    }
    if let Some(v) = read_parsed(&read, "INSTANCES_REJOIN_TIMEOUT_MINUTES", |v| {
        v.parse::<i64>().ok()
    }) {
        settings.rejoin_timeout_minutes = v;
    }
    if let Some(v) = read_parsed(&read, "INSTANCES_RETRY_BASE_SECS", |v| {
        parse_f64_range(v, 0.0, MAX_CREATION_RETRY_BASE_SECS)
    }) {
        settings.creation_retry_base_interval_secs = v;
    }
    if let Some(v) = read(ENV_DATA_DIR) {
        settings.data_dir = v;
    }
}

fn read_parsed<R, P, T>(read: &R, name: &str, parse: P) -> Option<T>
where
    R: Fn(&str) -> Option<String>,
    P: Fn(&str) -> Option<T>,
{
    let val = read(name)?;
    let result = parse(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid env var, ignoring");
    }
    result
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a finite `f64` within a range.
pub fn parse_f64_range(val: &str, min: f64, max: f64) -> Option<f64> {
    let n: f64 = val.parse().ok()?;
    (n.is_finite() && n >= min && n <= max).then_some(n)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
