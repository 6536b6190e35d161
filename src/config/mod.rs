//! Configuration management for `beads_backfill`.
//!
//! Configuration sources and precedence (highest wins):
//! 1. CLI overrides
//! 2. Environment variables (`BACKFILL_*`, plus `BEADS_JSONL`)
//! 3. Project config (.beads/config.yaml)
//! 4. Legacy user config (~/.beads/config.yaml)
//! 5. Defaults
//!
//! File locations inside the beads directory come from `metadata.json`.

use crate::error::{BackfillError, Result};
use crate::history::HistoryConfig;
use crate::storage::SqliteStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Default database filename used when metadata is missing.
const DEFAULT_DB_FILENAME: &str = "beads.db";
/// Default JSONL filename used when metadata is missing.
const DEFAULT_JSONL_FILENAME: &str = "issues.jsonl";
/// Default export target, relative to the working directory.
pub const DEFAULT_OUTPUT_FILENAME: &str = "missing_issues.jsonl";
/// Default `SQLite` busy timeout.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 30_000;

const ENV_PREFIX: &str = "BACKFILL_";

/// Startup metadata describing DB + JSONL file names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Metadata {
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub jsonl_export: String,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            database: DEFAULT_DB_FILENAME.to_string(),
            jsonl_export: DEFAULT_JSONL_FILENAME.to_string(),
        }
    }
}

impl Metadata {
    /// Load metadata.json from the beads directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(beads_dir: &Path) -> Result<Self> {
        let path = beads_dir.join("metadata.json");
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(&path).map_err(|e| BackfillError::file_io(&path, e))?;
        let mut metadata: Self = serde_json::from_str(&contents)?;

        if metadata.database.trim().is_empty() {
            metadata.database = DEFAULT_DB_FILENAME.to_string();
        }
        if metadata.jsonl_export.trim().is_empty() {
            metadata.jsonl_export = DEFAULT_JSONL_FILENAME.to_string();
        }

        Ok(metadata)
    }
}

/// Discover the active `.beads` directory.
///
/// Honors `BEADS_DIR` when set, otherwise walks up from `start` (or CWD).
///
/// # Errors
///
/// Returns `NotInitialized` if no beads directory is found.
pub fn discover_beads_dir(start: Option<&Path>) -> Result<PathBuf> {
    let env_dir = env::var("BEADS_DIR")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from);
    discover_beads_dir_with_env(start, env_dir.as_deref())
}

fn discover_beads_dir_with_env(start: Option<&Path>, env_dir: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = env_dir {
        if path.is_dir() {
            return Ok(path.to_path_buf());
        }
    }

    let mut current = match start {
        Some(path) => path.to_path_buf(),
        None => env::current_dir()?,
    };

    loop {
        let candidate = current.join(".beads");
        if candidate.is_dir() {
            return Ok(candidate);
        }

        if !current.pop() {
            break;
        }
    }

    Err(BackfillError::NotInitialized)
}

/// A flat configuration layer keyed by normalized (kebab-case) names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigLayer {
    pub values: HashMap<String, String>,
}

impl ConfigLayer {
    /// Merge another layer on top of this one (higher precedence wins).
    pub fn merge_from(&mut self, other: &Self) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Merge multiple layers in precedence order (lowest to highest).
    #[must_use]
    pub fn merge_layers(layers: &[Self]) -> Self {
        let mut merged = Self::default();
        for layer in layers {
            merged.merge_from(layer);
        }
        merged
    }

    /// Build a layer from a YAML file path. Missing files return empty config.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn from_yaml(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| BackfillError::file_io(path, e))?;
        let value: serde_yaml::Value = serde_yaml::from_str(&contents)?;
        Ok(layer_from_yaml_value(&value))
    }

    /// Build a layer from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_vars(env::vars())
    }

    /// Build a layer from `(name, value)` pairs.
    ///
    /// `BACKFILL_HISTORY_MAX_COUNT` is stored under `history.max-count` (and
    /// the flat `history-max-count`). `BEADS_JSONL` sets `jsonl`.
    #[must_use]
    pub fn from_env_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut layer = Self::default();
        let mut beads_jsonl = None;

        for (key, value) in vars {
            if key == "BEADS_JSONL" {
                beads_jsonl = Some(value);
            } else if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                for variant in env_key_variants(stripped) {
                    layer.set(&variant, value.clone());
                }
            }
        }

        if let Some(value) = beads_jsonl.filter(|v| !v.trim().is_empty()) {
            layer.set("jsonl", value);
        }

        layer
    }

    fn set(&mut self, key: &str, value: String) {
        self.values.insert(normalize_key(key), value);
    }

    fn get(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .find_map(|key| self.values.get(&normalize_key(key)))
            .map(String::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// CLI overrides for config loading (optional).
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub db: Option<PathBuf>,
    pub jsonl: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub lock_timeout: Option<u64>,
    pub no_history: bool,
}

impl CliOverrides {
    #[must_use]
    pub fn as_layer(&self) -> ConfigLayer {
        let mut layer = ConfigLayer::default();

        if let Some(path) = &self.db {
            layer.set("db", path.to_string_lossy().to_string());
        }
        if let Some(path) = &self.jsonl {
            layer.set("jsonl", path.to_string_lossy().to_string());
        }
        if let Some(path) = &self.output {
            layer.set("output", path.to_string_lossy().to_string());
        }
        if let Some(lock_timeout) = self.lock_timeout {
            layer.set("lock-timeout", lock_timeout.to_string());
        }
        if self.no_history {
            layer.set("history.enabled", "false".to_string());
        }

        layer
    }
}

/// Load project config (.beads/config.yaml).
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(beads_dir: &Path) -> Result<ConfigLayer> {
    ConfigLayer::from_yaml(&beads_dir.join("config.yaml"))
}

/// Load legacy user config (~/.beads/config.yaml).
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_legacy_user_config() -> Result<ConfigLayer> {
    let Ok(home) = env::var("HOME") else {
        return Ok(ConfigLayer::default());
    };
    let path = Path::new(&home).join(".beads").join("config.yaml");
    ConfigLayer::from_yaml(&path)
}

/// Default config layer (lowest precedence).
#[must_use]
pub fn default_config_layer() -> ConfigLayer {
    let mut layer = ConfigLayer::default();
    layer.set("output", DEFAULT_OUTPUT_FILENAME.to_string());
    layer.set("lock-timeout", DEFAULT_LOCK_TIMEOUT_MS.to_string());
    layer
}

/// Load configuration with classic precedence order.
///
/// # Errors
///
/// Returns an error if any config file cannot be read or parsed.
pub fn load_config(beads_dir: &Path, cli: &CliOverrides) -> Result<ConfigLayer> {
    Ok(ConfigLayer::merge_layers(&[
        default_config_layer(),
        load_legacy_user_config()?,
        load_project_config(beads_dir)?,
        ConfigLayer::from_env(),
        cli.as_layer(),
    ]))
}

/// Resolved paths for this workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    pub beads_dir: PathBuf,
    pub db_path: PathBuf,
    pub jsonl_path: PathBuf,
    pub metadata: Metadata,
}

impl ConfigPaths {
    /// Resolve database + JSONL paths from metadata and layer overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if metadata cannot be read.
    pub fn resolve(beads_dir: &Path, layer: &ConfigLayer) -> Result<Self> {
        let metadata = Metadata::load(beads_dir)?;
        let db_path = layer.get(&["db", "database"]).map_or_else(
            || resolve_in(beads_dir, &metadata.database),
            PathBuf::from,
        );
        let jsonl_path = layer.get(&["jsonl", "jsonl-export"]).map_or_else(
            || resolve_in(beads_dir, &metadata.jsonl_export),
            PathBuf::from,
        );

        Ok(Self {
            beads_dir: beads_dir.to_path_buf(),
            db_path,
            jsonl_path,
            metadata,
        })
    }
}

fn resolve_in(beads_dir: &Path, name: &str) -> PathBuf {
    let candidate = PathBuf::from(name);
    if candidate.is_absolute() {
        candidate
    } else {
        beads_dir.join(candidate)
    }
}

/// Everything a backfill run needs to know, fully resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillConfig {
    pub paths: ConfigPaths,
    /// Export target for `export`.
    pub output: PathBuf,
    pub lock_timeout_ms: u64,
    pub history: HistoryConfig,
}

impl BackfillConfig {
    /// Resolve a merged layer into typed settings.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error for malformed numeric or boolean values.
    pub fn from_layer(beads_dir: &Path, layer: &ConfigLayer) -> Result<Self> {
        let paths = ConfigPaths::resolve(beads_dir, layer)?;
        let output = PathBuf::from(layer.get(&["output"]).unwrap_or(DEFAULT_OUTPUT_FILENAME));

        let lock_timeout_ms =
            parse_number(layer, &["lock-timeout"])?.unwrap_or(DEFAULT_LOCK_TIMEOUT_MS);

        let defaults = HistoryConfig::default();
        let history = HistoryConfig {
            enabled: match layer.get(&["history.enabled", "history-enabled"]) {
                Some(raw) => parse_bool(raw).ok_or_else(|| {
                    BackfillError::Config(format!("history.enabled: invalid boolean '{raw}'"))
                })?,
                None => defaults.enabled,
            },
            max_count: parse_number(layer, &["history.max-count", "history-max-count"])?
                .unwrap_or(defaults.max_count),
            max_age_days: parse_number(layer, &["history.max-age-days", "history-max-age-days"])?
                .unwrap_or(defaults.max_age_days),
        };

        Ok(Self {
            paths,
            output,
            lock_timeout_ms,
            history,
        })
    }

    /// Discover the beads dir (unless given) and load every layer.
    ///
    /// # Errors
    ///
    /// Returns an error if discovery fails or any layer is malformed.
    pub fn load(beads_dir: Option<&Path>, cli: &CliOverrides) -> Result<Self> {
        let beads_dir = match beads_dir {
            Some(dir) if dir.is_dir() => dir.to_path_buf(),
            Some(dir) => {
                return Err(BackfillError::Config(format!(
                    "beads directory '{}' does not exist",
                    dir.display()
                )));
            }
            None => discover_beads_dir(None)?,
        };
        let layer = load_config(&beads_dir, cli)?;
        let config = Self::from_layer(&beads_dir, &layer)?;

        tracing::debug!(
            beads_dir = %config.paths.beads_dir.display(),
            db = %config.paths.db_path.display(),
            jsonl = %config.paths.jsonl_path.display(),
            "Resolved configuration"
        );
        Ok(config)
    }

    /// Open the store read-only with the configured busy timeout.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the database cannot be opened.
    pub fn open_store(&self) -> Result<SqliteStore> {
        SqliteStore::open(&self.paths.db_path, Some(self.lock_timeout_ms))
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase().replace('_', "-")
}

fn env_key_variants(raw: &str) -> Vec<String> {
    let raw_lower = raw.to_lowercase();
    let mut variants = vec![raw_lower.clone(), raw_lower.replace('_', ".")];
    // BACKFILL_HISTORY_MAX_COUNT -> history.max-count
    if let Some((section, rest)) = raw_lower.split_once('_') {
        variants.push(format!("{section}.{rest}"));
    }
    variants
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

fn parse_number<T: std::str::FromStr>(layer: &ConfigLayer, keys: &[&str]) -> Result<Option<T>> {
    let Some(raw) = layer.get(keys) else {
        return Ok(None);
    };
    raw.parse::<T>().map(Some).map_err(|_| {
        BackfillError::Config(format!("{}: invalid number '{raw}'", keys[0]))
    })
}

fn layer_from_yaml_value(value: &serde_yaml::Value) -> ConfigLayer {
    let mut layer = ConfigLayer::default();
    let mut flat = HashMap::new();
    flatten_yaml(value, "", &mut flat);

    for (key, value) in flat {
        layer.set(&key, value);
    }

    layer
}

fn flatten_yaml(value: &serde_yaml::Value, prefix: &str, out: &mut HashMap<String, String>) {
    match value {
        serde_yaml::Value::Mapping(map) => {
            for (key, value) in map {
                let Some(key_str) = key.as_str() else {
                    continue;
                };
                let next_prefix = if prefix.is_empty() {
                    key_str.to_string()
                } else {
                    format!("{prefix}.{key_str}")
                };
                flatten_yaml(value, &next_prefix, out);
            }
        }
        _ => {
            if let Some(value) = yaml_scalar_to_string(value) {
                out.insert(prefix.to_string(), value);
            }
        }
    }
}

fn yaml_scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::Bool(v) => Some(v.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Null
        | serde_yaml::Value::Sequence(_)
        | serde_yaml::Value::Mapping(_) => None,
        serde_yaml::Value::Tagged(tagged) => yaml_scalar_to_string(&tagged.value),
    }
}
