//! `settings.yaml` / `strategies.yaml` loading (§6), with `${VAR}`
//! environment-variable expansion performed on the parsed YAML value before
//! it's deserialized into typed config structs.

use crate::strategies::StrategyConfigEntry;
use serde::Deserialize;
use shared_models::{ModelError, Result};
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaSettings {
    pub api_key: String,
    pub secret_key: String,
    pub data_url: String,
    pub base_url: String,
}

fn default_max_position_pct() -> f64 {
    0.25
}
fn default_max_orders_per_minute() -> u32 {
    10
}
fn default_cooldown_seconds() -> i64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct SafetySettings {
    #[serde(default = "default_max_position_pct")]
    pub max_position_pct: f64,
    #[serde(default = "default_max_orders_per_minute")]
    pub max_orders_per_minute: u32,
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: i64,
    #[serde(default)]
    pub paper_only: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub alpaca: AlpacaSettings,
    pub safety: SafetySettings,
}

#[derive(Debug, Clone, Deserialize)]
struct StrategiesFile {
    strategies: Vec<StrategyConfigEntry>,
}

/// Replaces `${VAR}` string values (whole-value match, not substring
/// interpolation) with the environment variable of the same name. If the
/// variable is unset, the literal token is left in place rather than
/// raising — matching the source's `os.environ.get(var, obj)` fallback.
fn expand_env_vars(value: serde_yaml::Value) -> serde_yaml::Value {
    match value {
        serde_yaml::Value::String(s) => {
            if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
                match std::env::var(var_name) {
                    Ok(resolved) => serde_yaml::Value::String(resolved),
                    Err(_) => serde_yaml::Value::String(s),
                }
            } else {
                serde_yaml::Value::String(s)
            }
        }
        serde_yaml::Value::Sequence(seq) => {
            serde_yaml::Value::Sequence(seq.into_iter().map(expand_env_vars).collect())
        }
        serde_yaml::Value::Mapping(map) => {
            let expanded = map
                .into_iter()
                .map(|(k, v)| (k, expand_env_vars(v)))
                .collect();
            serde_yaml::Value::Mapping(expanded)
        }
        other => other,
    }
}

fn load_yaml_expanded(path: &Path) -> Result<serde_yaml::Value> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ModelError::Config(format!("reading {}: {}", path.display(), e)))?;
    let value: serde_yaml::Value = serde_yaml::from_str(&raw)?;
    Ok(expand_env_vars(value))
}

pub fn load_settings(config_dir: &Path) -> Result<Settings> {
    let value = load_yaml_expanded(&config_dir.join("settings.yaml"))?;
    Ok(serde_yaml::from_value(value)?)
}

pub fn load_strategies(config_dir: &Path) -> Result<Vec<StrategyConfigEntry>> {
    let value = load_yaml_expanded(&config_dir.join("strategies.yaml"))?;
    let parsed: StrategiesFile = serde_yaml::from_value(value)?;
    Ok(parsed.strategies)
}
