//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.lectern/config.json`) and
//! environment. Missing file means defaults; every knob has one.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::chat::{DEFAULT_CONTEXT_BUDGET, DEFAULT_MODEL};

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Managed runtime settings (server URL, data directory).
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Chat defaults (model, context budget).
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Runtime server location and on-disk layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// Base URL of the runtime HTTP API. Unset = http://127.0.0.1:11434.
    pub base_url: Option<String>,

    /// Directory holding the managed binary and model storage
    /// (default ~/.lectern/runtime).
    pub data_dir: Option<PathBuf>,
}

/// Chat defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatConfig {
    /// Model used for new sessions: the exact name from the runtime's model
    /// list (e.g. "llama3.2:1b"). A bare name without a tag also works.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Total character budget for the system prompt, split across the
    /// session's papers (default 24000).
    #[serde(default = "default_context_budget")]
    pub context_budget: usize,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_context_budget() -> usize {
    DEFAULT_CONTEXT_BUDGET
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            context_budget: default_context_budget(),
        }
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("LECTERN_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".lectern").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Resolve the runtime data directory: configured value or ~/.lectern/runtime.
pub fn resolve_data_dir(config: &Config) -> PathBuf {
    config.runtime.data_dir.clone().unwrap_or_else(|| {
        dirs::home_dir()
            .map(|h| h.join(".lectern").join("runtime"))
            .unwrap_or_else(|| PathBuf::from("runtime"))
    })
}

/// Load config from the default path (or LECTERN_CONFIG_PATH). Missing file
/// => default config. Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
