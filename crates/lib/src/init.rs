//! Initialize the configuration directory: create ~/.lectern, a default
//! config file, and the runtime bin/models directories.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::{self, Config};

/// Create the config directory and default files if they do not exist.
/// - Creates the config directory (parent of config file path).
/// - Writes `config.json` with `{}` if missing.
/// - Creates the runtime `bin` and `models` directories under the data dir.
pub fn init_config_dir(config_path: &Path, config: &Config) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        std::fs::write(config_path, b"{}")
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    }

    let data_dir = config::resolve_data_dir(config);
    for dir in [data_dir.join("bin"), data_dir.join("models")] {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating runtime directory {}", dir.display()))?;
    }
    log::info!("runtime data directory ready at {}", data_dir.display());

    Ok(config_dir.to_path_buf())
}
