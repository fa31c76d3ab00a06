/// Config file loading and creation for the rankwise CLI.
///
/// Config lives at ~/.config/rankwise/config.toml.
/// All fields are optional. CLI args override config values.
use rankwise_core::{DecayPacing, MediaType};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::bail;

#[derive(Deserialize, Default)]
pub struct RankwiseConfig {
    pub library: Option<String>,
    pub media_type: Option<MediaType>,
    pub decay_pacing: Option<DecayPacing>,
    pub history_limit: Option<usize>,
}

const DEFAULT_CONFIG_TEMPLATE: &str = "\
# rankwise configuration
# All values here can be overridden by CLI flags.

# Where the library (ratings, comparison log, stats) is stored
# library = \"~/.local/share/rankwise/library.json\"

# Category used when --media-type is not given: \"anime\" or \"manga\"
# media_type = \"anime\"

# How idle items lose confidence in `rankwise decay`:
#   \"fixed\"      - a small fixed step per day (default)
#   \"volatility\" - each item's own Glicko-2 volatility
# decay_pacing = \"fixed\"

# Entries shown by `rankwise history`
# history_limit = 50
";

fn home_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| bail("HOME environment variable not set"));
    PathBuf::from(home)
}

/// Returns the default config path: ~/.config/rankwise/config.toml
pub fn config_path() -> PathBuf {
    home_dir().join(".config").join("rankwise").join("config.toml")
}

/// Returns the default library path: ~/.local/share/rankwise/library.json
pub fn default_library_path() -> PathBuf {
    home_dir().join(".local").join("share").join("rankwise").join("library.json")
}

/// Expands a leading `~/` so paths in the config file can be written the usual way.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => home_dir().join(rest),
        None => PathBuf::from(path),
    }
}

/// Load config from a file path. Returns default (all None) if file doesn't exist.
pub fn load_config(path: &Path) -> RankwiseConfig {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_config(&content)
            .unwrap_or_else(|e| bail(format!("Failed to parse config at {}: {e}", path.display()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => RankwiseConfig::default(),
        Err(e) => bail(format!("Failed to read config at {}: {e}", path.display())),
    }
}

fn parse_config(content: &str) -> Result<RankwiseConfig, toml::de::Error> {
    toml::from_str(content)
}

/// Create the default config file. Errors if it already exists.
pub fn create_default_config(path: &Path) {
    if path.exists() {
        bail(format!("Config file already exists at {}", path.display()));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .unwrap_or_else(|e| bail(format!("Failed to create directory {}: {e}", parent.display())));
    }

    std::fs::write(path, DEFAULT_CONFIG_TEMPLATE)
        .unwrap_or_else(|e| bail(format!("Failed to write config to {}: {e}", path.display())));
}
