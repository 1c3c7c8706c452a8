use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct CliConfig {
    pub bootrom_path: Option<PathBuf>,
    pub frames: Option<u64>,
}

pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("pocketgb").join("cli.toml");
        }
    }

    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("pocketgb").join("cli.toml");
    }

    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join("pocketgb")
            .join("cli.toml");
    }

    PathBuf::from("cli.toml")
}

/// Read the config file, falling back to defaults when it is missing or
/// malformed.
pub fn load_from_file(path: &Path) -> CliConfig {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => return CliConfig::default(),
    };

    match toml::from_str::<CliConfig>(&text) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(
                "Failed to parse config {}: {e}; using defaults",
                path.display()
            );
            CliConfig::default()
        }
    }
}
