use std::env::current_exe;
use std::fs;
use std::path::{Path, PathBuf};
use directories_next::ProjectDirs;
use log::{info, warn};
use serde_json;

use crate::config::types::LinkConfig;
use crate::error::ConfigError;

// creates a path to <exe name>.json in the same directory as the executable
// this could be useful for usb sticks
fn get_portable_config_path() -> Option<PathBuf> {
    match current_exe() {
        Ok(mut path) => {
            if !path.set_extension("json") {
                warn!("current exe has no filename: {}", path.to_string_lossy());
                return None
            }

            Some(path)
        },
        Err(err) => {
            warn!("failed to get current exe path: {:?}", err);
            None
        },
    }
}

// creates a path to mochila-alarma.json in an os dependent standard directory, such as %AppData% on
// windows.
fn get_local_config_path() -> Option<PathBuf> {
    ProjectDirs::from("cl", "mochila", "mochila-alarma").map(|dirs| {
        dirs.config_dir().join("mochila-alarma.json")
    })
}

pub fn get_config_path() -> Result<PathBuf, ConfigError> {
    if let Some(path) = get_portable_config_path() {
        if path.is_file() {
            return Ok(path);
        }
    }

    match get_local_config_path() {
        None => Err(ConfigError::NoConfigPath),
        Some(path) => Ok(path),
    }
}

pub fn read_config(path: &Path) -> Result<LinkConfig, ConfigError> {
    let content = fs::read_to_string(path)?;

    if content.trim().is_empty() {
        return Ok(LinkConfig::default());
    }

    let config: LinkConfig = serde_json::from_str(&content)?;
    Ok(config)
}

/// Loads the config from `path`, or from the standard locations when no path is given. A missing
/// file is not an error.
pub fn load_config(path: Option<&Path>) -> Result<LinkConfig, ConfigError> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => get_config_path()?,
    };
    info!("Using config file {}", path.to_string_lossy());

    match read_config(&path) {
        Ok(config) => Ok(config),
        Err(err) if err.is_file_not_found_error() => {
            info!("Config file not found, using defaults");
            Ok(LinkConfig::default())
        },
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("mochila-alarma-{}-{}.json", name, std::process::id()))
    }

    #[test]
    fn missing_file_gives_defaults() {
        let path = temp_path("missing");
        let _ = fs::remove_file(&path);

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config, LinkConfig::default());
    }

    #[test]
    fn reads_existing_file() {
        let path = temp_path("existing");
        fs::write(&path, r#"{"deviceName": "Otra-Mochila", "scanTimeoutMs": 500}"#).unwrap();

        let config = load_config(Some(&path)).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(config.device_name, "Otra-Mochila");
        assert_eq!(config.scan_timeout_ms, 500);
    }

    #[test]
    fn invalid_json_is_reported() {
        let path = temp_path("invalid");
        fs::write(&path, "{ nope").unwrap();

        let result = load_config(Some(&path));
        fs::remove_file(&path).unwrap();

        assert!(matches!(result, Err(ConfigError::JsonError { .. })));
    }
}
