//! Configuration loading and database path resolution
//!
//! Resolution priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// TOML configuration file contents (`~/.config/devmap/devmap.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Path to the sqlite database holding the mapping cache and audit log
    pub database_path: Option<String>,

    /// Path to the vendor feed file consumed by the batch binary
    pub feed_path: Option<String>,

    /// Pipeline tuning overrides, merged over compiled defaults
    #[serde(default)]
    pub pipeline: toml::value::Table,
}

/// Resolve the database path from CLI arg, env, TOML, then default
pub fn resolve_database_path(cli_arg: Option<&str>) -> Result<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Ok(PathBuf::from(path));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var("DEVMAP_DATABASE") {
        return Ok(PathBuf::from(path));
    }

    // Priority 3: TOML config file
    if let Ok(config) = load_toml_config() {
        if let Some(path) = config.database_path {
            return Ok(PathBuf::from(path));
        }
    }

    // Priority 4: OS-dependent compiled default
    Ok(default_data_dir().join("devmap.db"))
}

/// Load the TOML config from the platform config directory
///
/// `DEVMAP_CONFIG` overrides the file location when set.
pub fn load_toml_config() -> Result<TomlConfig> {
    let path = config_file_path()?;
    read_toml_config(&path)
}

/// Parse a TOML config file at an explicit path
pub fn read_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read config failed ({}): {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse config failed ({}): {}", path.display(), e)))
}

/// Write a TOML config atomically (write temp file then rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize config failed: {}", e)))?;
    let tmp = path.with_extension("toml.tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn config_file_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("DEVMAP_CONFIG") {
        return Ok(PathBuf::from(path));
    }
    let user_config = dirs::config_dir()
        .map(|d| d.join("devmap").join("devmap.toml"))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;
    if user_config.exists() {
        return Ok(user_config);
    }
    let system_config = PathBuf::from("/etc/devmap/devmap.toml");
    if system_config.exists() {
        return Ok(system_config);
    }
    Err(Error::Config("No config file found".to_string()))
}

/// OS-dependent default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("devmap"))
        .unwrap_or_else(|| PathBuf::from("./devmap-data"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_toml_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "database_path = \"/tmp/devmap.db\"").unwrap();
        writeln!(file, "feed_path = \"/tmp/feed.json\"").unwrap();
        file.flush().unwrap();

        let config = read_toml_config(file.path()).unwrap();
        assert_eq!(config.database_path.as_deref(), Some("/tmp/devmap.db"));
        assert_eq!(config.feed_path.as_deref(), Some("/tmp/feed.json"));
    }

    #[test]
    fn test_read_toml_config_missing_file() {
        let result = read_toml_config(Path::new("/nonexistent/devmap.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_write_then_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devmap.toml");
        let config = TomlConfig {
            database_path: Some("/var/lib/devmap/devmap.db".to_string()),
            feed_path: None,
            pipeline: toml::value::Table::new(),
        };
        write_toml_config(&config, &path).unwrap();
        let loaded = read_toml_config(&path).unwrap();
        assert_eq!(loaded.database_path, config.database_path);
    }

    #[test]
    fn test_cli_arg_takes_priority() {
        let path = resolve_database_path(Some("/custom/devmap.db")).unwrap();
        assert_eq!(path, PathBuf::from("/custom/devmap.db"));
    }
}
