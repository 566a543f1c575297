use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use nbt_types::config::NbConfig;

/// Returns the nbtools home directory (~/.nbtools/)
pub fn nbt_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".nbtools")
}

/// Returns the path to the config file (~/.nbtools/config.toml)
pub fn config_path() -> PathBuf {
    nbt_home().join("config.toml")
}

/// Load config from the default location, creating it if it doesn't exist.
pub fn load_config() -> Result<NbConfig> {
    load_config_from(&config_path())
}

/// Load config from `path`, writing the default config there if missing.
pub fn load_config_from(path: &Path) -> Result<NbConfig> {
    if !path.exists() {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let default = NbConfig::default();
        save_config_to(path, &default)?;
        return Ok(default);
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let config: NbConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config at {}", path.display()))?;
    Ok(config)
}

/// Save config to the default location.
pub fn save_config(config: &NbConfig) -> Result<()> {
    save_config_to(&config_path(), config)
}

/// Save config to `path`, overwriting the existing file.
pub fn save_config_to(path: &Path, config: &NbConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config).context("Failed to serialize config")?;
    std::fs::write(path, toml_str)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nbt_home_is_dot_nbtools() {
        assert!(nbt_home().to_string_lossy().contains(".nbtools"));
    }

    #[test]
    fn missing_config_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = load_config_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.sync.debounce_ms, 3000);
        assert_eq!(config.sync.comm_name, "nbtools_comm");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[load]\nmanifests = [\"tools.toml\"]\n").unwrap();
        let config = load_config_from(&path).unwrap();
        assert_eq!(config.load.manifests, vec![PathBuf::from("tools.toml")]);
        assert_eq!(config.log_level, "info");
        assert!(!config.usage.enabled);
    }

    #[test]
    fn partial_sync_table_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sync]\ndebounce_ms = 500\n").unwrap();
        let config = load_config_from(&path).unwrap();
        assert_eq!(config.sync.debounce_ms, 500);
        assert_eq!(config.sync.comm_name, "nbtools_comm");
    }

    #[test]
    fn default_config_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = NbConfig::default();
        config.sync.debounce_ms = 500;
        save_config_to(&path, &config).unwrap();
        assert_eq!(load_config_from(&path).unwrap(), config);
    }
}
