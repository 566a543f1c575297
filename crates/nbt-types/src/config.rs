use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NbConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub load: LoadConfig,
    #[serde(default)]
    pub usage: UsageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Cool-off window collapsing bursts of registrations into one push.
    pub debounce_ms: u64,
    /// Name of the kernel <-> client comm.
    pub comm_name: String,
}

/// Tool manifests imported when a session starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadConfig {
    #[serde(default)]
    pub manifests: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub endpoint: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 3000,
            comm_name: "nbtools_comm".to_string(),
        }
    }
}

impl Default for NbConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            sync: SyncConfig::default(),
            load: LoadConfig::default(),
            usage: UsageConfig::default(),
        }
    }
}
