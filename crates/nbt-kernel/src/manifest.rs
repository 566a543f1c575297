//! Tool manifests: TOML files of `[[tools]]` and `[[data]]` tables,
//! imported as one batch per file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use nbt_types::{Data, DataSpec, NbResult, Tool, ToolSpec};

use crate::registry::UpdateHook;
use crate::Kernel;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
    #[serde(default)]
    pub data: Vec<DataSpec>,
}

impl Manifest {
    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse manifest")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse manifest {}", path.display()))
    }
}

impl Kernel {
    /// Register a manifest's tools and data as one batch: a single change
    /// notification once both registries hold the manifest. Stops at the
    /// first invalid entry; entries before it stay registered.
    pub fn import_manifest(&self, manifest: Manifest) -> NbResult<usize> {
        let mut count = 0;
        let outcome = self.register_manifest(manifest, &mut count);
        if count > 0 {
            self.coordinator().registry_changed();
        }
        outcome.map(|()| count)
    }

    /// Import every manifest listed in the config, then mark the session
    /// imported and push once. Manifests that fail are logged and skipped.
    pub fn import_defaults(&self) -> usize {
        let mut total = 0;
        for path in &self.config().load.manifests {
            let manifest = match Manifest::load(path) {
                Ok(manifest) => manifest,
                Err(e) => {
                    warn!("Skipping manifest {}: {:#}", path.display(), e);
                    continue;
                }
            };
            let mut count = 0;
            match self.register_manifest(manifest, &mut count) {
                Ok(()) => info!("Imported {} entries from {}", count, path.display()),
                Err(e) => warn!(
                    "Manifest {} stopped after {} entries: {}",
                    path.display(),
                    count,
                    e
                ),
            }
            total += count;
        }
        self.coordinator().set_imported(true);
        self.coordinator().send_update();
        total
    }

    fn register_manifest(&self, manifest: Manifest, count: &mut usize) -> NbResult<()> {
        for spec in manifest.tools {
            self.tools().register_with(Tool::from_spec(spec), true)?;
            *count += 1;
        }
        for spec in manifest.data {
            self.data().register_with(Data::from_spec(spec), true)?;
            *count += 1;
        }
        Ok(())
    }
}
