//! The example script catalog: startup configuration served read-only at
//! `/api/examples` so UIs can offer ready-made scripts.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// One catalog entry: a named, ready-to-run script request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExampleEntry {
    pub name: String,
    pub title: String,
    /// Ordered input declarations, matching the request body shape.
    pub inputs: Vec<ExampleInput>,
    pub script: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExampleInput {
    pub name: String,
    pub source: String,
}

/// The immutable catalog, loaded once at startup. A YAML sequence so the
/// file's ordering carries through to the API response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExampleCatalog {
    entries: Vec<ExampleEntry>,
}

impl ExampleCatalog {
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("opening example catalog {}", path.display()))?;
        let catalog: ExampleCatalog = serde_yaml::from_reader(file)
            .with_context(|| format!("parsing example catalog {}", path.display()))?;
        info!(
            count = catalog.entries.len(),
            path = %path.display(),
            "loaded example catalog"
        );
        Ok(catalog)
    }

    pub fn entries(&self) -> &[ExampleEntry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&ExampleEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }
}
