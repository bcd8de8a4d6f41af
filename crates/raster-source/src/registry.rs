//! The per-request source registry.
//!
//! Resolves logical input identifiers to opened source handles through a
//! scheme-prefixed opener (`file:relative/path.grid`), caching by
//! identifier so a request referencing the same dataset twice opens it
//! once. A registry lives for exactly one request; dropping it tears the
//! handles down. Nothing is shared across requests.

use crate::grid::GridSource;
use crate::source::RasterSource;
use std::collections::HashMap;
use std::path::{Component, PathBuf};
use std::sync::Arc;
use tile_common::{ScriptTileError, ScriptTileResult};
use tracing::debug;

/// Opens a source from its identifier. Injectable so tests can serve
/// in-memory grids without a filesystem.
pub trait SourceOpener: Send + Sync {
    fn open(&self, identifier: &str) -> ScriptTileResult<Arc<dyn RasterSource>>;
}

/// Default opener: `file:` identifiers resolved under a data root.
pub struct FileOpener {
    root: PathBuf,
}

impl FileOpener {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SourceOpener for FileOpener {
    fn open(&self, identifier: &str) -> ScriptTileResult<Arc<dyn RasterSource>> {
        match identifier.split_once(':') {
            Some(("file", relative)) => {
                let relative = PathBuf::from(relative);
                // Identifiers come from request bodies; keep them inside
                // the data root
                if relative
                    .components()
                    .any(|c| !matches!(c, Component::Normal(_)))
                {
                    return Err(ScriptTileError::SourceNotFound(identifier.to_string()));
                }
                let path = self.root.join(relative);
                let source = GridSource::from_file(identifier, &path)?;
                Ok(Arc::new(source))
            }
            Some((scheme, _)) => Err(ScriptTileError::UnsupportedFormat(format!(
                "unknown scheme '{}' in '{}'",
                scheme, identifier
            ))),
            None => Err(ScriptTileError::UnsupportedFormat(format!(
                "identifier '{}' has no scheme prefix",
                identifier
            ))),
        }
    }
}

/// Request-scoped cache of opened source handles.
pub struct SourceRegistry {
    opener: Arc<dyn SourceOpener>,
    cache: HashMap<String, Arc<dyn RasterSource>>,
}

impl SourceRegistry {
    pub fn new(opener: Arc<dyn SourceOpener>) -> Self {
        Self {
            opener,
            cache: HashMap::new(),
        }
    }

    /// Resolve an identifier to an opened handle. Idempotent within this
    /// registry: the same identifier is opened at most once.
    pub fn resolve(&mut self, identifier: &str) -> ScriptTileResult<Arc<dyn RasterSource>> {
        if let Some(handle) = self.cache.get(identifier) {
            return Ok(Arc::clone(handle));
        }
        debug!(identifier, "opening raster source");
        let handle = self.opener.open(identifier)?;
        self.cache
            .insert(identifier.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Resolve every declared input, preserving declaration order.
    pub fn resolve_all(
        &mut self,
        inputs: &[(String, String)],
    ) -> ScriptTileResult<Vec<(String, Arc<dyn RasterSource>)>> {
        inputs
            .iter()
            .map(|(name, identifier)| Ok((name.clone(), self.resolve(identifier)?)))
            .collect()
    }
}
