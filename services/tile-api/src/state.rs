//! Application state and shared resources.

use std::path::PathBuf;
use std::sync::Arc;

use crate::catalog::ExampleCatalog;
use crate::metrics::MetricsCollector;
use raster_source::registry::FileOpener;
use raster_source::SourceOpener;

/// Largest accepted render dimension per axis.
pub const MAX_RENDER_DIMENSION: u32 = 2048;

/// Shared application state.
///
/// Everything here is immutable after startup; per-request state (the
/// source registry cache) lives in the request pipeline instead.
pub struct AppState {
    pub opener: Arc<dyn SourceOpener>,
    pub catalog: ExampleCatalog,
    pub metrics: Arc<MetricsCollector>,
}

impl AppState {
    pub fn new(data_root: PathBuf, catalog: ExampleCatalog) -> Self {
        Self {
            opener: Arc::new(FileOpener::new(data_root)),
            catalog,
            metrics: Arc::new(MetricsCollector::new()),
        }
    }

    /// Test constructor with an injected opener.
    pub fn with_opener(opener: Arc<dyn SourceOpener>, catalog: ExampleCatalog) -> Self {
        Self {
            opener,
            catalog,
            metrics: Arc::new(MetricsCollector::new()),
        }
    }
}
