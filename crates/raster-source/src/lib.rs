//! Raster sources for tilescript: the source handle trait, the on-disk
//! grid capability, the per-request registry, and the bounds resolver.
//!
//! Raster *file format parsing* is out of scope; the [`RasterSource`]
//! trait is the seam where a real decoder (GDAL-style) would plug in, and
//! the built-in grid container stands in as the capability provider.

pub mod bounds;
pub mod grid;
pub mod registry;
pub mod source;

pub use bounds::{compute_bounds, BoundsResult};
pub use grid::GridSource;
pub use registry::{FileOpener, SourceOpener, SourceRegistry};
pub use source::{GeoTransform, RasterSource};
