//! Shared types for the tilescript services.
//!
//! Bounding boxes, CRS codes and transforms, XYZ tile math, and the
//! common error taxonomy.

pub mod bbox;
pub mod crs;
pub mod error;
pub mod tile;

pub use bbox::{BoundingBox, PolygonGeometry};
pub use crs::CrsCode;
pub use error::{ScriptTileError, ScriptTileResult};
pub use tile::{TileCoord, TILE_SIZE};
