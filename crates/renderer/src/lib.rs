//! Rendering for tilescript: the per-pixel script evaluation engine and
//! the PNG encoder.

pub mod engine;
pub mod png;

pub use engine::{render, RenderOutput};
