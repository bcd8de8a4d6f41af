//! Script-tile API service library.
//!
//! This module exposes the internal modules for testing purposes.

pub mod catalog;
pub mod handlers;
pub mod metrics;
pub mod rendering;
pub mod request;
pub mod state;
