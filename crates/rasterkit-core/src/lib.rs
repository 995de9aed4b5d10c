//! # RasterKit Core
//!
//! Shared types and utilities for the RasterKit workspace.
//! Provides the geometric primitives and display formatting used by the
//! raster engine, the trajectory parser, and the CLI front end.

pub mod types;
pub mod units;

pub use types::{BoxedIterator, Rect};
pub use units::{format_minutes, format_size};
