//! # RasterKit Raster Engine
//!
//! Deterministic pipeline that turns a raster image plus a configuration
//! bundle into laser G-code:
//!
//! - **Geometry**: pixel counts and physical steps under dimension/DPI/ratio
//!   constraints, with a hard memory cap and time prediction
//! - **Image preparation**: decode, resize, tone-map, quantize into a power
//!   matrix with exact physical dimensions
//! - **Size oracle**: predict output size from the matrix without emitting
//! - **Toolpath emission**: serpentine raster body with overscan, latency
//!   compensation, hysteresis-merged segments, and framing/pointing preludes

pub mod config;
pub mod emitter;
pub mod error;
pub mod geometry;
pub mod image;
pub mod oracle;
mod syntax;

pub use config::{
    EngravingConfig, FiringMode, FramingConfig, Origin, PointingConfig, PowerMode, RasterMode,
};
pub use emitter::{emit, emit_with_cancel};
pub use error::{MemoryCapped, ParameterError, RasterError, RasterResult};
pub use geometry::{calculate_offsets, resolve, Geometry, MEM_CAP, MEM_SOFT_WARN};
pub use image::{prepare_matrix, ImagePreparer, PowerMatrix, BLACK_FLOOR};
pub use oracle::{estimate_size, SizeEstimate};
