//! Error types for the raster engine crate.
//!
//! This module provides structured error types for configuration validation,
//! image decoding, and geometry resolution.

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Errors that can occur while turning an image into a toolpath program.
#[derive(Error, Debug)]
pub enum RasterError {
    /// A configuration field is outside its documented range.
    #[error("Invalid config '{field}': {reason}")]
    InvalidConfig { field: String, reason: String },

    /// The source image could not be decoded.
    #[error("Unreadable image '{path}': {reason}")]
    ImageUnreadable { path: String, reason: String },

    /// The constraint set yields fewer than two pixels on an axis even after
    /// the memory transform.
    #[error("Geometry infeasible: requested raster collapses below 2x2 pixels")]
    GeometryInfeasible,

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<ParameterError> for RasterError {
    fn from(err: ParameterError) -> Self {
        Self::InvalidConfig {
            field: err.field().to_string(),
            reason: err.to_string(),
        }
    }
}

/// Errors related to engraving parameter validation.
#[derive(Error, Debug)]
pub enum ParameterError {
    /// A parameter value is out of the valid range.
    #[error("Parameter '{name}' out of range: {value} (valid: {min}..{max})")]
    OutOfRange {
        name: String,
        value: f64,
        min: f64,
        max: f64,
    },

    /// A parameter value is invalid.
    #[error("Invalid value for '{name}': {reason}")]
    InvalidValue { name: String, reason: String },

    /// Parameters are mutually incompatible.
    #[error("Incompatible parameters: {0}")]
    Incompatible(String),
}

impl ParameterError {
    /// Name of the offending field, for user-visible error rendering.
    pub fn field(&self) -> &str {
        match self {
            Self::OutOfRange { name, .. } => name,
            Self::InvalidValue { name, .. } => name,
            Self::Incompatible(_) => "",
        }
    }
}

/// Non-fatal notice that the memory cap transform fired.
///
/// Carried on the geometry record alongside success, never raised as an
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryCapped {
    /// Pixel count before the axis-shrink transform.
    pub original: u64,
    /// Pixel count after the transform.
    pub reduced: u64,
}

/// Result type alias for raster engine operations.
pub type RasterResult<T> = Result<T, RasterError>;

/// Result type alias for parameter validation.
pub type ParameterResult<T> = Result<T, ParameterError>;
