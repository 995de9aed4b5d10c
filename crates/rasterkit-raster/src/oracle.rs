//! Program size prediction.
//!
//! Predicts the emitted line and byte count from the power matrix alone, so
//! callers can warn about huge outputs before running the emitter. The
//! prediction mirrors the emitter's merging rule: one motion per power-change
//! event plus a constant per scan line.

use serde::{Deserialize, Serialize};

use rasterkit_core::format_size;

use crate::config::{EngravingConfig, RasterMode};
use crate::geometry::Geometry;
use crate::image::PowerMatrix;

/// Per-line overhead and framing headroom, bytes.
const BYTES_PER_LINE: u64 = 16;
const FIXED_OVERHEAD: u64 = 1500;

/// Predicted program size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeEstimate {
    /// Predicted raster line count.
    pub lines: u64,
    /// Predicted byte count.
    pub bytes: u64,
    /// Human-readable rendering ("X.Y KB" / "X.YZ MB").
    pub rendered: String,
}

/// Estimate the emitted program size for a prepared matrix.
pub fn estimate_size(
    matrix: &PowerMatrix,
    config: &EngravingConfig,
    geometry: &Geometry,
) -> SizeEstimate {
    let mut changes: u64 = 0;
    let mut starts: u64 = 0;

    match config.raster_mode {
        RasterMode::Horizontal => {
            for y in 0..matrix.height() {
                let row = matrix.row(y);
                if row.first().copied().unwrap_or(0.0) > 0.0 {
                    starts += 1;
                }
                changes += row.windows(2).filter(|w| w[0] != w[1]).count() as u64;
            }
        }
        RasterMode::Vertical => {
            for x in 0..matrix.width() {
                if matrix.value(x, 0) > 0.0 {
                    starts += 1;
                }
                for y in 1..matrix.height() {
                    if matrix.value(x, y) != matrix.value(x, y - 1) {
                        changes += 1;
                    }
                }
            }
        }
    }

    let lines = changes + starts + geometry.scan_lines() as u64;
    let bytes = BYTES_PER_LINE * lines + FIXED_OVERHEAD;
    SizeEstimate {
        lines,
        bytes,
        rendered: format_size(bytes),
    }
}
