//! Geometry resolution for raster jobs.
//!
//! Decides pixel counts and physical steps under the dimension/DPI/ratio
//! constraints, applies the memory cap transform, predicts engraving time,
//! and places machine zero according to the configured origin.

use serde::{Deserialize, Serialize};
use tracing::debug;

use rasterkit_core::Rect;

use crate::config::{EngravingConfig, Origin, RasterMode};
use crate::error::{MemoryCapped, ParameterError, RasterError, RasterResult};

/// Hard cap on power-matrix pixel count.
pub const MEM_CAP: u64 = 10_000_000;

/// Soft threshold above which `memory_warning` is set.
pub const MEM_SOFT_WARN: u64 = 2_000_000;

/// Derived scalars for one raster job.
///
/// Produced by [`resolve`] and consumed by the preparer, the emitter, and the
/// trajectory cross-check. Immutable once computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    /// Which axis is scanned.
    pub raster_mode: RasterMode,
    /// Pixel count along X.
    pub w_px: u32,
    /// Pixel count along Y.
    pub h_px: u32,
    /// Achieved image width, mm.
    pub real_w: f64,
    /// Achieved image height, mm.
    pub real_h: f64,
    /// Pitch along the scan axis, mm.
    pub scan_step: f64,
    /// Pitch along the cross axis, mm.
    pub line_step: f64,
    /// Pitch along X (equals `scan_step` in horizontal mode).
    pub x_step: f64,
    /// Pitch along Y (equals `scan_step` in vertical mode).
    pub y_step: f64,
    /// Overscan distance at both ends of every scan line, mm.
    pub overscan_dist: f64,
    /// Machine-coordinate offset added to every emitted X.
    pub offset_x: f64,
    /// Machine-coordinate offset added to every emitted Y.
    pub offset_y: f64,
    /// Image bounds in machine coordinates.
    pub rect_burn: Rect,
    /// Image bounds including overscan.
    pub rect_full: Rect,
    /// Predicted engraving time, minutes.
    pub est_min: f64,
    /// Rendered size prediction; populated once the size oracle has run.
    pub size_hint: Option<String>,
    /// Set when the pre-cap pixel count exceeded the soft threshold.
    pub memory_warning: bool,
    /// Present when the memory cap transform fired.
    pub capped: Option<MemoryCapped>,
}

impl Geometry {
    /// Number of scan lines.
    pub fn scan_lines(&self) -> u32 {
        match self.raster_mode {
            RasterMode::Horizontal => self.h_px,
            RasterMode::Vertical => self.w_px,
        }
    }

    /// Pixels per scan line.
    pub fn pixels_per_line(&self) -> u32 {
        match self.raster_mode {
            RasterMode::Horizontal => self.w_px,
            RasterMode::Vertical => self.h_px,
        }
    }

    /// Engraved span of one scan line (without overscan), mm.
    pub fn scan_span(&self) -> f64 {
        match self.raster_mode {
            RasterMode::Horizontal => self.real_w,
            RasterMode::Vertical => self.real_h,
        }
    }
}

/// Machine-zero offsets for the given origin placement.
///
/// The returned pair is added to every emitted coordinate.
pub fn calculate_offsets(origin: Origin, real_w: f64, real_h: f64) -> (f64, f64) {
    match origin {
        Origin::LowerLeft => (0.0, 0.0),
        Origin::UpperLeft => (0.0, -real_h),
        Origin::LowerRight => (-real_w, 0.0),
        Origin::UpperRight => (-real_w, -real_h),
        Origin::Center => (-real_w / 2.0, -real_h / 2.0),
        Origin::Custom { x, y } => (-x, -y),
    }
}

/// Resolve pixel counts and physical extents for one job.
///
/// * `config` - The job configuration (validated here).
/// * `aspect` - Source image aspect ratio, height over width.
pub fn resolve(config: &EngravingConfig, aspect: f64) -> RasterResult<Geometry> {
    config.validate()?;
    if !(aspect.is_finite() && aspect > 0.0) {
        return Err(ParameterError::InvalidValue {
            name: "aspect".to_string(),
            reason: format!("image aspect ratio must be positive, got {aspect}"),
        }
        .into());
    }

    let step_t = config.theoretical_scan_step();
    let line_step = config.line_step;

    // Scan axis first: pixel count from the theoretical pitch, then either
    // stretch the pitch onto the target length (force_dim) or keep the pitch
    // and accept a slightly shorter extent.
    let mut scan_px = pixel_count(config.ui_dimension, step_t);
    let (mut scan_step, mut real_scan) = scan_extent(config, scan_px, step_t);

    // Cross axis follows from the achieved scan extent and the image ratio.
    let cross_ratio = match config.raster_mode {
        RasterMode::Horizontal => aspect,
        RasterMode::Vertical => 1.0 / aspect,
    };
    let mut cross_px = pixel_count(real_scan * cross_ratio, line_step);
    let mut real_cross = (cross_px - 1) as f64 * line_step;

    let requested = scan_px as u64 * cross_px as u64;
    let memory_warning = requested > MEM_SOFT_WARN;

    let capped = if requested > MEM_CAP {
        let s = (MEM_CAP as f64 / requested as f64).sqrt();
        scan_px = (((s * scan_px as f64).floor()) as u32).max(2);
        cross_px = (((s * cross_px as f64).floor()) as u32).max(2);
        let reduced = scan_px as u64 * cross_px as u64;
        if reduced > MEM_CAP {
            return Err(RasterError::GeometryInfeasible);
        }
        // Surviving pitches: the scan pitch is unchanged unless force_dim,
        // where the pixel count changed and the target length is preserved.
        let (step, real) = scan_extent(config, scan_px, step_t);
        scan_step = step;
        real_scan = real;
        real_cross = (cross_px - 1) as f64 * line_step;
        debug!(
            requested,
            reduced, "memory cap transform fired, axes shrunk"
        );
        Some(MemoryCapped {
            original: requested,
            reduced,
        })
    } else {
        None
    };

    let (w_px, h_px, real_w, real_h, x_step, y_step) = match config.raster_mode {
        RasterMode::Horizontal => (scan_px, cross_px, real_scan, real_cross, scan_step, line_step),
        RasterMode::Vertical => (cross_px, scan_px, real_cross, real_scan, line_step, scan_step),
    };

    let lines = match config.raster_mode {
        RasterMode::Horizontal => h_px,
        RasterMode::Vertical => w_px,
    } as f64;
    let est_min = (lines * (real_scan + 2.0 * config.premove) + (lines - 1.0) * line_step)
        / config.feedrate;

    let (offset_x, offset_y) = calculate_offsets(config.origin, real_w, real_h);
    let rect_burn = Rect::new(offset_x, offset_y, offset_x + real_w, offset_y + real_h);
    let rect_full = match config.raster_mode {
        RasterMode::Horizontal => rect_burn.expanded(config.premove, 0.0),
        RasterMode::Vertical => rect_burn.expanded(0.0, config.premove),
    };

    Ok(Geometry {
        raster_mode: config.raster_mode,
        w_px,
        h_px,
        real_w,
        real_h,
        scan_step,
        line_step,
        x_step,
        y_step,
        overscan_dist: config.premove,
        offset_x,
        offset_y,
        rect_burn,
        rect_full,
        est_min,
        size_hint: None,
        memory_warning,
        capped,
    })
}

fn pixel_count(length: f64, step: f64) -> u32 {
    ((length / step).round() as i64 + 1).max(2) as u32
}

fn scan_extent(config: &EngravingConfig, scan_px: u32, step_t: f64) -> (f64, f64) {
    if config.force_dim {
        let step = config.ui_dimension / (scan_px - 1) as f64;
        (step, config.ui_dimension)
    } else {
        (step_t, (scan_px - 1) as f64 * step_t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PowerMode;

    fn base_config() -> EngravingConfig {
        EngravingConfig {
            dpi: 254,
            line_step: 0.1,
            ui_dimension: 100.0,
            feedrate: 3000.0,
            premove: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_horizontal_pixel_counts() {
        let config = EngravingConfig {
            ui_dimension: 3.2,
            ..base_config()
        };
        let geom = resolve(&config, 1.0).unwrap();
        assert_eq!(geom.w_px, 33);
        assert_eq!(geom.h_px, 33);
        assert!((geom.scan_step - 0.1).abs() < 1e-9);
        assert!((geom.real_w - 3.2).abs() < 1e-9);
    }

    #[test]
    fn test_force_dim_is_exact() {
        let config = EngravingConfig {
            ui_dimension: 10.0,
            dpi: 200,
            force_dim: true,
            ..base_config()
        };
        let geom = resolve(&config, 1.0).unwrap();
        assert_eq!(geom.w_px, 80);
        let achieved = (geom.w_px - 1) as f64 * geom.scan_step;
        assert!((achieved - 10.0).abs() < 1e-6);

        let config = EngravingConfig {
            ui_dimension: 10.0,
            dpi: 254,
            force_dim: true,
            ..base_config()
        };
        let geom = resolve(&config, 1.0).unwrap();
        assert_eq!(geom.w_px, 101);
        let achieved = (geom.w_px - 1) as f64 * geom.scan_step;
        assert!((achieved - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_non_forced_keeps_theoretical_pitch() {
        let config = EngravingConfig {
            ui_dimension: 10.04,
            ..base_config()
        };
        let geom = resolve(&config, 1.0).unwrap();
        // round(10.04 / 0.1) + 1 = 101 pixels at the unstretched pitch.
        assert_eq!(geom.w_px, 101);
        assert!((geom.scan_step - 0.1).abs() < 1e-12);
        assert!((geom.real_w - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_vertical_swaps_axes() {
        let config = EngravingConfig {
            raster_mode: RasterMode::Vertical,
            ui_dimension: 3.2,
            ..base_config()
        };
        // Aspect 2.0: image twice as tall as wide. Scan axis is Y.
        let geom = resolve(&config, 2.0).unwrap();
        assert_eq!(geom.h_px, 33);
        assert!((geom.real_h - 3.2).abs() < 1e-9);
        assert!((geom.real_w - 1.6).abs() < 1e-9);
        assert_eq!(geom.y_step, geom.scan_step);
        assert_eq!(geom.x_step, geom.line_step);
        assert_eq!(geom.scan_lines(), geom.w_px);
    }

    #[test]
    fn test_memory_cap_shrinks_both_axes() {
        // 6325 x 6325 = 40.0 Mpx requested, four times the cap.
        let config = EngravingConfig {
            dpi: 2540,
            line_step: 0.01,
            ui_dimension: 63.24,
            ..base_config()
        };
        let geom = resolve(&config, 1.0).unwrap();
        let capped = geom.capped.expect("cap should fire");
        assert!(capped.original > 39_000_000);
        assert!(capped.reduced <= MEM_CAP);
        assert!(geom.memory_warning);
        // Axis ratio preserved within one pixel.
        assert!((geom.w_px as i64 - geom.h_px as i64).abs() <= 1);
        assert_eq!(geom.w_px as u64 * geom.h_px as u64, capped.reduced);
    }

    #[test]
    fn test_memory_cap_infeasible_strip() {
        // A strip two rows tall cannot shrink below two rows; the excess
        // cannot be absorbed and the constraint set is infeasible.
        let config = EngravingConfig {
            dpi: 25400,
            line_step: 10.0,
            ui_dimension: 6000.0,
            ..base_config()
        };
        let result = resolve(&config, 1e-5);
        assert!(matches!(result, Err(RasterError::GeometryInfeasible)));
    }

    #[test]
    fn test_soft_warning_without_cap() {
        let config = EngravingConfig {
            dpi: 508,
            line_step: 0.05,
            ui_dimension: 100.0,
            ..base_config()
        };
        // ~2001 x 2001 = 4 Mpx: above the soft threshold, below the cap.
        let geom = resolve(&config, 1.0).unwrap();
        assert!(geom.memory_warning);
        assert!(geom.capped.is_none());
    }

    #[test]
    fn test_time_prediction() {
        let config = EngravingConfig {
            ui_dimension: 10.0,
            premove: 2.0,
            feedrate: 1000.0,
            ..base_config()
        };
        let geom = resolve(&config, 1.0).unwrap();
        let n = geom.scan_lines() as f64;
        let expected = (n * (geom.real_w + 4.0) + (n - 1.0) * 0.1) / 1000.0;
        assert!((geom.est_min - expected).abs() < 1e-9);
    }

    #[test]
    fn test_offsets_table() {
        assert_eq!(calculate_offsets(Origin::LowerLeft, 40.0, 20.0), (0.0, 0.0));
        assert_eq!(
            calculate_offsets(Origin::UpperLeft, 40.0, 20.0),
            (0.0, -20.0)
        );
        assert_eq!(
            calculate_offsets(Origin::LowerRight, 40.0, 20.0),
            (-40.0, 0.0)
        );
        assert_eq!(
            calculate_offsets(Origin::UpperRight, 40.0, 20.0),
            (-40.0, -20.0)
        );
        assert_eq!(
            calculate_offsets(Origin::Center, 40.0, 20.0),
            (-20.0, -10.0)
        );
        assert_eq!(
            calculate_offsets(Origin::Custom { x: 3.0, y: 4.0 }, 40.0, 20.0),
            (-3.0, -4.0)
        );
    }

    #[test]
    fn test_rect_full_includes_overscan() {
        let config = EngravingConfig {
            ui_dimension: 10.0,
            premove: 2.0,
            ..base_config()
        };
        let geom = resolve(&config, 1.0).unwrap();
        assert!((geom.rect_full.min_x - (geom.rect_burn.min_x - 2.0)).abs() < 1e-9);
        assert!((geom.rect_full.max_x - (geom.rect_burn.max_x + 2.0)).abs() < 1e-9);
        assert_eq!(geom.rect_full.min_y, geom.rect_burn.min_y);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngravingConfig {
            feedrate: 0.0,
            power_mode: PowerMode::Gated,
            ..base_config()
        };
        assert!(matches!(
            resolve(&config, 1.0),
            Err(RasterError::InvalidConfig { .. })
        ));
        assert!(resolve(&base_config(), 0.0).is_err());
    }
}
