//! # RasterKit
//!
//! Raster image to laser G-code engine. Converts a still image plus a
//! configuration bundle into a machine-control program that reproduces the
//! image by burning a grid of pixels, and parses emitted programs back into
//! time-stamped trajectories for simulation.
//!
//! ## Architecture
//!
//! RasterKit is organized as a workspace with multiple crates:
//!
//! 1. **rasterkit-core** - Shared geometric primitives and formatting
//! 2. **rasterkit-raster** - Geometry resolution, image preparation, size
//!    prediction, toolpath emission
//! 3. **rasterkit-trajectory** - Program parsing and simulation support
//! 4. **rasterkit-settings** - Persisted machine settings and statistics
//! 5. **rasterkit** - Facade library and command-line front end
//!
//! The core API is three pure functions: [`generate`], [`estimate`], and
//! [`parse`]. Errors are discriminated results, never panics.

pub use rasterkit_core::{format_minutes, format_size, Rect};
pub use rasterkit_raster::{
    emit, emit_with_cancel, estimate_size, prepare_matrix, resolve, EngravingConfig, FiringMode,
    FramingConfig, Geometry, ImagePreparer, MemoryCapped, Origin, PointingConfig, PowerMatrix,
    PowerMode, RasterError, RasterMode, RasterResult, SizeEstimate,
};
pub use rasterkit_settings as settings;
pub use rasterkit_trajectory::{parse, ParseWarning, Trajectory, TrajectoryPoint};

use std::path::Path;

/// A finished program plus the records that describe it.
#[derive(Debug, Clone)]
pub struct GeneratedProgram {
    /// The complete program text, LF line endings.
    pub text: String,
    /// The geometry the program was emitted with.
    pub geometry: Geometry,
    /// The size oracle's prediction for this program.
    pub size: SizeEstimate,
}

/// Resolve geometry and predict size for a job without emitting it.
pub fn estimate<P: AsRef<Path>>(
    config: &EngravingConfig,
    image_path: P,
) -> RasterResult<Geometry> {
    let mut preparer = ImagePreparer::new();
    estimate_with(&mut preparer, config, image_path.as_ref())
}

/// Run the full pipeline: geometry, preparation, size prediction, emission.
pub fn generate<P: AsRef<Path>>(
    config: &EngravingConfig,
    image_path: P,
) -> RasterResult<GeneratedProgram> {
    let mut preparer = ImagePreparer::new();
    generate_with(&mut preparer, config, image_path.as_ref())
}

/// [`estimate`] against a caller-owned preparer, so repeated jobs share the
/// decoded-image cache.
pub fn estimate_with(
    preparer: &mut ImagePreparer,
    config: &EngravingConfig,
    image_path: &Path,
) -> RasterResult<Geometry> {
    let aspect = preparer.aspect(image_path)?;
    let mut geometry = resolve(config, aspect)?;
    let matrix = preparer.prepare(image_path, &geometry, config)?;
    let size = estimate_size(&matrix, config, &geometry);
    geometry.size_hint = Some(size.rendered);
    Ok(geometry)
}

/// [`generate`] against a caller-owned preparer.
pub fn generate_with(
    preparer: &mut ImagePreparer,
    config: &EngravingConfig,
    image_path: &Path,
) -> RasterResult<GeneratedProgram> {
    let aspect = preparer.aspect(image_path)?;
    let mut geometry = resolve(config, aspect)?;
    let matrix = preparer.prepare(image_path, &geometry, config)?;
    let size = estimate_size(&matrix, config, &geometry);
    geometry.size_hint = Some(size.rendered.clone());
    let text = emit(&matrix, &geometry, config)?;
    Ok(GeneratedProgram {
        text,
        geometry,
        size,
    })
}

/// Initialize logging for the CLI.
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn test_image(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("gradient.png");
        let img = GrayImage::from_fn(32, 32, |x, y| Luma([((x * 4 + y * 4) % 256) as u8]));
        img.save(&path).unwrap();
        path
    }

    fn config() -> EngravingConfig {
        EngravingConfig {
            ui_dimension: 5.0,
            dpi: 127,
            line_step: 0.2,
            premove: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_generate_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_image(&dir);
        let cfg = config();
        let a = generate(&cfg, &path).unwrap();
        let b = generate(&cfg, &path).unwrap();
        assert_eq!(a.text, b.text);
        assert!(a.text.ends_with("M30\n"));
    }

    #[test]
    fn test_estimate_populates_size_hint() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_image(&dir);
        let geometry = estimate(&config(), &path).unwrap();
        assert!(geometry.size_hint.is_some());
        assert!(geometry.est_min > 0.0);
    }

    #[test]
    fn test_generate_round_trips_through_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_image(&dir);
        let program = generate(&config(), &path).unwrap();
        let trajectory = parse(&program.text, &program.geometry);
        assert!(trajectory.warnings.is_empty());
        assert!(trajectory.final_time() > 0.0);
    }

    #[test]
    fn test_shared_preparer_reuses_decode() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_image(&dir);
        let mut preparer = ImagePreparer::new();
        let cfg = config();
        generate_with(&mut preparer, &cfg, &path).unwrap();
        let bigger = EngravingConfig {
            ui_dimension: 10.0,
            ..cfg
        };
        generate_with(&mut preparer, &bigger, &path).unwrap();
        assert_eq!(preparer.cached_count(), 1);
    }

    #[test]
    fn test_unreadable_image_error() {
        let err = generate(&config(), "/nonexistent.png");
        assert!(matches!(err, Err(RasterError::ImageUnreadable { .. })));
    }
}
