//! Image preparation: decode, resize, tone-map, quantize.
//!
//! Turns a source image into the power matrix consumed by the size oracle
//! and the toolpath emitter. The decoded source is cached by absolute path
//! and modification time so that re-running a job with changed non-image
//! parameters skips the decode.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use image::imageops::FilterType;
use image::GrayImage;
use tracing::debug;

use crate::config::EngravingConfig;
use crate::error::{RasterError, RasterResult};
use crate::geometry::Geometry;

/// Normalized brightness below which a pixel is forced to zero power,
/// regardless of `min_p`.
pub const BLACK_FLOOR: f64 = 0.005;

/// Row-major grid of laser power values, one per output pixel.
///
/// Index (0, 0) is the image top-left. The emitter reverses row order when
/// mapping onto the machine's upward Y axis. The buffer is allocated once by
/// the preparer and borrowed downstream, never copied.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerMatrix {
    width: u32,
    height: u32,
    data: Vec<f64>,
}

impl PowerMatrix {
    /// Build a matrix by evaluating `f(x, y)` for every cell.
    pub fn from_fn<F>(width: u32, height: u32, mut f: F) -> Self
    where
        F: FnMut(u32, u32) -> f64,
    {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Power at the given cell.
    pub fn value(&self, x: u32, y: u32) -> f64 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// One image row as a slice.
    pub fn row(&self, y: u32) -> &[f64] {
        let w = self.width as usize;
        let start = y as usize * w;
        &self.data[start..start + w]
    }

    /// Total number of cells.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The whole buffer, row-major.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}

struct CachedImage {
    mtime: SystemTime,
    gray: GrayImage,
}

/// Decodes source images and prepares power matrices.
///
/// Owns the decoded-image cache. Only the preparer mutates it.
#[derive(Default)]
pub struct ImagePreparer {
    cache: HashMap<PathBuf, CachedImage>,
}

impl ImagePreparer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source image aspect ratio, height over width.
    pub fn aspect<P: AsRef<Path>>(&mut self, path: P) -> RasterResult<f64> {
        let gray = self.load(path.as_ref())?;
        if gray.width() == 0 || gray.height() == 0 {
            return Err(RasterError::ImageUnreadable {
                path: path.as_ref().display().to_string(),
                reason: "image has zero extent".to_string(),
            });
        }
        Ok(gray.height() as f64 / gray.width() as f64)
    }

    /// Decode the image at `path`, reusing the cached copy when the file is
    /// unchanged.
    pub fn load(&mut self, path: &Path) -> RasterResult<&GrayImage> {
        let unreadable = |reason: String| RasterError::ImageUnreadable {
            path: path.display().to_string(),
            reason,
        };
        let abs = path
            .canonicalize()
            .map_err(|e| unreadable(e.to_string()))?;
        let mtime = std::fs::metadata(&abs)
            .and_then(|m| m.modified())
            .map_err(|e| unreadable(e.to_string()))?;

        match self.cache.entry(abs.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().mtime != mtime {
                    debug!(path = %abs.display(), "cached image is stale, re-decoding");
                    let gray = decode(&abs, path)?;
                    occupied.insert(CachedImage { mtime, gray });
                }
                Ok(&occupied.into_mut().gray)
            }
            Entry::Vacant(vacant) => {
                let gray = decode(&abs, path)?;
                debug!(path = %abs.display(), w = gray.width(), h = gray.height(), "decoded source image");
                Ok(&vacant.insert(CachedImage { mtime, gray }).gray)
            }
        }
    }

    /// Decode `path` and run the full preparation pipeline for the resolved
    /// geometry.
    pub fn prepare<P: AsRef<Path>>(
        &mut self,
        path: P,
        geometry: &Geometry,
        config: &EngravingConfig,
    ) -> RasterResult<PowerMatrix> {
        let gray = self.load(path.as_ref())?;
        Ok(prepare_matrix(gray, geometry, config))
    }

    /// Number of decoded images currently cached.
    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }
}

fn decode(abs: &Path, display_path: &Path) -> RasterResult<GrayImage> {
    let img = image::open(abs).map_err(|e| RasterError::ImageUnreadable {
        path: display_path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(img.to_luma8())
}

/// Run the tone-mapping pipeline on an already-decoded image.
///
/// Steps, in order: resize (bicubic), polarity, contrast, tone, range map,
/// quantize, black-floor mask. All operations work on a single `f64` buffer
/// in `[0, 1]` until the range map.
pub fn prepare_matrix(
    gray: &GrayImage,
    geometry: &Geometry,
    config: &EngravingConfig,
) -> PowerMatrix {
    let resized = image::imageops::resize(
        gray,
        geometry.w_px,
        geometry.h_px,
        FilterType::CatmullRom,
    );

    let mut buf: Vec<f64> = resized.as_raw().iter().map(|&p| p as f64 / 255.0).collect();

    // The engine treats "dark = fire": without inversion, brightness flips
    // into firing intensity.
    if !config.invert {
        for v in buf.iter_mut() {
            *v = 1.0 - *v;
        }
    }

    let c = config.contrast;
    if c != 0.0 {
        let f = (259.0 * (c + 1.0)) / (255.0 * (259.0 - c)) * 255.0;
        for v in buf.iter_mut() {
            *v = ((*v - 0.5) * f + 0.5).clamp(0.0, 1.0);
        }
    }

    let exponent = config.gamma * config.thermal;
    if exponent != 1.0 {
        for v in buf.iter_mut() {
            *v = v.powf(exponent);
        }
    }

    // The mask is decided on pre-range-map brightness so that min_p cannot
    // lift a blank pixel off zero.
    let floor_mask: Vec<bool> = buf.iter().map(|&v| v < BLACK_FLOOR).collect();

    let span = config.max_p - config.min_p;
    let levels = (config.gray_steps - 1) as f64;
    let mut data = Vec::with_capacity(buf.len());
    for (i, &v) in buf.iter().enumerate() {
        let p = if span > 0.0 {
            let raw = config.min_p + v * span;
            let t = ((raw - config.min_p) / span * levels).round() / levels;
            config.min_p + t * span
        } else {
            config.min_p
        };
        data.push(if floor_mask[i] { 0.0 } else { p });
    }

    PowerMatrix {
        width: geometry.w_px,
        height: geometry.h_px,
        data,
    }
}
