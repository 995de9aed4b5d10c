//! Toolpath emission.
//!
//! Streams the raster G-code body plus header, framing, pointing, and footer
//! for a prepared power matrix. Output is assembled in order: metadata
//! comments, preamble, custom header, initialization safety, the optional
//! framing and pointing preludes, arming, the serpentine raster body, and
//! closure. Emission is byte-for-byte deterministic for identical inputs.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use rasterkit_core::BoxedIterator;

use crate::config::{EngravingConfig, FramingConfig, PointingConfig, PowerMode, RasterMode};
use crate::error::{ParameterError, RasterResult};
use crate::geometry::Geometry;
use crate::image::PowerMatrix;
use crate::syntax::{fmt_coord, fmt_feed, M67Gated, PowerSyntax, SInline};

/// Dwell length used by the initialization-safety sequence, seconds.
const SAFETY_DWELL_S: f64 = 0.5;

/// Length of the origin-marking micro-move, mm.
const POINTING_PULSE_MM: f64 = 0.01;

/// Overscan tail is chopped into micro-moves of this many scan steps.
const TAIL_CHOP_STEPS: f64 = 4.0;

/// Emit the complete program for a prepared matrix.
pub fn emit(
    matrix: &PowerMatrix,
    geometry: &Geometry,
    config: &EngravingConfig,
) -> RasterResult<String> {
    let cancel = AtomicBool::new(false);
    Ok(emit_with_cancel(matrix, geometry, config, &cancel)?.unwrap_or_default())
}

/// Emit with a cooperative cancellation flag.
///
/// The flag is checked at scan-line boundaries, so cancellation latency is
/// bounded by the time to emit one scan line. Returns `Ok(None)` when the
/// flag was raised before completion.
pub fn emit_with_cancel(
    matrix: &PowerMatrix,
    geometry: &Geometry,
    config: &EngravingConfig,
    cancel: &AtomicBool,
) -> RasterResult<Option<String>> {
    if matrix.width() != geometry.w_px || matrix.height() != geometry.h_px {
        return Err(ParameterError::Incompatible(format!(
            "power matrix is {}x{}, geometry wants {}x{}",
            matrix.width(),
            matrix.height(),
            geometry.w_px,
            geometry.h_px
        ))
        .into());
    }
    config.validate()?;

    let emitter = Emitter::new(matrix, geometry, config);
    emitter.run(cancel)
}

struct Emitter<'a> {
    config: &'a EngravingConfig,
    geometry: &'a Geometry,
    matrix: &'a PowerMatrix,
    syntax: Box<dyn PowerSyntax>,
    out: String,
    /// Last commanded power; NaN until the initialization safety ran.
    last_power: f64,
}

impl<'a> Emitter<'a> {
    fn new(matrix: &'a PowerMatrix, geometry: &'a Geometry, config: &'a EngravingConfig) -> Self {
        let syntax: Box<dyn PowerSyntax> = match config.power_mode {
            PowerMode::Inline => Box::new(SInline),
            PowerMode::Gated => Box::new(M67Gated {
                e_num: config.e_num,
                inline: config.analog_inline,
            }),
        };
        Self {
            config,
            geometry,
            matrix,
            syntax,
            out: String::new(),
            last_power: f64::NAN,
        }
    }

    fn run(mut self, cancel: &AtomicBool) -> RasterResult<Option<String>> {
        self.header();
        self.init_safety();

        let has_prelude = self.config.framing.is_some() || self.config.pointing.is_some();
        if let Some(framing) = self.config.framing.clone() {
            self.framing_block(&framing);
        }
        if let Some(pointing) = self.config.pointing.clone() {
            self.pointing_block(&pointing);
        }
        if has_prelude {
            // The preludes run at their own feeds; restore the engraving feed
            // before arming for the body.
            let restore = format!("G1 F{}", fmt_feed(self.config.feedrate));
            self.line(&restore);
        }

        self.line(self.config.firing_mode.arm_command());

        for k in 0..self.geometry.scan_lines() {
            if cancel.load(Ordering::Relaxed) {
                debug!(line = k, "emission cancelled at scan-line boundary");
                return Ok(None);
            }
            self.scan_line(k);
        }

        if self.config.power_mode == PowerMode::Gated {
            self.assert_power(0.0);
        }
        self.line("M5 S0");
        if !self.config.custom_footer.is_empty() {
            self.text_block(&self.config.custom_footer.clone());
        }
        self.line("M30");

        debug!(bytes = self.out.len(), "program emitted");
        Ok(Some(self.out))
    }

    // ------------------------------------------------------------------
    // Skeleton pieces

    fn header(&mut self) {
        let comments = [
            format!("(rasterkit {})", env!("CARGO_PKG_VERSION")),
            format!("(raster mode: {})", self.config.raster_mode),
            format!("(firing mode: {})", self.config.firing_mode),
            format!("(gray steps: {})", self.config.gray_steps),
        ];
        for c in comments {
            self.line(&c);
        }
        self.line("G21");
        self.line("G90");
        self.line("G17");
        self.line("G94");
        let feed = format!("G1 F{}", fmt_feed(self.config.feedrate));
        self.line(&feed);
        if !self.config.custom_header.is_empty() {
            self.text_block(&self.config.custom_header.clone());
        }
    }

    /// Guarantee the laser is off before anything moves.
    fn init_safety(&mut self) {
        let dwell = format!("G4 P{}", fmt_feed(SAFETY_DWELL_S));
        self.assert_power(0.0);
        self.line(&dwell);
        if self.config.power_mode == PowerMode::Gated {
            self.line("M5");
            self.line(&dwell);
        }
    }

    /// Bounds-preview rectangle, walked counter-clockwise from the corner
    /// nearest machine zero. Ends disarmed.
    fn framing_block(&mut self, framing: &FramingConfig) {
        self.line("(framing)");
        let corners = self.geometry.rect_burn.corners_ccw();
        let start = nearest_corner(&corners, 0.0, 0.0);
        let feed = self.config.feedrate * framing.feed_fraction;

        self.line(self.config.firing_mode.arm_command());
        let rapid = format!(
            "G0 X{} Y{}",
            fmt_coord(corners[start].0),
            fmt_coord(corners[start].1)
        );
        self.line(&rapid);
        for i in 1..=4 {
            let (x, y) = corners[(start + i) % 4];
            let mut words = format!("G1 X{} Y{}", fmt_coord(x), fmt_coord(y));
            if i == 1 {
                words.push_str(&format!(" F{}", fmt_feed(feed)));
            }
            // Power is asserted on every edge, not only on change.
            self.forced_motion(&words, framing.power);
        }
        self.assert_power(0.0);
        self.line("M5");
        if let Some(pause) = framing.pause.clone() {
            self.line(&pause);
        }
    }

    /// Zero-extent pulse that marks machine zero. Ends disarmed.
    fn pointing_block(&mut self, pointing: &PointingConfig) {
        self.line("(pointing)");
        self.line("M5");
        let rapid = format!("G0 X{} Y{}", fmt_coord(0.0), fmt_coord(0.0));
        self.line(&rapid);
        self.line(self.config.firing_mode.arm_command());
        let pulse = format!(
            "G1 X{} F{}",
            fmt_coord(POINTING_PULSE_MM),
            fmt_feed(pointing.feed)
        );
        self.forced_motion(&pulse, pointing.power);
        let back = format!("G1 X{}", fmt_coord(0.0));
        self.forced_motion(&back, 0.0);
        let dwell = format!("G4 P{}", fmt_feed(pointing.dwell_s));
        self.line(&dwell);
        self.line("M5");
        if let Some(pause) = pointing.pause.clone() {
            self.line(&pause);
        }
    }

    // ------------------------------------------------------------------
    // Raster body

    fn scan_line(&mut self, k: u32) {
        let geometry = self.geometry;
        let config = self.config;
        let m = geometry.pixels_per_line() as usize;
        let span = geometry.scan_span();
        let step = geometry.scan_step;
        let forward = k % 2 == 0;
        let dir = if forward { 1.0 } else { -1.0 };
        let (off_scan, off_cross) = match config.raster_mode {
            RasterMode::Horizontal => (geometry.offset_x, geometry.offset_y),
            RasterMode::Vertical => (geometry.offset_y, geometry.offset_x),
        };
        let entry = if forward { off_scan } else { off_scan + span };
        let exit = if forward { off_scan + span } else { off_scan };
        let corr = -config.latency_mm() * dir;
        let pre_start = entry - config.premove * dir;
        let pre_end = exit + config.premove * dir;
        let cross = off_cross + k as f64 * geometry.line_step;

        // Repositioning happens with the laser commanded off.
        if self.last_power != 0.0 {
            self.assert_power(0.0);
        }
        let rapid = self.g0_both(pre_start, cross);
        self.line(&rapid);

        if config.premove > 0.0 {
            let traverse = self.g1_scan(entry + corr);
            self.motion(traverse, 0.0);
        }

        // Merged pixel segments under hysteresis. The snap state is per-row:
        // carrying it across rows would silently weld the first pixels of a
        // row to the previous row's closing power.
        let row = self.line_powers(k);
        let hyst = (0.02 * config.ctrl_max).max(0.001);
        let mut hyst_p = f64::NAN;
        let mut current: Option<f64> = None;
        let mut group_target = entry + corr;
        let order: BoxedIterator<usize> = if forward {
            Box::new(0..m)
        } else {
            Box::new((0..m).rev())
        };
        for j in order {
            let raw = row[j].clamp(0.0, config.ctrl_max);
            let snapped = if hyst_p.is_finite() && (raw - hyst_p).abs() < hyst {
                hyst_p
            } else {
                hyst_p = raw;
                raw
            };
            let coord = off_scan + j as f64 * step + corr;
            match current {
                Some(p) if snapped == p => group_target = coord,
                Some(p) => {
                    let words = self.g1_scan(group_target);
                    self.motion(words, p);
                    current = Some(snapped);
                    group_target = coord;
                }
                None => {
                    current = Some(snapped);
                    group_target = coord;
                }
            }
        }
        let close = self.g1_scan(exit + corr);
        self.motion(close, current.unwrap_or(0.0));

        // Chopped overscan tail: decelerate at zero power in fixed-length
        // micro-moves so the velocity profile stays predictable.
        let cursor = exit + corr;
        let chop = TAIL_CHOP_STEPS * step;
        let count = ((pre_end - cursor).abs() / chop).floor() as u64;
        let mut pos = cursor;
        for _ in 0..count {
            pos += chop * dir;
            let words = self.g1_scan(pos);
            self.motion(words, 0.0);
        }
        if (pre_end - pos).abs() > 1e-9 {
            let words = self.g1_scan(pre_end);
            self.motion(words, 0.0);
        }
    }

    /// Pixel powers for scan line `k`, in machine order: index 0 sits at the
    /// scan-axis origin side. Line 0 is the bottom of the image as the user
    /// sees it.
    fn line_powers(&self, k: u32) -> Vec<f64> {
        let h = self.geometry.h_px;
        match self.config.raster_mode {
            RasterMode::Horizontal => self.matrix.row(h - 1 - k).to_vec(),
            RasterMode::Vertical => (0..h).map(|j| self.matrix.value(k, h - 1 - j)).collect(),
        }
    }

    // ------------------------------------------------------------------
    // Output helpers

    fn line(&mut self, s: &str) {
        self.out.push_str(s);
        self.out.push('\n');
    }

    fn text_block(&mut self, text: &str) {
        for l in text.lines() {
            self.line(l);
        }
    }

    /// Standalone power assertion through the active dialect.
    fn assert_power(&mut self, power: f64) {
        self.syntax.power_only(&mut self.out, power);
        self.last_power = power;
    }

    /// Linear motion; the power word/statement is emitted only when the
    /// commanded value changes.
    fn motion(&mut self, words: String, power: f64) {
        if self.last_power.is_nan() || power != self.last_power {
            self.syntax.power_with_motion(&mut self.out, &words, power);
            self.last_power = power;
        } else {
            self.line(&words);
        }
    }

    /// Linear motion with the power asserted unconditionally.
    fn forced_motion(&mut self, words: &str, power: f64) {
        self.syntax.power_with_motion(&mut self.out, words, power);
        self.last_power = power;
    }

    fn g1_scan(&self, v: f64) -> String {
        match self.config.raster_mode {
            RasterMode::Horizontal => format!("G1 X{}", fmt_coord(v)),
            RasterMode::Vertical => format!("G1 Y{}", fmt_coord(v)),
        }
    }

    fn g0_both(&self, scan: f64, cross: f64) -> String {
        match self.config.raster_mode {
            RasterMode::Horizontal => format!("G0 X{} Y{}", fmt_coord(scan), fmt_coord(cross)),
            RasterMode::Vertical => format!("G0 X{} Y{}", fmt_coord(cross), fmt_coord(scan)),
        }
    }
}

fn nearest_corner(corners: &[(f64, f64); 4], x: f64, y: f64) -> usize {
    let mut best = 0;
    let mut best_d = f64::INFINITY;
    for (i, (cx, cy)) in corners.iter().enumerate() {
        let d = (cx - x).hypot(cy - y);
        if d < best_d {
            best_d = d;
            best = i;
        }
    }
    best
}
