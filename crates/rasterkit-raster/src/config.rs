//! Engraving configuration bundle.
//!
//! All options that shape a raster job: geometry constraints, tone mapping,
//! quantization, power dialect, latency compensation, and the optional
//! framing/pointing preludes. The bundle is immutable for the duration of a
//! job; validation happens up front and every fault names the offending
//! field.

use serde::{Deserialize, Serialize};

use crate::error::{ParameterError, ParameterResult};

/// Scan axis selection for raster engraving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterMode {
    /// Scan along X, step rows along Y.
    Horizontal,
    /// Scan along Y, step rows along X.
    Vertical,
}

impl std::fmt::Display for RasterMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Horizontal => write!(f, "horizontal"),
            Self::Vertical => write!(f, "vertical"),
        }
    }
}

/// Command dialect for power assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerMode {
    /// Power rides on the motion line as an `S` word.
    Inline,
    /// Power is set by a standalone `M67 E<n> Q<v>` statement ahead of the
    /// motion it modulates.
    Gated,
}

impl std::fmt::Display for PowerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inline => write!(f, "S"),
            Self::Gated => write!(f, "M67"),
        }
    }
}

/// Laser arming command selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FiringMode {
    /// `M3` - constant power regardless of motion speed.
    Constant,
    /// `M4` - power scaled with actual speed by the controller.
    Dynamic,
}

impl FiringMode {
    /// The arming word for this mode.
    pub fn arm_command(&self) -> &'static str {
        match self {
            Self::Constant => "M3",
            Self::Dynamic => "M4",
        }
    }
}

impl std::fmt::Display for FiringMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.arm_command())
    }
}

/// Where machine zero sits relative to the image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    LowerLeft,
    UpperLeft,
    LowerRight,
    UpperRight,
    Center,
    /// Machine zero at an arbitrary point inside the image, measured from
    /// the image's lower-left corner.
    Custom { x: f64, y: f64 },
}

impl Default for Origin {
    fn default() -> Self {
        Self::LowerLeft
    }
}

/// Optional bounds-preview rectangle traced before the raster body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FramingConfig {
    /// Power asserted on every edge, in controller units. Low enough not to
    /// mark the workpiece.
    pub power: f64,
    /// Fraction of the engraving feedrate used for the trace, in (0, 1].
    pub feed_fraction: f64,
    /// Optional pause statement emitted after the trace (typically "M0").
    pub pause: Option<String>,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            power: 5.0,
            feed_fraction: 0.5,
            pause: Some("M0".to_string()),
        }
    }
}

/// Optional origin-marking pulse emitted before the raster body.
///
/// Some controllers latch power only on motion; the 0.01 mm micro-move
/// guarantees the operator sees a visible dot at machine zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointingConfig {
    /// Power asserted during the micro-move, in controller units.
    pub power: f64,
    /// Feed for the micro-move, units/min.
    pub feed: f64,
    /// Dwell after returning to the origin, seconds.
    pub dwell_s: f64,
    /// Optional pause statement emitted after the pulse (typically "M0").
    pub pause: Option<String>,
}

impl Default for PointingConfig {
    fn default() -> Self {
        Self {
            power: 10.0,
            feed: 100.0,
            dwell_s: 1.0,
            pause: Some("M0".to_string()),
        }
    }
}

/// Complete configuration bundle for one engraving job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngravingConfig {
    /// Scan axis selection.
    pub raster_mode: RasterMode,
    /// Scan-axis resolution; scan pitch is `25.4 / dpi` mm.
    pub dpi: u32,
    /// Row pitch along the non-scan axis, mm.
    pub line_step: f64,
    /// Target length of the scan axis, mm.
    pub ui_dimension: f64,
    /// Stretch the scan pitch so the achieved length equals `ui_dimension`
    /// exactly.
    pub force_dim: bool,
    /// Engraving feed, units/min.
    pub feedrate: f64,
    /// Overscan distance added at both ends of every scan line, mm.
    pub premove: f64,
    /// Contrast adjustment in [-1, 1]; 0 is neutral.
    pub contrast: f64,
    /// Gamma exponent, > 0.
    pub gamma: f64,
    /// Thermal response exponent, > 0. Multiplies with gamma.
    pub thermal: f64,
    /// Invert brightness semantics. When false, dark pixels fire.
    pub invert: bool,
    /// Quantization levels, at least 2.
    pub gray_steps: u32,
    /// Lower end of the output power range, controller units.
    pub min_p: f64,
    /// Upper end of the output power range, controller units.
    pub max_p: f64,
    /// Controller full-scale power.
    pub ctrl_max: f64,
    /// Command dialect for power assertion.
    pub power_mode: PowerMode,
    /// In gated mode, concatenate the `M67` statement ahead of the motion on
    /// the same line instead of emitting it standalone.
    pub analog_inline: bool,
    /// Analog output channel index for gated mode.
    pub e_num: u32,
    /// Controller reaction latency, milliseconds.
    pub m67_delay: f64,
    /// Machine zero placement relative to the image.
    pub origin: Origin,
    /// Laser arming command selection.
    pub firing_mode: FiringMode,
    /// Free text inserted after the preamble.
    pub custom_header: String,
    /// Free text inserted before the program end.
    pub custom_footer: String,
    /// Optional bounds-preview trace.
    pub framing: Option<FramingConfig>,
    /// Optional origin-marking pulse.
    pub pointing: Option<PointingConfig>,
}

impl Default for EngravingConfig {
    fn default() -> Self {
        Self {
            raster_mode: RasterMode::Horizontal,
            dpi: 254,
            line_step: 0.1,
            ui_dimension: 100.0,
            force_dim: false,
            feedrate: 3000.0,
            premove: 2.0,
            contrast: 0.0,
            gamma: 1.0,
            thermal: 1.0,
            invert: false,
            gray_steps: 16,
            min_p: 0.0,
            max_p: 1000.0,
            ctrl_max: 1000.0,
            power_mode: PowerMode::Inline,
            analog_inline: false,
            e_num: 0,
            m67_delay: 0.0,
            origin: Origin::LowerLeft,
            firing_mode: FiringMode::Constant,
            custom_header: String::new(),
            custom_footer: String::new(),
            framing: None,
            pointing: None,
        }
    }
}

impl EngravingConfig {
    /// Whether power rides on motion lines as an `S` word.
    pub fn use_s_mode(&self) -> bool {
        self.power_mode == PowerMode::Inline
    }

    /// Theoretical scan-axis pitch derived from DPI, mm.
    pub fn theoretical_scan_step(&self) -> f64 {
        25.4 / self.dpi as f64
    }

    /// Latency compensation distance, mm. Power transitions are shifted this
    /// far upstream of their nominal positions.
    pub fn latency_mm(&self) -> f64 {
        self.feedrate * self.m67_delay / 60_000.0
    }

    /// Check every field against its documented range.
    pub fn validate(&self) -> ParameterResult<()> {
        if self.dpi < 1 {
            return Err(ParameterError::OutOfRange {
                name: "dpi".to_string(),
                value: self.dpi as f64,
                min: 1.0,
                max: f64::INFINITY,
            });
        }
        if self.line_step <= 0.0 {
            return Err(ParameterError::InvalidValue {
                name: "line_step".to_string(),
                reason: "row pitch must be positive".to_string(),
            });
        }
        if self.ui_dimension <= 0.0 {
            return Err(ParameterError::InvalidValue {
                name: "ui_dimension".to_string(),
                reason: "target dimension must be positive".to_string(),
            });
        }
        if self.feedrate <= 0.0 {
            return Err(ParameterError::InvalidValue {
                name: "feedrate".to_string(),
                reason: "feed must be positive".to_string(),
            });
        }
        if self.premove < 0.0 {
            return Err(ParameterError::InvalidValue {
                name: "premove".to_string(),
                reason: "overscan cannot be negative".to_string(),
            });
        }
        if !(-1.0..=1.0).contains(&self.contrast) {
            return Err(ParameterError::OutOfRange {
                name: "contrast".to_string(),
                value: self.contrast,
                min: -1.0,
                max: 1.0,
            });
        }
        if self.gamma <= 0.0 {
            return Err(ParameterError::InvalidValue {
                name: "gamma".to_string(),
                reason: "gamma exponent must be positive".to_string(),
            });
        }
        if self.thermal <= 0.0 {
            return Err(ParameterError::InvalidValue {
                name: "thermal".to_string(),
                reason: "thermal exponent must be positive".to_string(),
            });
        }
        if self.gray_steps < 2 {
            return Err(ParameterError::OutOfRange {
                name: "gray_steps".to_string(),
                value: self.gray_steps as f64,
                min: 2.0,
                max: f64::INFINITY,
            });
        }
        if self.min_p > self.max_p {
            return Err(ParameterError::Incompatible(format!(
                "min_p ({}) exceeds max_p ({})",
                self.min_p, self.max_p
            )));
        }
        if self.min_p < 0.0 {
            return Err(ParameterError::InvalidValue {
                name: "min_p".to_string(),
                reason: "power cannot be negative".to_string(),
            });
        }
        if self.ctrl_max <= 0.0 {
            return Err(ParameterError::InvalidValue {
                name: "ctrl_max".to_string(),
                reason: "controller full-scale must be positive".to_string(),
            });
        }
        if self.m67_delay < 0.0 {
            return Err(ParameterError::InvalidValue {
                name: "m67_delay".to_string(),
                reason: "latency cannot be negative".to_string(),
            });
        }
        if let Some(framing) = &self.framing {
            if framing.feed_fraction <= 0.0 || framing.feed_fraction > 1.0 {
                return Err(ParameterError::OutOfRange {
                    name: "framing.feed_fraction".to_string(),
                    value: framing.feed_fraction,
                    min: 0.0,
                    max: 1.0,
                });
            }
            if framing.power < 0.0 {
                return Err(ParameterError::InvalidValue {
                    name: "framing.power".to_string(),
                    reason: "power cannot be negative".to_string(),
                });
            }
        }
        if let Some(pointing) = &self.pointing {
            if pointing.feed <= 0.0 {
                return Err(ParameterError::InvalidValue {
                    name: "pointing.feed".to_string(),
                    reason: "feed must be positive".to_string(),
                });
            }
            if pointing.dwell_s < 0.0 {
                return Err(ParameterError::InvalidValue {
                    name: "pointing.dwell_s".to_string(),
                    reason: "dwell cannot be negative".to_string(),
                });
            }
        }
        Ok(())
    }
}
