//! Persisted settings document.
//!
//! Two top-level sections: `machine_settings` (command dialect, firing mode,
//! channel, controller full-scale, output extension, latency, overscan, and
//! header/footer text) and `stats` (cumulative counters). Unknown keys are
//! preserved across load/save so that newer versions can round-trip older
//! documents; missing keys fall back to the documented defaults.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use rasterkit_raster::{FiringMode, PowerMode};

/// Machine-facing defaults applied to new jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineSettings {
    /// Command dialect for power assertion.
    pub power_mode: PowerMode,
    /// Laser arming command selection.
    pub firing_mode: FiringMode,
    /// Analog output channel for gated mode.
    pub e_num: u32,
    /// Controller full-scale power.
    pub ctrl_max: f64,
    /// Default extension for written programs.
    pub extension: String,
    /// Controller reaction latency, milliseconds.
    pub m67_delay: f64,
    /// Default overscan distance, mm.
    pub premove: f64,
    /// Free text inserted after the preamble of every program.
    pub custom_header: String,
    /// Free text inserted before the end of every program.
    pub custom_footer: String,
    /// Keys this version does not know about, preserved verbatim.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self {
            power_mode: PowerMode::Inline,
            firing_mode: FiringMode::Constant,
            e_num: 0,
            ctrl_max: 1000.0,
            extension: "gcode".to_string(),
            m67_delay: 0.0,
            premove: 2.0,
            custom_header: String::new(),
            custom_footer: String::new(),
            extra: HashMap::new(),
        }
    }
}

/// Cumulative dashboard counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Stats {
    /// Total program lines emitted.
    pub lines_total: u64,
    /// Total programs generated.
    pub programs_total: u64,
    /// Total predicted engraving time, minutes.
    pub engrave_minutes_total: f64,
    /// When the last program was generated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_generated: Option<DateTime<Utc>>,
    /// Keys this version does not know about, preserved verbatim.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Stats {
    /// Accumulate one successful generation.
    pub fn record_program(&mut self, lines: u64, minutes: f64) {
        self.lines_total += lines;
        self.programs_total += 1;
        self.engrave_minutes_total += minutes;
        self.last_generated = Some(Utc::now());
    }
}

/// The complete persisted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SettingsDocument {
    pub machine_settings: MachineSettings,
    pub stats: Stats,
    /// Unknown top-level sections, preserved verbatim.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}
