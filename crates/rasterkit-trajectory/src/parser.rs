//! G-code trajectory parser.
//!
//! Re-reads an emitted program into a time-stamped motion polyline for
//! simulation and verification. The parser tracks modal feed and power
//! state, skips comments, and reports malformed motion lines as warnings on
//! a side channel while continuing: a partial trajectory is more useful than
//! none for the simulator.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::{debug, warn};

use rasterkit_core::Rect;
use rasterkit_raster::Geometry;

/// Interpolated point density for long segments, points per second.
const POINTS_PER_SECOND: f64 = 60.0;

/// One sample of the reconstructed motion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    /// Machine X, mm.
    pub x_mm: f64,
    /// Machine Y, mm.
    pub y_mm: f64,
    /// Power in effect during the segment ending at this point.
    pub power: f64,
    /// Zero-based index of the program line that produced this point.
    pub source_line: usize,
    /// Feed in effect, units/min.
    pub feedrate: f64,
    /// Cumulative time, seconds. Non-decreasing across the trajectory.
    pub time_s: f64,
}

/// A malformed line the parser skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseWarning {
    /// Zero-based program line index.
    pub line: usize,
    pub reason: String,
}

impl std::fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line + 1, self.reason)
    }
}

/// Reconstructed motion polyline plus the warning side channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub points: Vec<TrajectoryPoint>,
    pub warnings: Vec<ParseWarning>,
}

impl Trajectory {
    /// Final cumulative time, seconds.
    pub fn final_time(&self) -> f64 {
        self.points.last().map(|p| p.time_s).unwrap_or(0.0)
    }

    /// Bounding box of all visited coordinates.
    pub fn bounds(&self) -> Option<Rect> {
        let mut points = self.points.iter();
        let first = points.next()?;
        let mut rect = Rect::point(first.x_mm, first.y_mm);
        for p in points {
            rect = rect.including(p.x_mm, p.y_mm);
        }
        Some(rect)
    }

    /// Whether the reconstructed duration agrees with the geometry's
    /// prediction, within a tolerance proportional to the number of
    /// acceleration transitions.
    pub fn agrees_with(&self, geometry: &Geometry) -> bool {
        let predicted_s = geometry.est_min * 60.0;
        let slack = 0.1 * geometry.scan_lines() as f64 + 0.2 * predicted_s;
        (self.final_time() - predicted_s).abs() <= slack
    }
}

/// Parse a full program text into a trajectory.
///
/// `geometry` is the record the program was produced with; it is used for a
/// duration cross-check only and never influences the reconstruction.
pub fn parse(program: &str, geometry: &Geometry) -> Trajectory {
    let mut state = ParserState::new();
    for (index, raw) in program.lines().enumerate() {
        state.consume(index, raw);
    }

    let trajectory = Trajectory {
        points: state.points,
        warnings: state.warnings,
    };
    if !trajectory.points.is_empty() && !trajectory.agrees_with(geometry) {
        warn!(
            final_s = trajectory.final_time(),
            predicted_s = geometry.est_min * 60.0,
            "trajectory duration disagrees with the geometry prediction"
        );
    }
    debug!(
        points = trajectory.points.len(),
        warnings = trajectory.warnings.len(),
        "program parsed"
    );
    trajectory
}

struct ParserState {
    cursor_x: f64,
    cursor_y: f64,
    feed: f64,
    power: f64,
    time_s: f64,
    points: Vec<TrajectoryPoint>,
    warnings: Vec<ParseWarning>,
}

impl ParserState {
    fn new() -> Self {
        Self {
            cursor_x: 0.0,
            cursor_y: 0.0,
            feed: 0.0,
            power: 0.0,
            time_s: 0.0,
            points: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn consume(&mut self, index: usize, raw: &str) {
        let cleaned = strip_comments(raw);
        let line = cleaned.trim();
        if line.is_empty() {
            return;
        }

        let words = tokenize(line);
        if words.is_empty() {
            self.warnings.push(ParseWarning {
                line: index,
                reason: format!("unrecognized statement: {}", line),
            });
            return;
        }

        let mut target_x: Option<f64> = None;
        let mut target_y: Option<f64> = None;
        let mut dwell: Option<f64> = None;
        let mut is_dwell = false;

        for (letter, value) in &words {
            match letter {
                'F' => {
                    if *value > 0.0 {
                        self.feed = *value;
                    } else {
                        self.warnings.push(ParseWarning {
                            line: index,
                            reason: format!("ignoring non-positive feed {value}"),
                        });
                    }
                }
                // Mode-agnostic power assertion: S and Q both command power.
                'S' | 'Q' => self.power = *value,
                'M' => {
                    if (*value - 5.0).abs() < f64::EPSILON {
                        self.power = 0.0;
                    }
                }
                'G' => {
                    if (*value - 4.0).abs() < f64::EPSILON {
                        is_dwell = true;
                    }
                }
                'P' => dwell = Some(*value),
                'X' => target_x = Some(*value),
                'Y' => target_y = Some(*value),
                _ => {}
            }
        }

        if is_dwell {
            if let Some(seconds) = dwell {
                if seconds >= 0.0 {
                    self.time_s += seconds;
                }
            }
            return;
        }

        // A motion line moves to the given target; a missing axis stays at
        // the cursor. Power-only statements fall through without a point.
        if target_x.is_none() && target_y.is_none() {
            if line.contains('X') || line.contains('Y') {
                self.warnings.push(ParseWarning {
                    line: index,
                    reason: format!("malformed motion line: {}", line),
                });
            }
            return;
        }

        let x = target_x.unwrap_or(self.cursor_x);
        let y = target_y.unwrap_or(self.cursor_y);
        let distance = (x - self.cursor_x).hypot(y - self.cursor_y);

        let duration = if self.feed > 0.0 {
            distance / (self.feed / 60.0)
        } else {
            if distance > 0.0 {
                self.warnings.push(ParseWarning {
                    line: index,
                    reason: "motion before any feed was set".to_string(),
                });
            }
            0.0
        };

        self.emit_segment(index, x, y, duration);
    }

    /// Emit the segment endpoint, with interpolated intermediates on long
    /// segments so the simulator's curve stays smooth.
    fn emit_segment(&mut self, index: usize, x: f64, y: f64, duration: f64) {
        let start_x = self.cursor_x;
        let start_y = self.cursor_y;
        let start_t = self.time_s;

        let steps = (duration * POINTS_PER_SECOND).floor() as usize;
        if steps >= 2 {
            for i in 1..steps {
                let t = i as f64 / steps as f64;
                self.points.push(TrajectoryPoint {
                    x_mm: start_x + (x - start_x) * t,
                    y_mm: start_y + (y - start_y) * t,
                    power: self.power,
                    source_line: index,
                    feedrate: self.feed,
                    time_s: start_t + duration * t,
                });
            }
        }

        self.time_s = start_t + duration;
        self.cursor_x = x;
        self.cursor_y = y;
        self.points.push(TrajectoryPoint {
            x_mm: x,
            y_mm: y,
            power: self.power,
            source_line: index,
            feedrate: self.feed,
            time_s: self.time_s,
        });
    }
}

fn strip_comments(line: &str) -> String {
    static COMMENT_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = COMMENT_REGEX.get_or_init(|| Regex::new(r"[;(].*").expect("invalid regex pattern"));
    regex.replace(line, "").to_string()
}

fn tokenize(line: &str) -> Vec<(char, f64)> {
    static WORD_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = WORD_REGEX.get_or_init(|| {
        Regex::new(r"([A-Za-z])\s*([+-]?(?:\d+\.?\d*|\.\d+))").expect("invalid regex pattern")
    });
    regex
        .captures_iter(line)
        .filter_map(|cap| {
            let letter = cap[1].chars().next()?.to_ascii_uppercase();
            let value: f64 = cap[2].parse().ok()?;
            Some((letter, value))
        })
        .collect()
}
