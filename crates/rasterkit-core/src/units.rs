//! Display formatting for sizes and durations.
//!
//! Program size predictions are rendered as "X.Y KB" below one mebibyte and
//! "X.YZ MB" at or above it; durations are rendered from fractional minutes.

/// Format a byte count for display.
///
/// * `bytes` - Predicted program size in bytes
pub fn format_size(bytes: u64) -> String {
    const MIB: f64 = 1024.0 * 1024.0;
    if (bytes as f64) < MIB {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.2} MB", bytes as f64 / MIB)
    }
}

/// Format a duration given in fractional minutes, e.g. "2 min 30 s".
pub fn format_minutes(minutes: f64) -> String {
    let total_s = (minutes * 60.0).round().max(0.0) as u64;
    let m = total_s / 60;
    let s = total_s % 60;
    if m == 0 {
        format!("{} s", s)
    } else {
        format!("{} min {} s", m, s)
    }
}
