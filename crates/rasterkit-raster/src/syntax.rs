//! Power command dialects.
//!
//! The two dialects share the whole emit path; only the way power reaches
//! the controller differs. Inline mode rides an `S` word on the motion line;
//! gated-analog mode sets analog output `e_num` with an `M67` statement that
//! precedes the motion it modulates (or, optionally, is concatenated ahead of
//! it on the same line).

/// Format a power value for output (three fractional digits).
pub(crate) fn fmt_power(p: f64) -> String {
    format!("{:.3}", p)
}

/// Format a coordinate for output (four fractional digits).
pub(crate) fn fmt_coord(v: f64) -> String {
    format!("{:.4}", v)
}

/// Format a feed value for output.
pub(crate) fn fmt_feed(f: f64) -> String {
    format!("{:.1}", f)
}

/// One of the two power-assertion dialects.
///
/// `motion_words` never contains the trailing newline; implementations write
/// complete lines.
pub(crate) trait PowerSyntax {
    /// Standalone power assertion with no motion.
    fn power_only(&self, out: &mut String, power: f64);

    /// A linear motion with `power` taking effect for that motion.
    fn power_with_motion(&self, out: &mut String, motion_words: &str, power: f64);
}

/// Inline-power mode: `G1 X… S<v>`.
pub(crate) struct SInline;

impl PowerSyntax for SInline {
    fn power_only(&self, out: &mut String, power: f64) {
        out.push('S');
        out.push_str(&fmt_power(power));
        out.push('\n');
    }

    fn power_with_motion(&self, out: &mut String, motion_words: &str, power: f64) {
        out.push_str(motion_words);
        out.push_str(" S");
        out.push_str(&fmt_power(power));
        out.push('\n');
    }
}

/// Gated-analog mode: `M67 E<n> Q<v>` ahead of the motion.
pub(crate) struct M67Gated {
    pub e_num: u32,
    /// Concatenate the statement onto the motion line instead of emitting it
    /// standalone.
    pub inline: bool,
}

impl M67Gated {
    fn statement(&self, power: f64) -> String {
        format!("M67 E{} Q{}", self.e_num, fmt_power(power))
    }
}

impl PowerSyntax for M67Gated {
    fn power_only(&self, out: &mut String, power: f64) {
        out.push_str(&self.statement(power));
        out.push('\n');
    }

    fn power_with_motion(&self, out: &mut String, motion_words: &str, power: f64) {
        out.push_str(&self.statement(power));
        if self.inline {
            out.push(' ');
        } else {
            out.push('\n');
        }
        out.push_str(motion_words);
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_power_rides_the_motion() {
        let mut out = String::new();
        SInline.power_with_motion(&mut out, "G1 X1.0000", 300.0);
        assert_eq!(out, "G1 X1.0000 S300.000\n");

        out.clear();
        SInline.power_only(&mut out, 0.0);
        assert_eq!(out, "S0.000\n");
    }

    #[test]
    fn test_gated_statement_precedes_motion() {
        let syntax = M67Gated {
            e_num: 2,
            inline: false,
        };
        let mut out = String::new();
        syntax.power_with_motion(&mut out, "G1 X1.0000", 300.0);
        assert_eq!(out, "M67 E2 Q300.000\nG1 X1.0000\n");
    }

    #[test]
    fn test_gated_inline_shares_the_line() {
        let syntax = M67Gated {
            e_num: 0,
            inline: true,
        };
        let mut out = String::new();
        syntax.power_with_motion(&mut out, "G1 Y-0.5000", 12.5);
        assert_eq!(out, "M67 E0 Q12.500 G1 Y-0.5000\n");
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(fmt_coord(1.23456789), "1.2346");
        assert_eq!(fmt_coord(-0.1), "-0.1000");
        assert_eq!(fmt_power(1000.0), "1000.000");
        assert_eq!(fmt_feed(3000.0), "3000.0");
    }
}
