//! Unit conversion and number formatting utilities
//!
//! Handles conversion between Metric (mm) and Imperial (inch) values and the
//! compact decimal formatting used in generated G-code words.

use crate::data::Units;

/// Millimeters per inch
pub const MM_PER_INCH: f64 = 25.4;

/// Decimal places kept in generated coordinates and feed rates
pub const GCODE_DECIMALS: i32 = 3;

/// Round to the G-code precision (3 decimal places)
pub fn round_gcode(value: f64) -> f64 {
    let scale = 10f64.powi(GCODE_DECIMALS);
    let rounded = (value * scale).round() / scale;
    // avoid "-0"
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Format a number for a G-code word
///
/// Rounds to 3 decimal places and trims trailing zeros, so `100.0` becomes
/// `"100"` and `3.93700787` becomes `"3.937"`.
pub fn format_gcode_number(value: f64) -> String {
    let formatted = format!("{:.*}", GCODE_DECIMALS as usize, round_gcode(value));
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Convert a value and format it for a G-code word
///
/// * `value` - Value expressed in `from`
/// * `from` - Unit of the input
/// * `to` - Unit the word is emitted in
pub fn format_converted(value: f64, from: Units, to: Units) -> String {
    format_gcode_number(Units::convert(value, from, to))
}

/// Get the unit label ("mm" or "in")
pub fn get_unit_label(units: Units) -> &'static str {
    match units {
        Units::MM => "mm",
        Units::INCH => "in",
        Units::Unknown => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_integral() {
        assert_eq!(format_gcode_number(100.0), "100");
        assert_eq!(format_gcode_number(1000.0), "1000");
        assert_eq!(format_gcode_number(0.0), "0");
    }

    #[test]
    fn test_format_rounds_to_three_places() {
        assert_eq!(format_gcode_number(3.937007874), "3.937");
        assert_eq!(format_gcode_number(39.37007874), "39.37");
        assert_eq!(format_gcode_number(0.0393700787), "0.039");
        assert_eq!(format_gcode_number(-1.5), "-1.5");
        assert_eq!(format_gcode_number(-0.0001), "0");
    }

    #[test]
    fn test_format_converted() {
        assert_eq!(format_converted(100.0, Units::MM, Units::INCH), "3.937");
        assert_eq!(format_converted(1.0, Units::INCH, Units::MM), "25.4");
        assert_eq!(format_converted(1.0, Units::MM, Units::MM), "1");
    }

    #[test]
    fn test_unit_labels() {
        assert_eq!(get_unit_label(Units::MM), "mm");
        assert_eq!(get_unit_label(Units::INCH), "in");
    }
}
