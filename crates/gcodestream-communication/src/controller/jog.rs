//! Jog command synthesis

use gcodestream_core::units::format_converted;
use gcodestream_core::{PartialPosition, Units};

/// Build the text of a jog command
///
/// The command forces the positioning mode (`G90` for `absolute`, else `G91`)
/// and re-states the active unit mode, then lists each given axis converted
/// from the caller's units into `active_units`, followed by the feed rate:
/// `G21G91G1X100Y100Z100F1000`.
pub fn build_jog_command(
    target: &PartialPosition,
    feed_rate: f64,
    active_units: Units,
    absolute: bool,
) -> String {
    let units = match active_units {
        Units::Unknown => Units::MM,
        known => known,
    };
    // Input with unknown units is taken as already in the active units.
    let from = match target.units {
        Units::Unknown => units,
        known => known,
    };

    let mut command = String::new();
    command.push_str(units.gcode().unwrap_or("G21"));
    command.push_str(if absolute { "G90" } else { "G91" });
    command.push_str("G1");
    for (axis, value) in target.axes() {
        command.push(axis);
        command.push_str(&format_converted(value, from, units));
    }
    command.push('F');
    command.push_str(&format_converted(feed_rate, from, units));
    command
}
