//! GRBL Response Parser
//!
//! This module parses GRBL protocol responses including status reports, error messages,
//! alarm messages, settings responses, and other GRBL-specific responses.

use crate::firmware::StatusReport;
use gcodestream_core::{ControllerState, PartialPosition, Units};
use std::fmt;

/// GRBL response types
#[derive(Debug, Clone, PartialEq)]
pub enum GrblResponse {
    /// OK acknowledgment
    Ok,
    /// Error response with error code
    Error(u8),
    /// Alarm response with alarm code
    Alarm(u8),
    /// Status report, already decoded
    Status(StatusReport),
    /// Setting response ($n=value)
    Setting { number: u16, value: String },
    /// Welcome banner (e.g. `Grbl 1.1h ['$' for help]`)
    Version(String),
    /// Bracketed feedback such as `[MSG:...]` or `[GC:...]`
    Feedback(String),
    /// Startup message or other text
    Message(String),
}

impl fmt::Display for GrblResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Error(code) => write!(
                f,
                "error:{} ({})",
                code,
                GrblResponseParser::error_description(*code)
            ),
            Self::Alarm(code) => write!(
                f,
                "ALARM:{} ({})",
                code,
                GrblResponseParser::alarm_description(*code)
            ),
            Self::Status(_) => write!(f, "status"),
            Self::Setting { number, value } => write!(f, "${}={}", number, value),
            Self::Version(version) => write!(f, "{}", version),
            Self::Feedback(text) => write!(f, "{}", text),
            Self::Message(msg) => write!(f, "{}", msg),
        }
    }
}

/// GRBL response parser
#[derive(Debug, Default)]
pub struct GrblResponseParser;

impl GrblResponseParser {
    /// Create a new GRBL response parser
    pub fn new() -> Self {
        Self
    }

    /// Parse a GRBL response line
    ///
    /// `is_jogging` turns a reported `Run` into `Jog`.
    pub fn parse(&self, line: &str, is_jogging: bool) -> Option<GrblResponse> {
        let line = line.trim();

        if line.is_empty() {
            return None;
        }

        if line == "ok" {
            return Some(GrblResponse::Ok);
        }

        if let Some(code) = line
            .strip_prefix("error:")
            .and_then(|code| code.trim().parse::<u8>().ok())
        {
            return Some(GrblResponse::Error(code));
        }

        // GRBL 1.1 prints ALARM:N, 0.9 prints ALARM: Hard/soft limit
        if let Some(rest) = line
            .strip_prefix("ALARM:")
            .or_else(|| line.strip_prefix("alarm:"))
        {
            return Some(GrblResponse::Alarm(rest.trim().parse::<u8>().unwrap_or(0)));
        }

        if line.starts_with('<') && line.ends_with('>') {
            return self
                .parse_status_report(&line[1..line.len() - 1], is_jogging)
                .map(GrblResponse::Status);
        }

        if line.starts_with('$') && line.contains('=') {
            if let Some(setting) = self.parse_setting(line) {
                return Some(setting);
            }
        }

        if line.starts_with("Grbl ") {
            return Some(GrblResponse::Version(line.to_string()));
        }

        if line.starts_with('[') && line.ends_with(']') {
            return Some(GrblResponse::Feedback(line.to_string()));
        }

        Some(GrblResponse::Message(line.to_string()))
    }

    /// Parse the inside of a `<...>` status report
    fn parse_status_report(&self, status_line: &str, is_jogging: bool) -> Option<StatusReport> {
        let mut parts = status_line.split(['|', ',']).peekable();

        // GRBL 0.9 separates fields with ',' as well; re-join coordinate runs below.
        let state_field = parts.next()?.trim();
        let state_name = state_field.split(':').next().unwrap_or(state_field);

        let mut report = StatusReport::with_state(map_state(state_name, is_jogging));

        let fields: Vec<&str> = parts.collect();
        let mut i = 0;
        while i < fields.len() {
            let field = fields[i].trim();
            let target = if let Some(rest) = field.strip_prefix("MPos:") {
                Some((rest, true))
            } else {
                field.strip_prefix("WPos:").map(|rest| (rest, false))
            };

            if let Some((first, machine)) = target {
                let mut coords = vec![first];
                while coords.len() < 3 && i + 1 < fields.len() && !fields[i + 1].contains(':') {
                    i += 1;
                    coords.push(fields[i].trim());
                }
                let pos = Self::parse_position(&coords);
                if machine {
                    report.machine_position = pos;
                } else {
                    report.work_position = pos;
                }
            }
            i += 1;
        }

        Some(report)
    }

    /// Parse up to three coordinates; GRBL does not say which units it reports in
    fn parse_position(coords: &[&str]) -> Option<PartialPosition> {
        let mut values = coords.iter().map(|s| s.trim().parse::<f64>().ok());
        let pos = PartialPosition {
            x: values.next().flatten(),
            y: values.next().flatten(),
            z: values.next().flatten(),
            units: Units::Unknown,
        };
        (!pos.is_empty()).then_some(pos)
    }

    /// Parse a setting response
    fn parse_setting(&self, line: &str) -> Option<GrblResponse> {
        let (number, value) = line[1..].split_once('=')?;
        let number = number.trim().parse::<u16>().ok()?;

        Some(GrblResponse::Setting {
            number,
            value: value.trim().to_string(),
        })
    }

    /// Get error description
    pub fn error_description(code: u8) -> &'static str {
        match code {
            1 => "Expected command letter",
            2 => "Bad number format",
            3 => "Invalid statement",
            4 => "Negative value",
            5 => "Setting disabled",
            6 => "Step pulse too short",
            7 => "EEPROM read failed",
            8 => "Not idle",
            9 => "G-code locked out during alarm or jog state",
            10 => "Soft limits require homing",
            11 => "Line overflow",
            15 => "Jog target exceeds machine travel",
            16 => "Invalid jog command",
            20 => "Unsupported or invalid g-code command",
            21 => "Modal group violation",
            22 => "Undefined feed rate",
            23 => "Command requires an integer value",
            24 => "Two commands that both use axis words",
            25 => "Repeated word",
            26 => "No axis words",
            33 => "Invalid target",
            _ => "Unknown error",
        }
    }

    /// Get alarm description
    pub fn alarm_description(code: u8) -> &'static str {
        match code {
            1 => "Hard limit triggered",
            2 => "Soft limit exceeded",
            3 => "Abort during cycle",
            4 => "Probe fail",
            5 => "Probe not triggered",
            6 => "Homing fail reset",
            7 => "Homing fail door",
            8 => "Homing fail pulloff",
            9 => "Homing fail approach",
            _ => "Unknown alarm",
        }
    }
}

/// Map a GRBL state name to a machine state
pub fn map_state(name: &str, is_jogging: bool) -> ControllerState {
    match name {
        "Idle" | "Sleep" => ControllerState::Idle,
        "Run" | "Check" if is_jogging => ControllerState::Jog,
        "Run" | "Check" => ControllerState::Run,
        "Hold" | "Door" => ControllerState::Hold,
        "Jog" => ControllerState::Jog,
        "Alarm" => ControllerState::Alarm,
        "Home" => ControllerState::Home,
        _ => ControllerState::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_responses() {
        let parser = GrblResponseParser::new();
        assert_eq!(parser.parse("ok", false), Some(GrblResponse::Ok));
        assert_eq!(parser.parse("error:22", false), Some(GrblResponse::Error(22)));
        assert_eq!(parser.parse("ALARM:1", false), Some(GrblResponse::Alarm(1)));
        assert_eq!(
            parser.parse("$110=500.000", false),
            Some(GrblResponse::Setting {
                number: 110,
                value: "500.000".into()
            })
        );
        assert!(matches!(
            parser.parse("Grbl 1.1h ['$' for help]", false),
            Some(GrblResponse::Version(_))
        ));
        assert!(matches!(
            parser.parse("[MSG:'$H'|'$X' to unlock]", false),
            Some(GrblResponse::Feedback(_))
        ));
        assert_eq!(parser.parse("   ", false), None);
    }

    #[test]
    fn test_parse_status_v11() {
        let parser = GrblResponseParser::new();
        let Some(GrblResponse::Status(report)) =
            parser.parse("<Run|MPos:1.000,2.500,-3.000|FS:500,0>", false)
        else {
            panic!("expected status");
        };
        assert_eq!(report.state, Some(ControllerState::Run));
        let mpos = report.machine_position.unwrap();
        assert_eq!((mpos.x, mpos.y, mpos.z), (Some(1.0), Some(2.5), Some(-3.0)));
        assert_eq!(report.work_position, None);
    }

    #[test]
    fn test_parse_status_v09() {
        let parser = GrblResponseParser::new();
        let Some(GrblResponse::Status(report)) =
            parser.parse("<Idle,MPos:5.000,6.000,7.000,WPos:1.000,2.000,3.000>", false)
        else {
            panic!("expected status");
        };
        assert_eq!(report.state, Some(ControllerState::Idle));
        assert_eq!(report.machine_position.unwrap().z, Some(7.0));
        assert_eq!(report.work_position.unwrap().x, Some(1.0));
    }

    #[test]
    fn test_state_names() {
        assert_eq!(map_state("Door", false), ControllerState::Hold);
        assert_eq!(map_state("Check", false), ControllerState::Run);
        assert_eq!(map_state("Sleep", false), ControllerState::Idle);
        assert_eq!(map_state("Run", true), ControllerState::Jog);
        assert_eq!(map_state("Hold:0", false), ControllerState::Unknown);
        assert_eq!(map_state("Bogus", false), ControllerState::Unknown);
    }

    #[test]
    fn test_substate_is_stripped() {
        let parser = GrblResponseParser::new();
        let Some(GrblResponse::Status(report)) = parser.parse("<Hold:0|MPos:0,0,0>", false) else {
            panic!("expected status");
        };
        assert_eq!(report.state, Some(ControllerState::Hold));
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(GrblResponseParser::error_description(20), "Unsupported or invalid g-code command");
        assert_eq!(GrblResponseParser::alarm_description(1), "Hard limit triggered");
        assert_eq!(
            GrblResponse::Error(2).to_string(),
            "error:2 (Bad number format)"
        );
    }
}
