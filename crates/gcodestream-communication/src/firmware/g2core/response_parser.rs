//! g2core Response Parser
//!
//! Classifies g2core JSON response lines and decodes status reports.

use crate::firmware::StatusReport;
use gcodestream_core::{ControllerState, FirmwareError, PartialPosition, Units};
use serde_json::{Map, Value};

/// Marker sent once the firmware has booted
pub const SYSTEM_READY: &str = "SYSTEM READY";

/// A classified g2core response line
#[derive(Debug, Clone, PartialEq)]
pub enum G2CoreResponse {
    /// `{"r":{"msg":"SYSTEM READY"}}`
    SystemReady,
    /// `{"ack":true}`
    Ack,
    /// Unsolicited `{"sr":{...}}`
    StatusReport(Value),
    /// `{"r":{...}}` acknowledging a command
    Result {
        /// The `r` body
        body: Value,
        /// Footer status code; 0 is success
        status: u64,
    },
    /// `{"er":{...}}`
    Error(String),
    /// Any other JSON object
    Other(Value),
    /// A line that is not JSON at all
    Text(String),
}

/// g2core response parser
#[derive(Debug, Default)]
pub struct G2CoreResponseParser;

impl G2CoreResponseParser {
    /// Create a new parser
    pub fn new() -> Self {
        Self
    }

    /// Parse one response line
    ///
    /// Lines that do not look like JSON are returned as [`G2CoreResponse::Text`];
    /// lines that look like JSON but do not parse are an error.
    pub fn parse(&self, response: &str) -> Result<G2CoreResponse, FirmwareError> {
        let trimmed = response.trim();

        if !trimmed.starts_with('{') {
            return Ok(G2CoreResponse::Text(trimmed.to_string()));
        }

        let json: Value = serde_json::from_str(trimmed)
            .map_err(|e| FirmwareError::parse(format!("{}: {}", e, trimmed)))?;
        let obj = json
            .as_object()
            .ok_or_else(|| FirmwareError::parse(format!("not a JSON object: {}", trimmed)))?;

        Ok(Self::classify(obj, &json))
    }

    fn classify(obj: &Map<String, Value>, json: &Value) -> G2CoreResponse {
        if let Some(err) = obj.get("er") {
            return G2CoreResponse::Error(Self::error_message(err));
        }

        if obj.get("ack").and_then(Value::as_bool) == Some(true) {
            return G2CoreResponse::Ack;
        }

        if let Some(sr) = obj.get("sr") {
            return G2CoreResponse::StatusReport(sr.clone());
        }

        if let Some(body) = obj.get("r") {
            if body.get("msg").and_then(Value::as_str) == Some(SYSTEM_READY) {
                return G2CoreResponse::SystemReady;
            }
            let status = obj
                .get("f")
                .and_then(|f| f.get(1))
                .and_then(Value::as_u64)
                .unwrap_or(0);
            return G2CoreResponse::Result {
                body: body.clone(),
                status,
            };
        }

        G2CoreResponse::Other(json.clone())
    }

    fn error_message(err: &Value) -> String {
        let msg = err.get("msg").and_then(Value::as_str);
        let code = err.get("st").and_then(Value::as_u64);
        match (code, msg) {
            (Some(code), Some(msg)) => format!("Error {}: {}", code, msg),
            (None, Some(msg)) => msg.to_string(),
            _ => err.to_string(),
        }
    }

    /// Decode the body of a status report
    pub fn parse_status_report(&self, sr: &Value, is_jogging: bool) -> StatusReport {
        let mut report = StatusReport::default();

        let units = sr.get("unit").and_then(Value::as_u64).map(|unit| match unit {
            0 => Units::INCH,
            _ => Units::MM,
        });
        report.units = units;

        report.absolute = sr.get("dist").and_then(Value::as_u64).map(|dist| dist == 0);

        report.state = sr
            .get("stat")
            .and_then(Value::as_i64)
            .map(|code| map_state(code, is_jogging));

        let pos_units = units.unwrap_or(Units::Unknown);
        report.work_position = Self::parse_axes(sr, ["posx", "posy", "posz"], pos_units);
        report.machine_position = Self::parse_axes(sr, ["mpox", "mpoy", "mpoz"], pos_units);

        report
    }

    fn parse_axes(sr: &Value, keys: [&str; 3], units: Units) -> Option<PartialPosition> {
        let get = |key: &str| sr.get(key).and_then(Value::as_f64);
        let pos = PartialPosition {
            x: get(keys[0]),
            y: get(keys[1]),
            z: get(keys[2]),
            units,
        };
        (!pos.is_empty()).then_some(pos)
    }
}

/// Map a g2core `stat` code to a machine state
///
/// 5 (running) reads as Jog while a jog is in flight.
pub fn map_state(code: i64, is_jogging: bool) -> ControllerState {
    match code {
        1 | 3 | 4 => ControllerState::Idle,
        2 | 7 | 8 | 11 | 12 | 13 => ControllerState::Alarm,
        5 if is_jogging => ControllerState::Jog,
        5 => ControllerState::Run,
        6 => ControllerState::Hold,
        9 => ControllerState::Home,
        10 => ControllerState::Jog,
        _ => ControllerState::Unknown,
    }
}
