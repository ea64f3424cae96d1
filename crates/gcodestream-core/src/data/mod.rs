//! Data models for positions, machine state, and status snapshots
//!
//! This module provides:
//! - Unit management (MM, INCH)
//! - Position tracking with an explicit unit
//! - Partial positions for jog requests that move only some axes
//! - The machine state enum driven by the streaming controller
//! - The communicator state derived from machine state
//! - Controller status snapshots

use crate::units;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine coordinate units (millimeters or inches)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Units {
    /// Millimeters (metric)
    MM,
    /// Inches (imperial)
    INCH,
    /// Unknown or uninitialized
    Unknown,
}

impl Units {
    /// Convert a value from one unit to another
    ///
    /// # Arguments
    /// * `value` - The value to convert
    /// * `from` - The unit of the input value
    /// * `to` - The target unit
    ///
    /// # Returns
    /// The converted value, or the original value if units are the same or unknown
    pub fn convert(value: f64, from: Units, to: Units) -> f64 {
        if from == to {
            return value;
        }

        match (from, to) {
            (Units::MM, Units::INCH) => value / units::MM_PER_INCH,
            (Units::INCH, Units::MM) => value * units::MM_PER_INCH,
            _ => value,
        }
    }

    /// The G-code word selecting this unit mode (`G21` or `G20`)
    pub fn gcode(&self) -> Option<&'static str> {
        match self {
            Units::MM => Some("G21"),
            Units::INCH => Some("G20"),
            Units::Unknown => None,
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Units::MM => write!(f, "mm"),
            Units::INCH => write!(f, "in"),
            Units::Unknown => write!(f, "unknown"),
        }
    }
}

/// Position in 3D space with the unit it is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// X-axis position
    pub x: f64,
    /// Y-axis position
    pub y: f64,
    /// Z-axis position
    pub z: f64,
    /// Unit of all three axes
    pub units: Units,
}

impl Position {
    /// Create a new position
    pub fn new(x: f64, y: f64, z: f64, units: Units) -> Self {
        Self { x, y, z, units }
    }

    /// Convert this position to a different unit
    pub fn convert_to(&self, target: Units) -> Self {
        Self {
            x: Units::convert(self.x, self.units, target),
            y: Units::convert(self.y, self.units, target),
            z: Units::convert(self.z, self.units, target),
            units: if self.units == Units::Unknown {
                self.units
            } else {
                target
            },
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0, Units::MM)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "X:{:.3} Y:{:.3} Z:{:.3} ({})",
            self.x, self.y, self.z, self.units
        )
    }
}

/// Partial position for moving only specific axes
///
/// Each axis is an `Option` where `None` means "leave this axis unchanged".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartialPosition {
    /// X-axis target (if Some)
    pub x: Option<f64>,
    /// Y-axis target (if Some)
    pub y: Option<f64>,
    /// Z-axis target (if Some)
    pub z: Option<f64>,
    /// Unit the axis values are expressed in
    pub units: Units,
}

impl PartialPosition {
    /// Create an empty partial position in the given unit
    pub fn new(units: Units) -> Self {
        Self {
            x: None,
            y: None,
            z: None,
            units,
        }
    }

    /// Create a partial position with XYZ axes set
    pub fn xyz(x: f64, y: f64, z: f64, units: Units) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            z: Some(z),
            units,
        }
    }

    /// Builder method to set the X axis
    pub fn with_x(mut self, x: f64) -> Self {
        self.x = Some(x);
        self
    }

    /// Builder method to set the Y axis
    pub fn with_y(mut self, y: f64) -> Self {
        self.y = Some(y);
        self
    }

    /// Builder method to set the Z axis
    pub fn with_z(mut self, z: f64) -> Self {
        self.z = Some(z);
        self
    }

    /// Convert the specified axes into another unit
    pub fn convert_to(&self, target: Units) -> Self {
        let conv = |v: Option<f64>| v.map(|v| Units::convert(v, self.units, target));
        Self {
            x: conv(self.x),
            y: conv(self.y),
            z: conv(self.z),
            units: target,
        }
    }

    /// Specified axes as `(letter, value)` pairs in X, Y, Z order
    pub fn axes(&self) -> impl Iterator<Item = (char, f64)> {
        [('X', self.x), ('Y', self.y), ('Z', self.z)]
            .into_iter()
            .filter_map(|(axis, v)| v.map(|v| (axis, v)))
    }

    /// Check if this partial position is empty (no axes set)
    pub fn is_empty(&self) -> bool {
        self.x.is_none() && self.y.is_none() && self.z.is_none()
    }
}

/// Machine/Controller state machine states
///
/// Exactly one value is current at any time. Transitions are applied only by
/// the streaming controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerState {
    /// Not connected to any controller
    Disconnected,
    /// Port open, waiting for the firmware to report
    Connecting,
    /// Connected and idle, ready for commands
    Idle,
    /// Executing a G-code program
    Run,
    /// Program paused, awaiting resume
    Hold,
    /// Homing cycle in progress
    Home,
    /// Manual jog in progress
    Jog,
    /// Machine alarm state (requires unlock or reset)
    Alarm,
    /// Firmware reported a state with no canonical mapping
    Unknown,
}

impl ControllerState {
    /// Check if this state indicates the controller is connected
    pub fn is_connected(&self) -> bool {
        !matches!(self, ControllerState::Disconnected)
    }

    /// Check if this state indicates an error condition
    pub fn is_error(&self) -> bool {
        matches!(self, ControllerState::Alarm)
    }

    /// Check if this state indicates active motion
    pub fn is_moving(&self) -> bool {
        matches!(
            self,
            ControllerState::Run | ControllerState::Jog | ControllerState::Home
        )
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Idle => write!(f, "Idle"),
            Self::Run => write!(f, "Run"),
            Self::Hold => write!(f, "Hold"),
            Self::Home => write!(f, "Home"),
            Self::Jog => write!(f, "Jog"),
            Self::Alarm => write!(f, "Alarm"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// State of the sending side, derived from machine state
///
/// Used by callers to decide whether new work may be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommunicatorState {
    /// Nothing is being sent
    Idle,
    /// Commands are being sent
    Sending,
    /// Sending is paused
    SendingPaused,
}

impl CommunicatorState {
    /// Derive the communicator state from the machine state and activity
    pub fn derive(state: ControllerState, active_commands: bool) -> Self {
        match state {
            ControllerState::Run | ControllerState::Jog => CommunicatorState::Sending,
            ControllerState::Hold => CommunicatorState::SendingPaused,
            ControllerState::Home if active_commands => CommunicatorState::Sending,
            _ => CommunicatorState::Idle,
        }
    }
}

impl fmt::Display for CommunicatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Sending => write!(f, "Sending"),
            Self::SendingPaused => write!(f, "SendingPaused"),
        }
    }
}

/// Snapshot of machine state and position at query time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerStatus {
    /// Current controller state
    pub state: ControllerState,
    /// Machine coordinates
    pub machine_position: Position,
    /// Work coordinates
    pub work_position: Position,
}

impl ControllerStatus {
    /// Create a new status snapshot
    pub fn new(state: ControllerState, machine_position: Position, work_position: Position) -> Self {
        Self {
            state,
            machine_position,
            work_position,
        }
    }

    /// Builder method to set the controller state
    pub fn with_state(mut self, state: ControllerState) -> Self {
        self.state = state;
        self
    }
}

impl Default for ControllerStatus {
    fn default() -> Self {
        Self::new(
            ControllerState::Disconnected,
            Position::default(),
            Position::default(),
        )
    }
}

impl fmt::Display for ControllerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} MPos[{}] WPos[{}]",
            self.state, self.machine_position, self.work_position
        )
    }
}
