//! Firmware protocol adapters
//!
//! A [`ProtocolAdapter`] turns raw response lines into [`ResponseAction`]s
//! for the streaming controller and knows the firmware's control sequences
//! (status query, feed hold, abort, unlock). Adapters only classify; whether
//! more commands may be written is decided by the communicator's flow control.

pub mod g2core;
pub mod grbl;

use crate::communication::Communicator;
use gcodestream_core::{
    ControllerState, FlowControl, MessageLevel, PartialPosition, Result, Units,
};
use serde::{Deserialize, Serialize};

pub use g2core::G2CoreAdapter;
pub use grbl::GrblAdapter;

/// Supported firmware families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirmwareType {
    /// g2core / TinyG JSON protocol
    G2Core,
    /// GRBL text protocol
    Grbl,
}

impl std::fmt::Display for FirmwareType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::G2Core => write!(f, "g2core"),
            Self::Grbl => write!(f, "GRBL"),
        }
    }
}

impl std::str::FromStr for FirmwareType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "g2core" | "tinyg" | "g2" => Ok(Self::G2Core),
            "grbl" => Ok(Self::Grbl),
            _ => Err(format!("Unknown firmware: {}", s)),
        }
    }
}

/// Create the adapter for a firmware family
pub fn create_adapter(firmware: FirmwareType) -> Box<dyn ProtocolAdapter> {
    match firmware {
        FirmwareType::G2Core => Box::new(G2CoreAdapter::new()),
        FirmwareType::Grbl => Box::new(GrblAdapter::new()),
    }
}

/// Fields carried by one firmware status report
///
/// Firmware may report only the fields that changed; absent fields leave the
/// controller's current values untouched.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatusReport {
    /// Mapped machine state
    pub state: Option<ControllerState>,
    /// Machine coordinates
    pub machine_position: Option<PartialPosition>,
    /// Work coordinates
    pub work_position: Option<PartialPosition>,
    /// Active units
    pub units: Option<Units>,
    /// Distance mode, `true` for absolute (G90)
    pub absolute: Option<bool>,
}

impl StatusReport {
    /// Report carrying only a state
    pub fn with_state(state: ControllerState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }
}

/// What the controller should do with a response line
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseAction {
    /// Write a realtime byte immediately
    SendRealtime(u8),
    /// Queue these generated commands, then stream
    QueueCommands(Vec<String>),
    /// Apply a status report
    Status(StatusReport),
    /// The oldest outstanding command was acknowledged
    CompleteOldest,
    /// Forward a message to listeners
    Message(MessageLevel, String),
}

/// Controller state visible to an adapter while it parses a line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResponseContext {
    /// Current machine state
    pub state: ControllerState,
    /// A jog is in flight
    pub is_jogging: bool,
    /// Commands sent and not yet completed
    pub outstanding: usize,
}

impl Default for ResponseContext {
    fn default() -> Self {
        Self {
            state: ControllerState::Disconnected,
            is_jogging: false,
            outstanding: 0,
        }
    }
}

/// Firmware-specific response grammar and control sequences
pub trait ProtocolAdapter: Send + Sync {
    /// Firmware family name
    fn name(&self) -> &str;

    /// Flow control to use when the configuration does not override it
    fn default_flow_control(&self) -> FlowControl;

    /// Whether firmware status reports drive the machine state
    ///
    /// When `false` the controller moves between Idle and Run itself.
    fn reports_state(&self) -> bool {
        true
    }

    /// Called once the transport is open
    fn on_connected(&self, _comm: &dyn Communicator) -> Result<()> {
        Ok(())
    }

    /// Classify one response line
    ///
    /// An error means the line could not be parsed; the controller reports it
    /// and carries on.
    fn parse_response(&self, line: &str, ctx: &ResponseContext) -> Result<Vec<ResponseAction>>;

    /// Ask the firmware for a status report
    fn query_status(&self, comm: &dyn Communicator) -> Result<()>;

    /// Feed hold
    fn pause(&self, comm: &dyn Communicator) -> Result<()>;

    /// Resume from feed hold
    fn resume(&self, comm: &dyn Communicator) -> Result<()>;

    /// Abort sequence for a running job
    fn cancel_send(&self, comm: &dyn Communicator) -> Result<()>;

    /// Clear an alarm lock
    fn unlock(&self, comm: &dyn Communicator) -> Result<()>;

    /// Soft reset the firmware
    fn soft_reset(&self, comm: &dyn Communicator) -> Result<()>;

    /// Run the homing cycle
    fn home(&self, comm: &dyn Communicator) -> Result<()>;
}

/// Queue generated commands and start streaming them
pub(crate) fn queue_generated(comm: &dyn Communicator, commands: &[&str]) -> Result<()> {
    for command in commands {
        comm.queue_command(gcodestream_core::GcodeCommand::generated(*command))?;
    }
    comm.stream_commands()
}
