//! GRBL text-line protocol adapter

pub mod response_parser;

use crate::communication::Communicator;
use crate::firmware::{queue_generated, ProtocolAdapter, ResponseAction, ResponseContext, StatusReport};
use gcodestream_core::{ControllerState, FirmwareError, FlowControl, MessageLevel, Result};
use response_parser::{GrblResponse, GrblResponseParser};

/// GRBL realtime command bytes
pub mod realtime {
    /// Status query
    pub const STATUS_QUERY: u8 = b'?';
    /// Feed hold
    pub const FEED_HOLD: u8 = b'!';
    /// Cycle start / resume
    pub const CYCLE_START: u8 = b'~';
    /// Soft reset (Ctrl-X)
    pub const SOFT_RESET: u8 = 0x18;
}

/// Clears an alarm lock
pub const KILL_ALARM_LOCK: &str = "$X";

/// Runs the homing cycle
pub const HOMING: &str = "$H";

/// Adapter for GRBL firmware
#[derive(Debug, Default)]
pub struct GrblAdapter {
    parser: GrblResponseParser,
}

impl GrblAdapter {
    /// GRBL's serial receive buffer in bytes
    pub const RX_BUFFER_SIZE: usize = 128;

    /// Create a new GRBL adapter
    pub fn new() -> Self {
        Self {
            parser: GrblResponseParser::new(),
        }
    }
}

impl ProtocolAdapter for GrblAdapter {
    fn name(&self) -> &str {
        "GRBL"
    }

    fn default_flow_control(&self) -> FlowControl {
        FlowControl::CharacterCounting {
            buffer_size: Self::RX_BUFFER_SIZE,
        }
    }

    fn on_connected(&self, comm: &dyn Communicator) -> Result<()> {
        comm.send_byte_immediately(realtime::STATUS_QUERY)
    }

    fn parse_response(&self, line: &str, ctx: &ResponseContext) -> Result<Vec<ResponseAction>> {
        let response = self
            .parser
            .parse(line, ctx.is_jogging)
            .ok_or_else(|| FirmwareError::parse("empty response line"))?;

        let actions = match response {
            GrblResponse::Ok => vec![ResponseAction::CompleteOldest],
            GrblResponse::Error(_) => vec![
                ResponseAction::Message(MessageLevel::Error, response.to_string()),
                ResponseAction::CompleteOldest,
            ],
            GrblResponse::Alarm(_) => vec![
                ResponseAction::Status(StatusReport::with_state(ControllerState::Alarm)),
                ResponseAction::Message(MessageLevel::Error, response.to_string()),
            ],
            GrblResponse::Status(report) => vec![ResponseAction::Status(report)],
            GrblResponse::Version(banner) => vec![
                ResponseAction::Message(MessageLevel::Info, banner),
                ResponseAction::SendRealtime(realtime::STATUS_QUERY),
            ],
            GrblResponse::Setting { .. } | GrblResponse::Feedback(_) | GrblResponse::Message(_) => {
                vec![ResponseAction::Message(MessageLevel::Info, response.to_string())]
            }
        };
        Ok(actions)
    }

    fn query_status(&self, comm: &dyn Communicator) -> Result<()> {
        comm.send_byte_immediately(realtime::STATUS_QUERY)
    }

    fn pause(&self, comm: &dyn Communicator) -> Result<()> {
        comm.send_byte_immediately(realtime::FEED_HOLD)
    }

    fn resume(&self, comm: &dyn Communicator) -> Result<()> {
        comm.send_byte_immediately(realtime::CYCLE_START)
    }

    fn cancel_send(&self, comm: &dyn Communicator) -> Result<()> {
        comm.cancel_send();
        comm.send_byte_immediately(realtime::SOFT_RESET)
    }

    fn unlock(&self, comm: &dyn Communicator) -> Result<()> {
        queue_generated(comm, &[KILL_ALARM_LOCK])
    }

    fn soft_reset(&self, comm: &dyn Communicator) -> Result<()> {
        comm.cancel_send();
        comm.send_byte_immediately(realtime::SOFT_RESET)
    }

    fn home(&self, comm: &dyn Communicator) -> Result<()> {
        queue_generated(comm, &[HOMING])
    }
}
