//! g2core JSON-line protocol adapter

pub mod command_creator;
pub mod response_parser;

use crate::communication::Communicator;
use crate::firmware::{
    queue_generated, ProtocolAdapter, ResponseAction, ResponseContext, StatusReport,
};
use command_creator::RealTimeCommand;
use gcodestream_core::{FlowControl, MessageLevel, Result};
use response_parser::{G2CoreResponse, G2CoreResponseParser};

/// Adapter for g2core and TinyG firmware
#[derive(Debug, Default)]
pub struct G2CoreAdapter {
    parser: G2CoreResponseParser,
}

impl G2CoreAdapter {
    /// Lines the firmware accepts before it must acknowledge one
    pub const DEFAULT_MAX_LINES: usize = 4;

    /// Create a new g2core adapter
    pub fn new() -> Self {
        Self {
            parser: G2CoreResponseParser::new(),
        }
    }

    fn status(&self, sr: &serde_json::Value, ctx: &ResponseContext) -> StatusReport {
        self.parser.parse_status_report(sr, ctx.is_jogging)
    }
}

impl ProtocolAdapter for G2CoreAdapter {
    fn name(&self) -> &str {
        "g2core"
    }

    fn default_flow_control(&self) -> FlowControl {
        FlowControl::LineCounting {
            max_lines: Self::DEFAULT_MAX_LINES,
        }
    }

    fn parse_response(&self, line: &str, ctx: &ResponseContext) -> Result<Vec<ResponseAction>> {
        let actions = match self.parser.parse(line)? {
            G2CoreResponse::SystemReady => {
                vec![ResponseAction::SendRealtime(
                    RealTimeCommand::StatusRequest.as_byte(),
                )]
            }
            G2CoreResponse::Ack => {
                vec![ResponseAction::QueueCommands(
                    command_creator::create_init_commands(),
                )]
            }
            G2CoreResponse::StatusReport(sr) => {
                vec![ResponseAction::Status(self.status(&sr, ctx))]
            }
            G2CoreResponse::Result { body, status } => {
                let mut actions = Vec::new();
                if let Some(sr) = body.get("sr") {
                    actions.push(ResponseAction::Status(self.status(sr, ctx)));
                }
                if status != 0 {
                    actions.push(ResponseAction::Message(
                        MessageLevel::Error,
                        format!("Command failed with status {}: {}", status, body),
                    ));
                }
                if ctx.outstanding > 0 {
                    actions.push(ResponseAction::CompleteOldest);
                }
                actions
            }
            G2CoreResponse::Error(msg) => vec![ResponseAction::Message(MessageLevel::Error, msg)],
            G2CoreResponse::Other(json) => {
                vec![ResponseAction::Message(MessageLevel::Info, json.to_string())]
            }
            G2CoreResponse::Text(text) => vec![ResponseAction::Message(MessageLevel::Info, text)],
        };
        Ok(actions)
    }

    fn query_status(&self, comm: &dyn Communicator) -> Result<()> {
        comm.send_byte_immediately(RealTimeCommand::StatusRequest.as_byte())
    }

    fn pause(&self, comm: &dyn Communicator) -> Result<()> {
        comm.send_byte_immediately(RealTimeCommand::FeedHold.as_byte())
    }

    fn resume(&self, comm: &dyn Communicator) -> Result<()> {
        comm.send_byte_immediately(RealTimeCommand::CycleStart.as_byte())
    }

    fn cancel_send(&self, comm: &dyn Communicator) -> Result<()> {
        comm.cancel_send();
        comm.send_byte_immediately(RealTimeCommand::KillJob.as_byte())?;
        // Kill job leaves the planner in alarm; start over from a clean slate.
        comm.cancel_send();
        queue_generated(comm, &[command_creator::KILL_ALARM_LOCK])
    }

    fn unlock(&self, comm: &dyn Communicator) -> Result<()> {
        queue_generated(comm, &[command_creator::KILL_ALARM_LOCK])
    }

    fn soft_reset(&self, comm: &dyn Communicator) -> Result<()> {
        comm.cancel_send();
        comm.send_byte_immediately(RealTimeCommand::SoftReset.as_byte())
    }

    fn home(&self, comm: &dyn Communicator) -> Result<()> {
        queue_generated(comm, &[command_creator::HOMING])
    }
}
