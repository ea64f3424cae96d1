//! Transport and communicator abstractions
//!
//! Two layers sit between the streaming controller and the wire:
//! - [`Transport`] moves raw bytes and delivers received lines through a
//!   callback, usually from a background reader thread.
//! - [`Communicator`] owns a transport and adds a command queue, a streamed
//!   command source, and flow control so the firmware's receive buffer is
//!   never overrun.

pub mod buffered;
pub mod serial;

use gcodestream_core::{CommandSource, FlowControl, GcodeCommand, Result};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};

pub use buffered::BufferedCommunicator;
pub use serial::{list_ports, SerialPortInfo, SerialTransport};

/// Transport backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionDriver {
    /// Serial/USB port
    Serial,
    /// In-process transport that discards writes
    Null,
}

impl std::fmt::Display for ConnectionDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serial => write!(f, "serial"),
            Self::Null => write!(f, "null"),
        }
    }
}

/// Serial parity setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SerialParity {
    /// No parity
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

/// Parameters for opening a transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Backend to use
    pub driver: ConnectionDriver,
    /// Port name (e.g. "/dev/ttyACM0", "COM3")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5-8)
    pub data_bits: u8,
    /// Stop bits (1-2)
    pub stop_bits: u8,
    /// Parity
    pub parity: SerialParity,
    /// Hardware (RTS/CTS) flow control
    pub flow_control: bool,
    /// Read timeout in milliseconds
    pub timeout_ms: u64,
}

impl ConnectionParams {
    /// Serial parameters with 8N1 framing
    pub fn serial(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            driver: ConnectionDriver::Serial,
            port: port.into(),
            baud_rate,
            ..Self::default()
        }
    }

    /// Parameters for an arbitrary driver with 8N1 framing
    pub fn new(driver: ConnectionDriver, port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            driver,
            port: port.into(),
            baud_rate,
            ..Self::default()
        }
    }

    /// Builder method to set the read timeout
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            driver: ConnectionDriver::Serial,
            port: String::new(),
            baud_rate: 115200,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
            flow_control: false,
            timeout_ms: 100,
        }
    }
}

/// Event raised by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A complete line was received, terminator stripped
    Line(String),
    /// The link failed; no further events follow
    ConnectionLost(String),
}

/// Callback through which a transport delivers events
pub type TransportCallback = Arc<dyn Fn(TransportEvent) + Send + Sync>;

/// Byte-level link to a controller
pub trait Transport: Send {
    /// Open the link and start delivering events to `callback`
    fn connect(&mut self, params: &ConnectionParams, callback: TransportCallback) -> Result<()>;

    /// Close the link; a no-op when already closed
    fn disconnect(&mut self) -> Result<()>;

    /// Check if the link is open
    fn is_connected(&self) -> bool;

    /// Write raw bytes
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Human readable name of the open port
    fn name(&self) -> String;
}

/// Transport that accepts and discards all writes
#[derive(Debug, Default)]
pub struct NoOpTransport {
    connected: bool,
    port: String,
}

impl NoOpTransport {
    /// Create a new no-op transport
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for NoOpTransport {
    fn connect(&mut self, params: &ConnectionParams, _callback: TransportCallback) -> Result<()> {
        self.connected = true;
        self.port = params.port.clone();
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn write(&mut self, _data: &[u8]) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> String {
        self.port.clone()
    }
}

/// Create the transport for a driver
pub fn create_transport(driver: ConnectionDriver) -> Box<dyn Transport> {
    match driver {
        ConnectionDriver::Serial => Box::new(SerialTransport::new()),
        ConnectionDriver::Null => Box::new(NoOpTransport::new()),
    }
}

/// Receiver of communicator events
///
/// `command_sent` is called while the communicator holds its internal lock,
/// so implementations must not call back into the communicator from it.
pub trait CommunicatorListener: Send + Sync {
    /// A line arrived from the firmware
    fn raw_response(&self, line: &str);

    /// A command was written to the transport
    fn command_sent(&self, command: &GcodeCommand);

    /// The transport failed
    fn connection_lost(&self, reason: &str);
}

/// Flow-controlled command channel to a controller
///
/// All methods take `&self`; implementations use interior mutability so one
/// communicator can be shared between the caller and the transport reader.
pub trait Communicator: Send + Sync {
    /// Open the underlying transport
    fn connect(&self, params: &ConnectionParams) -> Result<()>;

    /// Close the transport, dropping everything queued or in flight
    fn disconnect(&self) -> Result<()>;

    /// Check if the transport is open
    fn is_connected(&self) -> bool;

    /// Register the receiver of responses and send notifications
    fn set_listener(&self, listener: Weak<dyn CommunicatorListener>);

    /// Replace the flow-control policy
    fn set_flow_control(&self, flow_control: FlowControl);

    /// Active flow-control policy
    fn flow_control(&self) -> FlowControl;

    /// Append a command to the send queue without writing it
    fn queue_command(&self, command: GcodeCommand) -> Result<()>;

    /// Register a command source to drain as headroom allows
    fn queue_stream(&self, source: Box<dyn CommandSource>) -> Result<()>;

    /// Start writing queued and streamed commands, respecting flow control
    fn stream_commands(&self) -> Result<()>;

    /// Stop pulling from the command source
    fn pause_send(&self);

    /// Resume pulling from the command source
    fn resume_send(&self) -> Result<()>;

    /// Check if the command source is paused
    fn is_paused(&self) -> bool;

    /// Drop everything unsent and reset flow-control accounting
    ///
    /// Safe to call repeatedly.
    fn cancel_send(&self);

    /// Write one byte immediately, bypassing queue and flow control
    fn send_byte_immediately(&self, byte: u8) -> Result<()>;

    /// Retire the oldest in-flight command and refill from the queue
    fn acknowledge_oldest(&self) -> Option<GcodeCommand>;

    /// Commands sent but not yet acknowledged
    fn num_active_commands(&self) -> usize;

    /// Check if any command is awaiting acknowledgement
    fn are_active_commands(&self) -> bool {
        self.num_active_commands() > 0
    }

    /// Commands queued or streamed but not yet sent
    fn rows_remaining(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_params_default_framing() {
        let params = ConnectionParams::serial("/dev/ttyACM0", 115200);
        assert_eq!(params.driver, ConnectionDriver::Serial);
        assert_eq!(params.data_bits, 8);
        assert_eq!(params.stop_bits, 1);
        assert_eq!(params.parity, SerialParity::None);
    }

    #[test]
    fn test_noop_transport() {
        let mut transport = NoOpTransport::new();
        let callback: TransportCallback = Arc::new(|_| {});
        transport
            .connect(&ConnectionParams::new(ConnectionDriver::Null, "null", 0), callback)
            .unwrap();
        assert!(transport.is_connected());
        assert!(transport.write(b"G0 X1\n").is_ok());
        assert_eq!(transport.name(), "null");
        transport.disconnect().unwrap();
        assert!(!transport.is_connected());
    }
}
