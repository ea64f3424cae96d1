//! # gcodestream Communication
//!
//! Everything between a G-code program and the wire:
//! - [`Transport`] backends (serial, null) that move bytes and deliver lines
//! - [`BufferedCommunicator`], which queues and streams commands under
//!   flow control
//! - [`ProtocolAdapter`]s for g2core and GRBL firmware
//! - [`StreamingController`], the state machine tying them together

pub mod communication;
pub mod controller;
pub mod firmware;

pub use communication::{
    create_transport, list_ports, BufferedCommunicator, Communicator, CommunicatorListener,
    ConnectionDriver, ConnectionParams, NoOpTransport, SerialParity, SerialPortInfo,
    SerialTransport, Transport, TransportCallback, TransportEvent,
};

pub use controller::StreamingController;

pub use firmware::{
    create_adapter, FirmwareType, G2CoreAdapter, GrblAdapter, ProtocolAdapter, ResponseAction,
    ResponseContext, StatusReport,
};
