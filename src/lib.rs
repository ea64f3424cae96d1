//! # gcodestream
//!
//! Streams G-code programs to CNC motion controllers over a serial link,
//! keeping the firmware's receive buffer full without overflowing it.
//!
//! ## Architecture
//!
//! gcodestream is organized as a workspace with multiple crates:
//!
//! 1. **gcodestream-core** - Data model, commands and command sources, modal
//!    state, listeners and events, configuration, errors
//! 2. **gcodestream-communication** - Transports, the flow-controlled
//!    communicator, firmware adapters (g2core, GRBL) and the streaming
//!    controller
//! 3. **gcodestream** - Re-exports, logging setup and the command-line sender

pub use gcodestream_communication::{
    create_adapter, create_transport, list_ports, BufferedCommunicator, Communicator,
    CommunicatorListener, ConnectionDriver, ConnectionParams, FirmwareType, G2CoreAdapter,
    GrblAdapter, ProtocolAdapter, SerialParity, SerialPortInfo, SerialTransport,
    StreamingController, Transport, TransportEvent,
};

pub use gcodestream_core::{
    CommandSource, CommunicatorState, ConnectionError, ControllerConfig, ControllerError,
    ControllerEvent, ControllerListener, ControllerListenerHandle, ControllerState,
    ControllerStatus, Error, FirmwareError, FlowControl, GcodeCommand, GcodeState, MessageLevel,
    PartialPosition, Position, Result, StringStreamReader, Units,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging with the default configuration
///
/// Logs to stdout at INFO unless `RUST_LOG` says otherwise.
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .with_level(true)
        .with_thread_names(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
