//! # gcodestream Core
//!
//! Core types, traits, and utilities for gcodestream.
//! Provides the data model, the command value object and command sources,
//! modal state tracking, listener and event plumbing, configuration, and the
//! error taxonomy shared by the communication layer.

pub mod config;
pub mod core;
pub mod data;
pub mod error;
pub mod gcode;
pub mod units;

pub use config::{ConnectionSettings, ControllerConfig, FlowControl};

pub use core::{
    ControllerEvent, ControllerListener, ControllerListenerHandle, EventDispatcher,
    ListenerRegistry, MessageLevel,
};

pub use data::{
    CommunicatorState, ControllerState, ControllerStatus, PartialPosition, Position, Units,
};

pub use error::{ConnectionError, ControllerError, Error, FirmwareError, Result};

pub use gcode::{
    CommandCompletionListener, CommandId, CommandSource, GcodeCommand, GcodeState,
    StringStreamReader,
};
