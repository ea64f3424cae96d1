//! Configuration for the streaming controller
//!
//! Supports JSON and TOML files. Every field has a default, so a partial file
//! (or an empty one) is valid.
//!
//! Configuration is organized into:
//! - Controller settings (status polling, queue capacity, flow control)
//! - Connection defaults (port, baud rate, read timeout)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Flow-control policy for the communicator
///
/// Decides when the next command may be written, based on the commands that
/// have been sent but not yet acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FlowControl {
    /// Sum of unacknowledged bytes (including newline) must fit in the
    /// firmware's receive buffer
    CharacterCounting {
        /// Firmware receive buffer size in bytes
        buffer_size: usize,
    },
    /// At most `max_lines` unacknowledged commands
    LineCounting {
        /// Maximum commands in flight
        max_lines: usize,
    },
    /// One command in flight at a time
    Disabled,
}

impl FlowControl {
    /// Check whether a command of `wire_len` bytes may be sent now
    ///
    /// A command is always allowed when nothing is in flight, so a line longer
    /// than the buffer cannot stall the stream forever.
    pub fn allows(&self, active_commands: usize, active_bytes: usize, wire_len: usize) -> bool {
        if active_commands == 0 {
            return true;
        }
        match *self {
            FlowControl::CharacterCounting { buffer_size } => {
                active_bytes + wire_len <= buffer_size
            }
            FlowControl::LineCounting { max_lines } => active_commands < max_lines,
            FlowControl::Disabled => false,
        }
    }
}

impl std::fmt::Display for FlowControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CharacterCounting { buffer_size } => {
                write!(f, "character counting ({} bytes)", buffer_size)
            }
            Self::LineCounting { max_lines } => write!(f, "line counting ({} lines)", max_lines),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

/// Connection defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Serial port name, if one should be used without asking
    pub port: Option<String>,
    /// Baud rate for serial connections
    pub baud_rate: u32,
    /// Serial read timeout in milliseconds
    pub read_timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 115200,
            read_timeout_ms: 100,
        }
    }
}

/// Streaming controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Interval between status queries while connected; 0 disables polling
    pub status_poll_interval_ms: u64,
    /// Maximum number of explicitly queued commands
    pub queue_size: usize,
    /// Flow-control override; `None` uses the protocol's default
    pub flow_control: Option<FlowControl>,
    /// Capacity of the broadcast event channel
    pub event_buffer_size: usize,
    /// Connection defaults
    pub connection: ConnectionSettings,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            status_poll_interval_ms: 200,
            queue_size: 1000,
            flow_control: None,
            event_buffer_size: 100,
            connection: ConnectionSettings::default(),
        }
    }
}

impl ControllerConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::other(format!("Invalid TOML config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration from JSON text
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| Error::other(format!("Invalid JSON config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a `.toml` or `.json` file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::other(format!("Failed to read config file: {}", e)))?;

        if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_json_str(&content)
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            Self::from_toml_str(&content)
        } else {
            Err(Error::other("Config file must be .json or .toml"))
        }
    }

    /// Save configuration to a `.toml` or `.json` file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::to_string_pretty(self)
                .map_err(|e| Error::other(format!("Failed to serialize config: {}", e)))?
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            toml::to_string_pretty(self)
                .map_err(|e| Error::other(format!("Failed to serialize config: {}", e)))?
        } else {
            return Err(Error::other("Config file must be .json or .toml"));
        };

        std::fs::write(path, content)
            .map_err(|e| Error::other(format!("Failed to write config file: {}", e)))?;
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.queue_size == 0 {
            return Err(Error::other("Queue size must be > 0"));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::other("Event buffer size must be > 0"));
        }

        if self.connection.baud_rate == 0 {
            return Err(Error::other("Baud rate must be > 0"));
        }

        match self.flow_control {
            Some(FlowControl::CharacterCounting { buffer_size: 0 }) => {
                Err(Error::other("Flow control buffer size must be > 0"))
            }
            Some(FlowControl::LineCounting { max_lines: 0 }) => {
                Err(Error::other("Flow control line count must be > 0"))
            }
            _ => Ok(()),
        }
    }
}
