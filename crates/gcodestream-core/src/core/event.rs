//! Event system for controller communication
//!
//! Provides:
//! - Event types for controller and machine state changes
//! - Event dispatcher for publishing events to async subscribers

use crate::data::{ControllerState, ControllerStatus};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;

/// Severity of a controller message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageLevel {
    /// Informational firmware or controller output
    Info,
    /// Recoverable problem
    Warning,
    /// Firmware or protocol error
    Error,
}

impl std::fmt::Display for MessageLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageLevel::Info => write!(f, "INFO"),
            MessageLevel::Warning => write!(f, "WARNING"),
            MessageLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Controller event types
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    /// Port opened
    Connected(String),
    /// Port closed or lost
    Disconnected,
    /// Controller state changed
    StateChanged(ControllerState),
    /// Controller status changed
    StatusChanged(ControllerStatus),
    /// Command handed to the transport
    CommandSent(String),
    /// Command completed
    CommandComplete(String),
    /// Message for the operator
    Message(MessageLevel, String),
    /// Program stream started
    StreamStarted,
    /// Program stream finished after the given send duration
    StreamComplete(Duration),
    /// Program stream cancelled
    StreamCanceled,
}

impl std::fmt::Display for ControllerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerEvent::Connected(name) => write!(f, "Connected to {}", name),
            ControllerEvent::Disconnected => write!(f, "Disconnected"),
            ControllerEvent::StateChanged(state) => write!(f, "State: {}", state),
            ControllerEvent::StatusChanged(status) => write!(f, "Status: {}", status),
            ControllerEvent::CommandSent(cmd) => write!(f, "Command sent: {}", cmd),
            ControllerEvent::CommandComplete(cmd) => write!(f, "Command complete: {}", cmd),
            ControllerEvent::Message(level, msg) => write!(f, "[{}] {}", level, msg),
            ControllerEvent::StreamStarted => write!(f, "Stream started"),
            ControllerEvent::StreamComplete(duration) => {
                write!(f, "Stream complete in {:.3}s", duration.as_secs_f64())
            }
            ControllerEvent::StreamCanceled => write!(f, "Stream canceled"),
        }
    }
}

/// Event dispatcher for publishing events to subscribers
#[derive(Clone)]
pub struct EventDispatcher {
    /// Broadcast sender channel for controller events.
    tx: broadcast::Sender<ControllerEvent>,
}

impl EventDispatcher {
    /// Create a new event dispatcher
    ///
    /// # Arguments
    /// * `buffer_size` - Size of the broadcast buffer (default 100)
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer_size.max(1));
        Self { tx }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to all subscribers
    ///
    /// Having no subscribers is not an error; the event is dropped.
    pub fn publish(&self, event: ControllerEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Get number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}
