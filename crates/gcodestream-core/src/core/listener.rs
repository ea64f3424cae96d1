//! Controller listener interface and registry
//!
//! Listeners are called synchronously on whichever thread raised the event,
//! normally the transport reader thread. They must return quickly and must not
//! call blocking transport operations.

use crate::core::MessageLevel;
use crate::data::{ControllerState, ControllerStatus};
use crate::gcode::GcodeCommand;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Handle for a registered controller listener.
///
/// Uniquely identifies a listener subscription. Can be used to unsubscribe
/// from controller events.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ControllerListenerHandle(pub String);

impl ControllerListenerHandle {
    fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Listener trait for controller events
///
/// Every method defaults to a no-op.
pub trait ControllerListener: Send + Sync {
    /// Called when controller state changes
    fn on_state_changed(&self, _new_state: ControllerState) {}

    /// Called when controller status is updated
    fn on_status_changed(&self, _status: &ControllerStatus) {}

    /// Called when a command has been handed to the transport
    fn on_command_sent(&self, _command: &GcodeCommand) {}

    /// Called when a command is completed
    fn on_command_complete(&self, _command: &GcodeCommand) {}

    /// Called for operator-facing messages
    fn on_message(&self, _level: MessageLevel, _message: &str) {}

    /// Called when a program stream begins
    fn on_stream_started(&self) {}

    /// Called when every command of a stream has completed
    fn on_stream_complete(&self, _duration: Duration) {}

    /// Called when a stream is cancelled
    fn on_stream_canceled(&self) {}
}

/// Fan-out of controller events to registered listeners
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<Vec<(ControllerListenerHandle, Arc<dyn ControllerListener>)>>,
}

impl ListenerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener, returning its handle
    pub fn add(&self, listener: Arc<dyn ControllerListener>) -> ControllerListenerHandle {
        let handle = ControllerListenerHandle::new();
        self.listeners.write().push((handle.clone(), listener));
        handle
    }

    /// Unregister a listener; returns `false` if the handle was unknown
    pub fn remove(&self, handle: &ControllerListenerHandle) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(h, _)| h != handle);
        listeners.len() != before
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Check if no listeners are registered
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Call `f` on every listener in registration order
    ///
    /// The registry lock is released before any listener runs, so listeners
    /// may register or remove listeners.
    pub fn for_each<F>(&self, f: F)
    where
        F: Fn(&dyn ControllerListener),
    {
        let snapshot: Vec<Arc<dyn ControllerListener>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in snapshot {
            f(listener.as_ref());
        }
    }
}
