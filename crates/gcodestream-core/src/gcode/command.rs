//! G-Code command value object and its completion listeners

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier for a G-Code command
pub type CommandId = String;

/// Callback invoked once when a command completes
pub type CommandCompletionListener = Arc<dyn Fn(&GcodeCommand) + Send + Sync>;

/// One line of device-directed text plus lifecycle flags
///
/// The text never changes after construction. `sent` is set when the line is
/// handed to the transport, `completed` when the firmware acknowledges it or
/// the stream is cancelled. Completion listeners run exactly once, on the
/// first completion, and are then dropped.
#[derive(Clone, Serialize, Deserialize)]
pub struct GcodeCommand {
    /// Unique identifier for this command
    pub id: CommandId,
    /// Line number in the originating program, if any
    pub line_number: Option<u32>,
    command: String,
    sent: bool,
    completed: bool,
    generated: bool,
    temporary_modal_change: bool,
    #[serde(skip)]
    listeners: Vec<CommandCompletionListener>,
}

impl GcodeCommand {
    /// Create a new G-Code command with auto-generated ID
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            id: CommandId::from(Uuid::new_v4().to_string()),
            line_number: None,
            command: command.into(),
            sent: false,
            completed: false,
            generated: false,
            temporary_modal_change: false,
            listeners: Vec::new(),
        }
    }

    /// Create a command synthesized by the controller rather than read from a program
    pub fn generated(command: impl Into<String>) -> Self {
        let mut cmd = Self::new(command);
        cmd.generated = true;
        cmd
    }

    /// Builder method to set the source line number
    pub fn with_line_number(mut self, line_number: u32) -> Self {
        self.line_number = Some(line_number);
        self
    }

    /// Builder method marking this command as a temporary modal override
    ///
    /// Unit and distance words in such a command are not folded into the
    /// tracked modal state when it is sent.
    pub fn with_temporary_modal_change(mut self) -> Self {
        self.temporary_modal_change = true;
        self
    }

    /// Register a listener fired once when this command completes
    pub fn add_listener<F>(&mut self, listener: F)
    where
        F: Fn(&GcodeCommand) + Send + Sync + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// The command text
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Length in bytes of the text as written to the wire, including newline
    pub fn wire_len(&self) -> usize {
        self.command.len() + 1
    }

    /// Check if this command has been sent
    pub fn is_sent(&self) -> bool {
        self.sent
    }

    /// Check if this command has completed
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Check if this command was synthesized by the controller
    pub fn is_generated(&self) -> bool {
        self.generated
    }

    /// Check if this command is a temporary modal override
    pub fn is_temporary_modal_change(&self) -> bool {
        self.temporary_modal_change
    }

    /// Number of listeners still waiting for completion
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Mark this command as sent
    pub fn mark_sent(&mut self) -> &mut Self {
        self.sent = true;
        self
    }

    /// Mark this command as completed and fire its listeners
    ///
    /// Listeners run only on the first call.
    pub fn mark_completed(&mut self) -> &mut Self {
        if self.completed {
            return self;
        }
        self.completed = true;
        let listeners = std::mem::take(&mut self.listeners);
        for listener in &listeners {
            listener(self);
        }
        self
    }

    /// Mark this command as completed because its stream was cancelled
    ///
    /// Listeners are dropped without being called.
    pub fn mark_canceled(&mut self) -> &mut Self {
        self.completed = true;
        self.listeners.clear();
        self
    }
}

impl Default for GcodeCommand {
    fn default() -> Self {
        Self::new("")
    }
}

impl std::fmt::Debug for GcodeCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcodeCommand")
            .field("id", &self.id)
            .field("command", &self.command)
            .field("sent", &self.sent)
            .field("completed", &self.completed)
            .field("generated", &self.generated)
            .field("temporary_modal_change", &self.temporary_modal_change)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl std::fmt::Display for GcodeCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.command)
    }
}
