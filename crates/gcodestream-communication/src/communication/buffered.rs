//! Buffered communication with flow control and acknowledgment tracking
//!
//! Implements the streaming side of the protocol: an explicit command queue,
//! an incrementally drained command source, sent-buffer accounting and
//! pause/cancel handling on top of any [`Transport`].
//!
//! # Features
//! - Command queue management with a capacity limit
//! - Lazy draining of a [`CommandSource`]
//! - Flow control to prevent firmware buffer overflow
//! - FIFO acknowledgment tracking
//! - Pause/resume of the program stream
//!
//! Write failures are not retried. They tear the connection down and are
//! reported through [`CommunicatorListener::connection_lost`].

use crate::communication::{
    Communicator, CommunicatorListener, ConnectionParams, Transport, TransportCallback,
    TransportEvent,
};
use gcodestream_core::{
    CommandSource, ConnectionError, ControllerError, FlowControl, GcodeCommand, Result,
};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::collections::VecDeque;
use std::sync::{Arc, Weak};

/// Send-side bookkeeping guarded by one lock
#[derive(Default)]
struct SendState {
    connected: bool,
    /// Explicitly queued commands, sent ahead of the stream
    queue: VecDeque<GcodeCommand>,
    /// Program being streamed
    stream: Option<Box<dyn CommandSource>>,
    /// Command already pulled from the stream but not yet sent
    pending: Option<GcodeCommand>,
    /// Sent commands awaiting acknowledgment, oldest first
    active: VecDeque<GcodeCommand>,
    /// Bytes in flight (command text plus newline)
    sent_buffer_size: usize,
    paused: bool,
    /// Set by `stream_commands`, cleared by cancel/disconnect
    draining: bool,
}

impl SendState {
    fn rows_remaining(&self) -> usize {
        self.queue.len()
            + usize::from(self.pending.is_some())
            + self.stream.as_ref().map_or(0, |s| s.remaining())
    }

    fn reset(&mut self) {
        self.queue.clear();
        self.stream = None;
        self.pending = None;
        self.active.clear();
        self.sent_buffer_size = 0;
        self.paused = false;
        self.draining = false;
    }

    /// Next command to send, if flow control allows it
    ///
    /// The explicit queue goes first; the stream only when not paused.
    fn next_sendable(&mut self, flow_control: FlowControl) -> Option<GcodeCommand> {
        let allows = |state: &SendState, cmd: &GcodeCommand| {
            flow_control.allows(state.active.len(), state.sent_buffer_size, cmd.wire_len())
        };

        if let Some(front) = self.queue.front() {
            if allows(self, front) {
                return self.queue.pop_front();
            }
            return None;
        }

        if self.paused {
            return None;
        }

        if self.pending.is_none() {
            self.pending = self.stream.as_mut().and_then(|s| s.next_command());
        }

        let fits = self.pending.as_ref().is_some_and(|cmd| allows(self, cmd));
        if fits {
            self.pending.take()
        } else {
            None
        }
    }
}

struct Shared {
    state: Mutex<SendState>,
    /// Serializes listener notification: sends and response lines
    dispatch: ReentrantMutex<()>,
    transport: Mutex<Box<dyn Transport>>,
    listener: RwLock<Option<Weak<dyn CommunicatorListener>>>,
    flow_control: RwLock<FlowControl>,
    queue_size: usize,
}

impl Shared {
    fn listener(&self) -> Option<Arc<dyn CommunicatorListener>> {
        self.listener.read().as_ref().and_then(Weak::upgrade)
    }

    /// Write everything flow control allows, returning the commands written
    fn write_sendable(
        &self,
        state: &mut SendState,
    ) -> std::result::Result<Vec<GcodeCommand>, String> {
        let mut sent = Vec::new();
        if !state.connected || !state.draining {
            return Ok(sent);
        }

        let flow_control = *self.flow_control.read();
        while let Some(mut command) = state.next_sendable(flow_control) {
            let mut line = command.command().to_string();
            line.push('\n');

            if let Err(e) = self.transport.lock().write(line.as_bytes()) {
                tracing::error!("Failed to send command '{}': {}", command.command(), e);
                return Err(e.to_string());
            }
            tracing::debug!(">> {}", command.command());

            command.mark_sent();
            state.sent_buffer_size += command.wire_len();
            state.active.push_back(command.clone());
            sent.push(command);
        }

        Ok(sent)
    }

    /// Send what flow control allows and report it to the listener
    ///
    /// The listener is called with the state lock released. `dispatch` stays
    /// held so a response line is not handled between a write and the
    /// matching `command_sent`.
    fn drain(&self) -> std::result::Result<(), String> {
        let _dispatch = self.dispatch.lock();
        let sent = {
            let mut state = self.state.lock();
            self.write_sendable(&mut state)?
        };
        if sent.is_empty() {
            return Ok(());
        }
        if let Some(listener) = self.listener() {
            for command in &sent {
                listener.command_sent(command);
            }
        }
        Ok(())
    }

    /// Drop all state after a transport failure and tell the listener
    fn connection_failed(&self, reason: &str) {
        {
            let mut state = self.state.lock();
            if !state.connected {
                return;
            }
            state.reset();
            state.connected = false;
        }
        tracing::error!("Connection lost: {}", reason);
        if let Err(e) = self.transport.lock().disconnect() {
            tracing::warn!("Error closing transport after failure: {}", e);
        }
        if let Some(listener) = self.listener() {
            listener.connection_lost(reason);
        }
    }

    fn handle_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Line(line) => {
                let _dispatch = self.dispatch.lock();
                if !self.state.lock().connected {
                    return;
                }
                tracing::debug!("<< {}", line);
                if let Some(listener) = self.listener() {
                    listener.raw_response(&line);
                }
            }
            TransportEvent::ConnectionLost(reason) => self.connection_failed(&reason),
        }
    }
}

/// Flow-controlled communicator over any [`Transport`]
pub struct BufferedCommunicator {
    shared: Arc<Shared>,
}

impl BufferedCommunicator {
    /// Default maximum number of explicitly queued commands
    pub const DEFAULT_QUEUE_SIZE: usize = 1000;

    /// Create a communicator over `transport`
    pub fn new(transport: Box<dyn Transport>, flow_control: FlowControl) -> Self {
        Self::with_queue_size(transport, flow_control, Self::DEFAULT_QUEUE_SIZE)
    }

    /// Create a communicator with an explicit queue capacity
    pub fn with_queue_size(
        transport: Box<dyn Transport>,
        flow_control: FlowControl,
        queue_size: usize,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SendState::default()),
                dispatch: ReentrantMutex::new(()),
                transport: Mutex::new(transport),
                listener: RwLock::new(None),
                flow_control: RwLock::new(flow_control),
                queue_size,
            }),
        }
    }

    /// Get the number of queued, unsent commands
    pub fn queued_commands_count(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Bytes currently in flight
    pub fn sent_buffer_size(&self) -> usize {
        self.shared.state.lock().sent_buffer_size
    }

    /// Get the current buffer usage as a percentage (character counting only)
    pub fn buffer_usage_percent(&self) -> u32 {
        match *self.shared.flow_control.read() {
            FlowControl::CharacterCounting { buffer_size } if buffer_size > 0 => {
                let used = self.sent_buffer_size();
                ((used as f64 / buffer_size as f64) * 100.0) as u32
            }
            _ => 0,
        }
    }

    fn drain(&self) -> Result<()> {
        self.shared.drain().map_err(|reason| {
            self.shared.connection_failed(&reason);
            ConnectionError::ConnectionLost { reason }.into()
        })
    }
}

impl Communicator for BufferedCommunicator {
    fn connect(&self, params: &ConnectionParams) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.connected {
            return Err(ConnectionError::AlreadyOpen {
                port: params.port.clone(),
            }
            .into());
        }

        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let callback: TransportCallback = Arc::new(move |event| {
            if let Some(shared) = weak.upgrade() {
                shared.handle_transport_event(event);
            }
        });

        // Hold the state lock so lines arriving during connect are not dropped.
        self.shared.transport.lock().connect(params, callback)?;
        state.reset();
        state.connected = true;
        tracing::info!("Connected to {} at {} baud", params.port, params.baud_rate);
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            if !state.connected {
                return Ok(());
            }
            state.reset();
            state.connected = false;
        }
        self.shared.transport.lock().disconnect()?;
        tracing::info!("Disconnected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.shared.state.lock().connected
    }

    fn set_listener(&self, listener: Weak<dyn CommunicatorListener>) {
        *self.shared.listener.write() = Some(listener);
    }

    fn set_flow_control(&self, flow_control: FlowControl) {
        tracing::debug!("Flow control: {}", flow_control);
        *self.shared.flow_control.write() = flow_control;
    }

    fn flow_control(&self) -> FlowControl {
        *self.shared.flow_control.read()
    }

    fn queue_command(&self, command: GcodeCommand) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.queue.len() >= self.shared.queue_size {
            return Err(ControllerError::QueueFull {
                capacity: self.shared.queue_size,
            }
            .into());
        }
        state.queue.push_back(command);
        Ok(())
    }

    fn queue_stream(&self, source: Box<dyn CommandSource>) -> Result<()> {
        let mut state = self.shared.state.lock();
        let busy = state.pending.is_some()
            || state.stream.as_ref().is_some_and(|s| s.remaining() > 0);
        if busy {
            return Err(ControllerError::StreamAlreadyActive.into());
        }
        tracing::debug!("Queued stream of {} commands", source.size());
        state.stream = Some(source);
        Ok(())
    }

    fn stream_commands(&self) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            if !state.connected {
                return Err(ConnectionError::NotConnected.into());
            }
            state.draining = true;
        }
        self.drain()
    }

    fn pause_send(&self) {
        self.shared.state.lock().paused = true;
    }

    fn resume_send(&self) -> Result<()> {
        self.shared.state.lock().paused = false;
        self.drain()
    }

    fn is_paused(&self) -> bool {
        self.shared.state.lock().paused
    }

    fn cancel_send(&self) {
        let mut state = self.shared.state.lock();
        let dropped = state.rows_remaining() + state.active.len();
        state.reset();
        if dropped > 0 {
            tracing::info!("Send cancelled, dropped {} commands", dropped);
        }
    }

    fn send_byte_immediately(&self, byte: u8) -> Result<()> {
        if !self.is_connected() {
            return Err(ConnectionError::NotConnected.into());
        }
        tracing::debug!(">> 0x{:02X}", byte);
        let result = self.shared.transport.lock().write(&[byte]);
        if let Err(e) = result {
            let reason = e.to_string();
            self.shared.connection_failed(&reason);
            return Err(ConnectionError::ConnectionLost { reason }.into());
        }
        Ok(())
    }

    fn acknowledge_oldest(&self) -> Option<GcodeCommand> {
        let _dispatch = self.shared.dispatch.lock();
        let acked = {
            let mut state = self.shared.state.lock();
            let acked = state.active.pop_front();
            if let Some(cmd) = &acked {
                state.sent_buffer_size = state.sent_buffer_size.saturating_sub(cmd.wire_len());
            }
            acked
        };
        if let Err(reason) = self.shared.drain() {
            self.shared.connection_failed(&reason);
        }
        acked
    }

    fn num_active_commands(&self) -> usize {
        self.shared.state.lock().active.len()
    }

    fn rows_remaining(&self) -> usize {
        self.shared.state.lock().rows_remaining()
    }
}

impl Drop for BufferedCommunicator {
    fn drop(&mut self) {
        if let Err(e) = self.shared.transport.lock().disconnect() {
            tracing::warn!("Error closing transport: {}", e);
        }
    }
}
