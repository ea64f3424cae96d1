//! Test doubles shared by the integration tests
#![allow(dead_code)]

use gcodestream_communication::{
    Communicator, CommunicatorListener, ConnectionParams, Transport, TransportCallback,
    TransportEvent,
};
use gcodestream_core::{
    CommandSource, ConnectionError, ControllerState, ControllerStatus, FlowControl, GcodeCommand,
    MessageLevel, Result,
};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;

#[derive(Default)]
struct Script {
    connected: bool,
    callback: Option<TransportCallback>,
    writes: Vec<Vec<u8>>,
    fail_writes: bool,
    /// Lines delivered from inside `write` when the written bytes match
    replies: Vec<(Vec<u8>, String)>,
}

/// Test-side handle to a [`ScriptedTransport`]
#[derive(Clone, Default)]
pub struct TransportHandle {
    script: Arc<Mutex<Script>>,
}

impl TransportHandle {
    /// Deliver a response line as if the firmware sent it
    pub fn respond(&self, line: &str) {
        let callback = self.script.lock().callback.clone();
        if let Some(callback) = callback {
            callback(TransportEvent::Line(line.to_string()));
        }
    }

    /// Report a link failure
    pub fn lose_connection(&self, reason: &str) {
        let callback = self.script.lock().callback.clone();
        if let Some(callback) = callback {
            callback(TransportEvent::ConnectionLost(reason.to_string()));
        }
    }

    /// Answer `written` with `line` as soon as it is written
    ///
    /// The reply is delivered on the writing thread before `write` returns.
    pub fn reply_to(&self, written: &[u8], line: &str) {
        self.script
            .lock()
            .replies
            .push((written.to_vec(), line.to_string()));
    }

    /// Make every following write fail
    pub fn fail_writes(&self) {
        self.script.lock().fail_writes = true;
    }

    /// Command lines written so far, newline stripped
    pub fn lines(&self) -> Vec<String> {
        self.script
            .lock()
            .writes
            .iter()
            .filter(|w| w.ends_with(b"\n"))
            .map(|w| String::from_utf8_lossy(&w[..w.len() - 1]).into_owned())
            .collect()
    }

    /// Single realtime bytes written so far
    pub fn realtime(&self) -> Vec<u8> {
        self.script
            .lock()
            .writes
            .iter()
            .filter(|w| w.len() == 1 && w[0] != b'\n')
            .map(|w| w[0])
            .collect()
    }

    pub fn is_connected(&self) -> bool {
        self.script.lock().connected
    }
}

/// Transport that records writes and replays scripted responses
pub struct ScriptedTransport {
    handle: TransportHandle,
}

impl ScriptedTransport {
    pub fn new() -> (Self, TransportHandle) {
        let handle = TransportHandle::default();
        (
            Self {
                handle: handle.clone(),
            },
            handle,
        )
    }
}

impl Transport for ScriptedTransport {
    fn connect(&mut self, _params: &ConnectionParams, callback: TransportCallback) -> Result<()> {
        let mut script = self.handle.script.lock();
        script.connected = true;
        script.callback = Some(callback);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        let mut script = self.handle.script.lock();
        script.connected = false;
        script.callback = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.handle.is_connected()
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        let reply = {
            let mut script = self.handle.script.lock();
            if script.fail_writes {
                return Err(ConnectionError::IoError {
                    reason: "broken pipe".to_string(),
                }
                .into());
            }
            script.writes.push(data.to_vec());
            let line = script
                .replies
                .iter()
                .find(|(written, _)| written.as_slice() == data)
                .map(|(_, line)| line.clone());
            line.zip(script.callback.clone())
        };
        if let Some((line, callback)) = reply {
            callback(TransportEvent::Line(line));
        }
        Ok(())
    }

    fn name(&self) -> String {
        "scripted".to_string()
    }
}

/// One call made on a [`RecordingCommunicator`]
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Connect,
    Disconnect,
    QueueCommand(String),
    QueueStream(usize),
    StreamCommands,
    PauseSend,
    ResumeSend,
    CancelSend,
    SendByte(u8),
    Acknowledge,
}

/// Communicator that records calls and sends nothing
pub struct RecordingCommunicator {
    connected: Mutex<bool>,
    calls: Mutex<Vec<Call>>,
    queued: Mutex<Vec<GcodeCommand>>,
    flow_control: Mutex<FlowControl>,
    listener: Mutex<Option<Weak<dyn CommunicatorListener>>>,
}

impl RecordingCommunicator {
    pub fn new(connected: bool) -> Arc<Self> {
        Arc::new(Self {
            connected: Mutex::new(connected),
            calls: Mutex::new(Vec::new()),
            queued: Mutex::new(Vec::new()),
            flow_control: Mutex::new(FlowControl::Disabled),
            listener: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
        self.queued.lock().clear();
    }

    /// Commands passed to `queue_command`, in order
    pub fn queued(&self) -> Vec<GcodeCommand> {
        self.queued.lock().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

impl Communicator for RecordingCommunicator {
    fn connect(&self, _params: &ConnectionParams) -> Result<()> {
        self.record(Call::Connect);
        *self.connected.lock() = true;
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        self.record(Call::Disconnect);
        *self.connected.lock() = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    fn set_listener(&self, listener: Weak<dyn CommunicatorListener>) {
        *self.listener.lock() = Some(listener);
    }

    fn set_flow_control(&self, flow_control: FlowControl) {
        *self.flow_control.lock() = flow_control;
    }

    fn flow_control(&self) -> FlowControl {
        *self.flow_control.lock()
    }

    fn queue_command(&self, command: GcodeCommand) -> Result<()> {
        self.record(Call::QueueCommand(command.command().to_string()));
        self.queued.lock().push(command);
        Ok(())
    }

    fn queue_stream(&self, source: Box<dyn CommandSource>) -> Result<()> {
        self.record(Call::QueueStream(source.size()));
        Ok(())
    }

    fn stream_commands(&self) -> Result<()> {
        self.record(Call::StreamCommands);
        Ok(())
    }

    fn pause_send(&self) {
        self.record(Call::PauseSend);
    }

    fn resume_send(&self) -> Result<()> {
        self.record(Call::ResumeSend);
        Ok(())
    }

    fn is_paused(&self) -> bool {
        false
    }

    fn cancel_send(&self) {
        self.record(Call::CancelSend);
    }

    fn send_byte_immediately(&self, byte: u8) -> Result<()> {
        self.record(Call::SendByte(byte));
        Ok(())
    }

    fn acknowledge_oldest(&self) -> Option<GcodeCommand> {
        self.record(Call::Acknowledge);
        None
    }

    fn num_active_commands(&self) -> usize {
        0
    }

    fn rows_remaining(&self) -> usize {
        0
    }
}

/// Controller listener that records every event as text
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<String>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }

    fn push(&self, event: String) {
        self.events.lock().push(event);
    }
}

impl gcodestream_core::ControllerListener for RecordingListener {
    fn on_state_changed(&self, new_state: ControllerState) {
        self.push(format!("state:{}", new_state));
    }

    fn on_status_changed(&self, status: &ControllerStatus) {
        self.push(format!("status:{}", status.state));
    }

    fn on_command_sent(&self, command: &GcodeCommand) {
        self.push(format!("sent:{}", command.command()));
    }

    fn on_command_complete(&self, command: &GcodeCommand) {
        self.push(format!("complete:{}", command.command()));
    }

    fn on_message(&self, level: MessageLevel, message: &str) {
        self.push(format!("message:{}:{}", level, message));
    }

    fn on_stream_started(&self) {
        self.push("stream:started".to_string());
    }

    fn on_stream_complete(&self, _duration: Duration) {
        self.push("stream:complete".to_string());
    }

    fn on_stream_canceled(&self) {
        self.push("stream:canceled".to_string());
    }
}
