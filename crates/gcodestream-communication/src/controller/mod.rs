//! Streaming controller
//!
//! [`StreamingController`] owns the canonical machine state, the FIFO of
//! commands that were written but not yet acknowledged, and stream lifecycle
//! (begin, pause, resume, cancel, completion timing). Firmware-specific
//! behaviour is delegated to a [`ProtocolAdapter`]; bytes move through a
//! [`Communicator`].
//!
//! # Locking
//!
//! The controller never calls into the communicator while holding its state
//! lock. The communicator reports sends and responses with its own locks
//! released, and listeners run with no controller lock held.

pub mod jog;
pub mod poller;

use crate::communication::{
    create_transport, BufferedCommunicator, Communicator, CommunicatorListener, ConnectionDriver,
    ConnectionParams,
};
use crate::firmware::{
    create_adapter, FirmwareType, ProtocolAdapter, ResponseAction, ResponseContext, StatusReport,
};
use gcodestream_core::{
    CommandSource, CommunicatorState, ConnectionError, ControllerConfig, ControllerError,
    ControllerEvent, ControllerListener, ControllerListenerHandle, ControllerState,
    ControllerStatus, EventDispatcher, GcodeCommand, GcodeState, ListenerRegistry, MessageLevel,
    PartialPosition, Position, Result, Units,
};
use parking_lot::Mutex;
use poller::StatusPoller;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// Mutable controller state, guarded by one lock
struct ControllerInner {
    state: ControllerState,
    status: ControllerStatus,
    gcode_state: GcodeState,
    /// Commands written to the transport and not yet completed, oldest first
    outstanding: VecDeque<GcodeCommand>,
    is_jogging: bool,
    /// Source waiting for `begin_streaming`
    queued_stream: Option<Box<dyn CommandSource>>,
    streaming: bool,
    canceling: bool,
    stream_start: Option<Instant>,
    /// Set when the stream finishes or is cancelled; freezes the send duration
    stream_end: Option<Instant>,
}

impl ControllerInner {
    fn new() -> Self {
        Self {
            state: ControllerState::Disconnected,
            status: ControllerStatus::default(),
            gcode_state: GcodeState::new(),
            outstanding: VecDeque::new(),
            is_jogging: false,
            queued_stream: None,
            streaming: false,
            canceling: false,
            stream_start: None,
            stream_end: None,
        }
    }

    /// Returns `true` if the state actually changed
    fn transition(&mut self, state: ControllerState) -> bool {
        if self.state == state {
            return false;
        }
        self.state = state;
        self.status.state = state;
        true
    }

    /// Drop all in-flight bookkeeping, returning the dropped commands
    fn clear_outstanding(&mut self) -> Vec<GcodeCommand> {
        self.is_jogging = false;
        self.outstanding.drain(..).collect()
    }

    fn freeze_duration(&mut self) {
        if self.stream_start.is_some() && self.stream_end.is_none() {
            self.stream_end = Some(Instant::now());
        }
    }
}

/// Merge reported axes into a full position
fn merge_position(current: &mut Position, reported: &PartialPosition, fallback: Units) {
    if let Some(x) = reported.x {
        current.x = x;
    }
    if let Some(y) = reported.y {
        current.y = y;
    }
    if let Some(z) = reported.z {
        current.z = z;
    }
    current.units = match reported.units {
        Units::Unknown => fallback,
        units => units,
    };
}

/// Command putting the firmware back into the modal state `state` tracks
fn restore_modal_command(state: &GcodeState) -> String {
    let distance = if state.is_absolute() { "G90" } else { "G91" };
    format!("{}{}", state.units_code(), distance)
}

/// Streams G-code to a controller and tracks its state
pub struct StreamingController {
    comm: Arc<dyn Communicator>,
    adapter: Box<dyn ProtocolAdapter>,
    config: ControllerConfig,
    inner: Mutex<ControllerInner>,
    listeners: ListenerRegistry,
    events: EventDispatcher,
    poller: Mutex<Option<StatusPoller>>,
    this: Weak<StreamingController>,
}

impl StreamingController {
    /// Create a controller over `comm`, speaking the protocol of `adapter`
    ///
    /// The controller registers itself as the communicator's listener.
    pub fn new(
        comm: Arc<dyn Communicator>,
        adapter: Box<dyn ProtocolAdapter>,
        config: ControllerConfig,
    ) -> Arc<Self> {
        let events = EventDispatcher::new(config.event_buffer_size.max(1));
        let controller = Arc::new_cyclic(|this| Self {
            comm,
            adapter,
            config,
            inner: Mutex::new(ControllerInner::new()),
            listeners: ListenerRegistry::new(),
            events,
            poller: Mutex::new(None),
            this: this.clone(),
        });

        let listener: Weak<dyn CommunicatorListener> = controller.this.clone();
        controller.comm.set_listener(listener);
        controller
    }

    /// Create a controller for `firmware` over a buffered communicator using `driver`
    pub fn for_firmware(
        firmware: FirmwareType,
        driver: ConnectionDriver,
        config: ControllerConfig,
    ) -> Arc<Self> {
        let adapter = create_adapter(firmware);
        let flow_control = config
            .flow_control
            .unwrap_or_else(|| adapter.default_flow_control());
        let comm = Arc::new(BufferedCommunicator::with_queue_size(
            create_transport(driver),
            flow_control,
            config.queue_size,
        ));
        Self::new(comm, adapter, config)
    }

    /// Name of the firmware protocol in use
    pub fn firmware_name(&self) -> &str {
        self.adapter.name()
    }

    // ---------------------------------------------------------------------
    // Connection
    // ---------------------------------------------------------------------

    /// Open the transport with default framing
    pub fn open_comm_port(&self, driver: ConnectionDriver, port: &str, baud_rate: u32) -> Result<()> {
        self.open_comm_port_with(&ConnectionParams::new(driver, port, baud_rate))
    }

    /// Open the transport
    ///
    /// The machine state moves to Connecting; it becomes Idle (or whatever
    /// the firmware reports) once the first status arrives.
    pub fn open_comm_port_with(&self, params: &ConnectionParams) -> Result<()> {
        if self.comm.is_connected() {
            return Err(ConnectionError::AlreadyOpen {
                port: params.port.clone(),
            }
            .into());
        }

        self.dispatch_message(
            MessageLevel::Info,
            format!(
                "Connecting to {} @ {} baud ({})",
                params.port,
                params.baud_rate,
                self.adapter.name()
            ),
        );
        {
            let mut inner = self.inner.lock();
            inner.clear_outstanding();
            inner.streaming = false;
            inner.stream_start = None;
            inner.stream_end = None;
        }
        self.set_state(ControllerState::Connecting);

        let flow_control = self
            .config
            .flow_control
            .unwrap_or_else(|| self.adapter.default_flow_control());
        self.comm.set_flow_control(flow_control);

        if let Err(e) = self.comm.connect(params) {
            tracing::warn!("Failed to open {}: {}", params.port, e);
            self.set_state(ControllerState::Disconnected);
            return Err(e);
        }

        tracing::info!("Opened {} using {}", params.port, flow_control);
        self.events
            .publish(ControllerEvent::Connected(params.port.clone()));

        if !self.adapter.reports_state() {
            self.set_state(ControllerState::Idle);
        }
        if let Err(e) = self.adapter.on_connected(self.comm.as_ref()) {
            tracing::warn!("Connection setup failed: {}", e);
            self.dispatch_message(MessageLevel::Warning, format!("Connection setup failed: {}", e));
        }
        self.start_status_poller();
        Ok(())
    }

    /// Close the transport
    ///
    /// Any running stream is cancelled and unsent commands are dropped. Does
    /// nothing when already closed.
    pub fn close_comm_port(&self) -> Result<()> {
        let connected = self.comm.is_connected();
        if !connected && self.get_controller_state() == ControllerState::Disconnected {
            return Ok(());
        }

        self.stop_status_poller();
        let (dropped, was_streaming) = {
            let mut inner = self.inner.lock();
            let was_streaming = inner.streaming;
            inner.streaming = false;
            inner.queued_stream = None;
            inner.stream_start = None;
            inner.stream_end = None;
            (inner.clear_outstanding(), was_streaming)
        };
        Self::cancel_commands(dropped);

        self.comm.cancel_send();
        let result = self.comm.disconnect();

        if was_streaming {
            self.notify_stream_canceled();
        }
        self.set_state(ControllerState::Disconnected);
        self.events.publish(ControllerEvent::Disconnected);
        self.dispatch_message(MessageLevel::Info, "Connection closed");
        result
    }

    /// Check if the transport is open
    pub fn is_comm_open(&self) -> bool {
        self.comm.is_connected()
    }

    // ---------------------------------------------------------------------
    // Streaming
    // ---------------------------------------------------------------------

    /// Hold a command source until [`begin_streaming`](Self::begin_streaming)
    ///
    /// Replaces a previously queued source that has not been started.
    pub fn queue_stream(&self, source: Box<dyn CommandSource>) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.streaming {
            return Err(ControllerError::StreamAlreadyActive.into());
        }
        tracing::debug!("Queued stream of {} commands", source.size());
        inner.queued_stream = Some(source);
        Ok(())
    }

    /// Start streaming the queued source
    pub fn begin_streaming(&self) -> Result<()> {
        if !self.comm.is_connected() {
            return Err(ControllerError::not_ready("port is not open").into());
        }

        let source = {
            let mut inner = self.inner.lock();
            if inner.streaming {
                return Err(ControllerError::StreamAlreadyActive.into());
            }
            if inner.state == ControllerState::Alarm {
                return Err(ControllerError::AlarmActive.into());
            }
            let source = inner
                .queued_stream
                .take()
                .ok_or(ControllerError::NoStreamQueued)?;
            inner.streaming = true;
            inner.is_jogging = false;
            inner.stream_start = Some(Instant::now());
            inner.stream_end = None;
            source
        };

        tracing::info!("Streaming {} commands", source.size());
        self.listeners.for_each(|l| l.on_stream_started());
        self.events.publish(ControllerEvent::StreamStarted);

        let started = self
            .comm
            .queue_stream(source)
            .and_then(|_| self.comm.stream_commands());
        if let Err(e) = started {
            let mut inner = self.inner.lock();
            inner.streaming = false;
            inner.freeze_duration();
            return Err(e);
        }

        if !self.adapter.reports_state() {
            self.set_state(ControllerState::Run);
        }
        // An empty source finishes immediately.
        self.check_stream_finished();
        Ok(())
    }

    /// Request a feed hold
    pub fn pause_streaming(&self) -> Result<()> {
        self.require_connected()?;
        self.adapter.pause(self.comm.as_ref())?;
        self.comm.pause_send();
        self.dispatch_message(MessageLevel::Info, "Pausing");
        if !self.adapter.reports_state() {
            self.set_state(ControllerState::Hold);
        }
        Ok(())
    }

    /// Resume after a feed hold
    pub fn resume_streaming(&self) -> Result<()> {
        self.require_connected()?;
        if self.get_controller_state() == ControllerState::Alarm {
            return Err(ControllerError::AlarmActive.into());
        }
        self.adapter.resume(self.comm.as_ref())?;
        self.comm.resume_send()?;
        self.dispatch_message(MessageLevel::Info, "Resuming");
        if !self.adapter.reports_state() && self.is_streaming() {
            self.set_state(ControllerState::Run);
        }
        Ok(())
    }

    /// Abort the running stream
    ///
    /// Runs the firmware abort sequence, then resets the in-flight accounting
    /// once and queries status. After this returns no command of the cancelled
    /// stream is sent and responses caused by the abort match nothing.
    pub fn cancel_send(&self) -> Result<()> {
        // Responses to the abort sequence must not complete dropped commands.
        let (dropped, was_streaming) = {
            let mut inner = self.inner.lock();
            inner.canceling = true;
            let was_streaming = inner.streaming;
            inner.streaming = false;
            inner.freeze_duration();
            (inner.clear_outstanding(), was_streaming)
        };
        if !dropped.is_empty() {
            tracing::info!("Cancelled {} outstanding commands", dropped.len());
        }
        Self::cancel_commands(dropped);

        let result = if self.comm.is_connected() {
            self.adapter.cancel_send(self.comm.as_ref())
        } else {
            Ok(())
        };
        self.comm.cancel_send();

        // The communicator was reset, so commands of the abort sequence are gone too.
        let aborted = {
            let mut inner = self.inner.lock();
            inner.canceling = false;
            inner.clear_outstanding()
        };
        Self::cancel_commands(aborted);

        if was_streaming {
            self.notify_stream_canceled();
        }
        if self.comm.is_connected() {
            if let Err(e) = self.adapter.query_status(self.comm.as_ref()) {
                tracing::warn!("Status query after cancel failed: {}", e);
            }
        }
        if !self.adapter.reports_state() && self.comm.is_connected() {
            self.set_state(ControllerState::Idle);
        }
        result
    }

    /// Check if a stream is running
    pub fn is_streaming(&self) -> bool {
        self.inner.lock().streaming
    }

    /// Commands queued or streamed but not yet sent
    pub fn rows_remaining(&self) -> usize {
        self.comm.rows_remaining()
    }

    /// Time spent on the current or last stream
    ///
    /// Zero before any stream; frozen once the stream completes or is
    /// cancelled.
    pub fn get_send_duration(&self) -> Duration {
        let inner = self.inner.lock();
        match (inner.stream_start, inner.stream_end) {
            (None, _) => Duration::ZERO,
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            (Some(start), None) => start.elapsed(),
        }
    }

    // ---------------------------------------------------------------------
    // Command bookkeeping
    // ---------------------------------------------------------------------

    /// Record that `command` was written to the transport
    ///
    /// A temporary modal change is followed by a generated command putting
    /// the firmware back into the tracked units and positioning mode.
    pub fn command_sent(&self, command: &GcodeCommand) {
        let restore = {
            let mut inner = self.inner.lock();
            inner.outstanding.push_back(command.clone());
            if command.is_temporary_modal_change() {
                Some(restore_modal_command(&inner.gcode_state))
            } else {
                inner.gcode_state.apply(command.command());
                None
            }
        };
        self.listeners.for_each(|l| l.on_command_sent(command));
        self.events
            .publish(ControllerEvent::CommandSent(command.command().to_string()));

        if let Some(text) = restore {
            tracing::debug!("Restoring modal state: {}", text);
            let queued = self
                .comm
                .queue_command(GcodeCommand::generated(text))
                .and_then(|_| self.comm.stream_commands());
            if let Err(e) = queued {
                tracing::warn!("Failed to restore modal state: {}", e);
                self.dispatch_message(
                    MessageLevel::Warning,
                    format!("Failed to restore modal state: {}", e),
                );
            }
        }
    }

    /// Complete the oldest outstanding command whose text is `command`
    ///
    /// Unmatched text is ignored.
    pub fn command_complete(&self, command: &str) {
        let matched = {
            let mut inner = self.inner.lock();
            if inner.canceling {
                tracing::debug!("Ignoring completion of '{}' during cancel", command);
                return;
            }
            inner
                .outstanding
                .iter()
                .position(|c| c.command() == command)
                .and_then(|i| inner.outstanding.remove(i))
        };

        match matched {
            Some(cmd) => {
                self.comm.acknowledge_oldest();
                self.finish_command(cmd);
            }
            None => tracing::debug!("No outstanding command matches '{}'", command),
        }
    }

    /// Complete the oldest outstanding command
    fn complete_oldest(&self) {
        let front = {
            let mut inner = self.inner.lock();
            if inner.canceling {
                tracing::debug!("Ignoring acknowledgement during cancel");
                return;
            }
            inner.outstanding.pop_front()
        };
        let acknowledged = self.comm.acknowledge_oldest();

        match front.or(acknowledged) {
            Some(cmd) => self.finish_command(cmd),
            None => {
                let err = ControllerError::FlowControlViolation {
                    acknowledged: 1,
                    outstanding: 0,
                };
                tracing::warn!("{}", err);
                self.dispatch_message(MessageLevel::Warning, err.to_string());
                if let Err(e) = self.adapter.query_status(self.comm.as_ref()) {
                    tracing::debug!("Resync status query failed: {}", e);
                }
            }
        }
    }

    fn finish_command(&self, mut command: GcodeCommand) {
        command.mark_completed();
        tracing::trace!("Completed '{}'", command.command());
        self.listeners.for_each(|l| l.on_command_complete(&command));
        self.events
            .publish(ControllerEvent::CommandComplete(command.command().to_string()));
        self.check_stream_finished();
    }

    fn cancel_commands(commands: Vec<GcodeCommand>) {
        for mut command in commands {
            command.mark_canceled();
        }
    }

    /// Finish the stream once nothing is left to send or acknowledge
    fn check_stream_finished(&self) {
        if self.comm.num_active_commands() > 0 || self.comm.rows_remaining() > 0 {
            return;
        }

        let duration = {
            let mut inner = self.inner.lock();
            if !inner.streaming || !inner.outstanding.is_empty() {
                return;
            }
            inner.streaming = false;
            inner.freeze_duration();
            match (inner.stream_start, inner.stream_end) {
                (Some(start), Some(end)) => end.saturating_duration_since(start),
                _ => Duration::ZERO,
            }
        };

        tracing::info!("Stream complete in {:.3}s", duration.as_secs_f64());
        self.listeners.for_each(|l| l.on_stream_complete(duration));
        self.events.publish(ControllerEvent::StreamComplete(duration));
        if !self.adapter.reports_state() {
            self.set_state(ControllerState::Idle);
        }
    }

    // ---------------------------------------------------------------------
    // Responses
    // ---------------------------------------------------------------------

    /// Interpret one response line from the firmware
    ///
    /// Unparseable lines are reported as messages; nothing is returned to the
    /// caller.
    pub fn raw_response_handler(&self, line: &str) {
        let ctx = {
            let inner = self.inner.lock();
            ResponseContext {
                state: inner.state,
                is_jogging: inner.is_jogging,
                outstanding: inner.outstanding.len(),
            }
        };

        match self.adapter.parse_response(line, &ctx) {
            Ok(actions) => {
                for action in actions {
                    self.apply_action(action);
                }
            }
            Err(e) => {
                tracing::warn!("Unparseable response '{}': {}", line, e);
                self.dispatch_message(MessageLevel::Error, format!("{} ({})", e, line));
            }
        }
    }

    fn apply_action(&self, action: ResponseAction) {
        match action {
            ResponseAction::SendRealtime(byte) => {
                if let Err(e) = self.comm.send_byte_immediately(byte) {
                    tracing::warn!("Failed to send realtime 0x{:02X}: {}", byte, e);
                }
            }
            ResponseAction::QueueCommands(commands) => {
                let queued = commands
                    .into_iter()
                    .try_for_each(|c| self.comm.queue_command(GcodeCommand::generated(c)))
                    .and_then(|_| self.comm.stream_commands());
                if let Err(e) = queued {
                    tracing::warn!("Failed to send setup commands: {}", e);
                }
            }
            ResponseAction::Status(report) => self.apply_status(report),
            ResponseAction::CompleteOldest => self.complete_oldest(),
            ResponseAction::Message(level, text) => self.dispatch_message(level, text),
        }
    }

    fn apply_status(&self, report: StatusReport) {
        let (new_state, status, halt_stream) = {
            let mut inner = self.inner.lock();

            if let Some(units) = report.units {
                inner.gcode_state.set_units(units);
            }
            if let Some(absolute) = report.absolute {
                let mode = if absolute { 90 } else { 91 };
                if let Err(e) = inner.gcode_state.set_distance_mode(mode) {
                    tracing::warn!("{}", e);
                }
            }

            let fallback_units = inner.gcode_state.units();
            if let Some(pos) = &report.machine_position {
                merge_position(&mut inner.status.machine_position, pos, fallback_units);
            }
            if let Some(pos) = &report.work_position {
                merge_position(&mut inner.status.work_position, pos, fallback_units);
            }

            let mut new_state = None;
            if let Some(state) = report.state {
                if state == ControllerState::Idle {
                    inner.is_jogging = false;
                }
                if inner.transition(state) {
                    new_state = Some(state);
                }
            }
            let halt_stream = new_state == Some(ControllerState::Alarm) && inner.streaming;
            (new_state, inner.status.clone(), halt_stream)
        };

        if let Some(state) = new_state {
            self.notify_state(state);
        }
        if halt_stream {
            self.comm.pause_send();
            self.dispatch_message(
                MessageLevel::Error,
                "Alarm raised, streaming halted until unlocked",
            );
        }
        self.listeners.for_each(|l| l.on_status_changed(&status));
        self.events.publish(ControllerEvent::StatusChanged(status));
    }

    // ---------------------------------------------------------------------
    // Jogging and immediate commands
    // ---------------------------------------------------------------------

    /// Jog by a relative distance
    pub fn jog_machine(&self, distance: &PartialPosition, feed_rate: f64) -> Result<()> {
        self.jog(distance, feed_rate, false)
    }

    /// Jog to an absolute position
    pub fn jog_machine_to(&self, target: &PartialPosition, feed_rate: f64) -> Result<()> {
        self.jog(target, feed_rate, true)
    }

    fn jog(&self, target: &PartialPosition, feed_rate: f64, absolute: bool) -> Result<()> {
        self.require_connected()?;
        if target.is_empty() {
            return Err(ControllerError::not_ready("jog has no axes").into());
        }
        if !feed_rate.is_finite() || feed_rate <= 0.0 {
            return Err(ControllerError::invalid(
                "feed rate",
                format!("{} is not a positive number", feed_rate),
            )
            .into());
        }

        let units = {
            let mut inner = self.inner.lock();
            if inner.streaming {
                return Err(ControllerError::not_ready("cannot jog while streaming").into());
            }
            if inner.state == ControllerState::Alarm {
                return Err(ControllerError::AlarmActive.into());
            }
            inner.is_jogging = true;
            inner.gcode_state.units()
        };

        let text = jog::build_jog_command(target, feed_rate, units, absolute);
        tracing::debug!("Jog: {}", text);
        let command = GcodeCommand::generated(text).with_temporary_modal_change();

        let sent = self
            .comm
            .queue_command(command)
            .and_then(|_| self.comm.stream_commands());
        if sent.is_err() {
            self.inner.lock().is_jogging = false;
        }
        sent
    }

    /// Send a command ahead of any stream
    pub fn send_command_immediately(&self, command: GcodeCommand) -> Result<()> {
        self.require_connected()?;
        if !command.is_generated() {
            self.inner.lock().is_jogging = false;
        }
        self.comm.queue_command(command)?;
        self.comm.stream_commands()
    }

    /// Clear an alarm lock
    pub fn kill_alarm_lock(&self) -> Result<()> {
        self.require_connected()?;
        self.dispatch_message(MessageLevel::Info, "Clearing alarm lock");
        self.adapter.unlock(self.comm.as_ref())
    }

    /// Ask the firmware for a status report
    pub fn request_status_report(&self) -> Result<()> {
        self.require_connected()?;
        self.adapter.query_status(self.comm.as_ref())
    }

    /// Soft reset the firmware, dropping everything in flight
    pub fn soft_reset(&self) -> Result<()> {
        self.require_connected()?;
        let result = self.adapter.soft_reset(self.comm.as_ref());

        let (dropped, was_streaming) = {
            let mut inner = self.inner.lock();
            let was_streaming = inner.streaming;
            inner.streaming = false;
            inner.freeze_duration();
            (inner.clear_outstanding(), was_streaming)
        };
        Self::cancel_commands(dropped);
        if was_streaming {
            self.notify_stream_canceled();
        }
        self.dispatch_message(MessageLevel::Info, "Soft reset");
        result
    }

    /// Run the homing cycle
    pub fn perform_homing(&self) -> Result<()> {
        self.require_connected()?;
        if self.is_streaming() {
            return Err(ControllerError::not_ready("cannot home while streaming").into());
        }
        self.adapter.home(self.comm.as_ref())
    }

    fn require_connected(&self) -> Result<()> {
        if self.comm.is_connected() {
            Ok(())
        } else {
            Err(ControllerError::not_ready("port is not open").into())
        }
    }

    // ---------------------------------------------------------------------
    // State queries
    // ---------------------------------------------------------------------

    /// Current modal state
    pub fn current_gcode_state(&self) -> GcodeState {
        self.inner.lock().gcode_state
    }

    /// Override the modal state
    pub fn set_gcode_state(&self, state: GcodeState) {
        self.inner.lock().gcode_state = state;
    }

    /// Snapshot of state and positions
    pub fn get_controller_status(&self) -> ControllerStatus {
        self.inner.lock().status.clone()
    }

    /// Current machine state
    pub fn get_controller_state(&self) -> ControllerState {
        self.inner.lock().state
    }

    /// Sending state derived from the machine state
    pub fn get_communicator_state(&self) -> CommunicatorState {
        let active = self.comm.are_active_commands();
        CommunicatorState::derive(self.get_controller_state(), active)
    }

    /// Check if a jog is in flight
    pub fn is_jogging(&self) -> bool {
        self.inner.lock().is_jogging
    }

    /// Commands written and not yet completed
    pub fn outstanding_commands(&self) -> usize {
        self.inner.lock().outstanding.len()
    }

    // ---------------------------------------------------------------------
    // Listeners
    // ---------------------------------------------------------------------

    /// Register a listener
    pub fn add_listener(&self, listener: Arc<dyn ControllerListener>) -> ControllerListenerHandle {
        self.listeners.add(listener)
    }

    /// Remove a listener; returns `false` if the handle was unknown
    pub fn remove_listener(&self, handle: &ControllerListenerHandle) -> bool {
        self.listeners.remove(handle)
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Subscribe to the broadcast event channel
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    fn set_state(&self, state: ControllerState) {
        let changed = self.inner.lock().transition(state);
        if changed {
            self.notify_state(state);
        }
    }

    fn notify_state(&self, state: ControllerState) {
        tracing::info!("Controller state: {}", state);
        self.listeners.for_each(|l| l.on_state_changed(state));
        self.events.publish(ControllerEvent::StateChanged(state));
    }

    fn notify_stream_canceled(&self) {
        tracing::info!("Stream cancelled");
        self.listeners.for_each(|l| l.on_stream_canceled());
        self.events.publish(ControllerEvent::StreamCanceled);
    }

    fn dispatch_message(&self, level: MessageLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            MessageLevel::Info => tracing::info!("{}", message),
            MessageLevel::Warning => tracing::warn!("{}", message),
            MessageLevel::Error => tracing::error!("{}", message),
        }
        self.listeners.for_each(|l| l.on_message(level, &message));
        self.events.publish(ControllerEvent::Message(level, message));
    }

    // ---------------------------------------------------------------------
    // Status polling
    // ---------------------------------------------------------------------

    fn start_status_poller(&self) {
        let interval = self.config.status_poll_interval_ms;
        if interval == 0 {
            return;
        }

        let this = self.this.clone();
        let started = StatusPoller::start(Duration::from_millis(interval), move || {
            match this.upgrade() {
                Some(controller) => controller.poll_status(),
                None => false,
            }
        });
        match started {
            Ok(poller) => {
                // Replacing an old poller drops it, which stops it.
                *self.poller.lock() = Some(poller);
            }
            Err(e) => tracing::warn!("Failed to start status poller: {}", e),
        }
    }

    fn stop_status_poller(&self) {
        if let Some(poller) = self.poller.lock().take() {
            poller.stop();
        }
    }

    /// One poll; returns `false` once the port is closed
    fn poll_status(&self) -> bool {
        if !self.comm.is_connected() {
            return false;
        }
        if self.inner.lock().canceling {
            return true;
        }
        if let Err(e) = self.adapter.query_status(self.comm.as_ref()) {
            tracing::debug!("Status poll failed: {}", e);
        }
        true
    }
}

impl CommunicatorListener for StreamingController {
    fn raw_response(&self, line: &str) {
        self.raw_response_handler(line);
    }

    fn command_sent(&self, command: &GcodeCommand) {
        StreamingController::command_sent(self, command);
    }

    fn connection_lost(&self, reason: &str) {
        self.stop_status_poller();
        let (dropped, was_streaming) = {
            let mut inner = self.inner.lock();
            let was_streaming = inner.streaming;
            inner.streaming = false;
            inner.freeze_duration();
            (inner.clear_outstanding(), was_streaming)
        };
        Self::cancel_commands(dropped);
        if was_streaming {
            self.notify_stream_canceled();
        }
        self.dispatch_message(MessageLevel::Error, format!("Connection lost: {}", reason));
        self.set_state(ControllerState::Disconnected);
        self.events.publish(ControllerEvent::Disconnected);
    }
}

impl Drop for StreamingController {
    fn drop(&mut self) {
        self.stop_status_poller();
    }
}
