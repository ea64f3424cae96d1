mod common;

use common::{RecordingListener, ScriptedTransport, TransportHandle};
use gcodestream_communication::{
    BufferedCommunicator, Communicator, ConnectionDriver, GrblAdapter, StreamingController,
};
use gcodestream_core::{
    ControllerConfig, ControllerState, FlowControl, StringStreamReader, Units,
};
use std::sync::Arc;

fn connected(buffer_size: usize) -> (
    Arc<StreamingController>,
    Arc<BufferedCommunicator>,
    TransportHandle,
    Arc<RecordingListener>,
) {
    let (transport, wire) = ScriptedTransport::new();
    let comm = Arc::new(BufferedCommunicator::new(
        Box::new(transport),
        FlowControl::Disabled,
    ));
    let config = ControllerConfig {
        status_poll_interval_ms: 0,
        flow_control: Some(FlowControl::CharacterCounting { buffer_size }),
        ..ControllerConfig::default()
    };
    let controller = StreamingController::new(comm.clone(), Box::new(GrblAdapter::new()), config);
    let listener = RecordingListener::new();
    controller.add_listener(listener.clone());
    controller
        .open_comm_port(ConnectionDriver::Null, "/dev/ttyACM0", 115200)
        .unwrap();
    (controller, comm, wire, listener)
}

#[test]
fn connect_queries_status_and_applies_configured_flow_control() {
    let (controller, comm, wire, _listener) = connected(20);

    assert_eq!(wire.realtime(), vec![b'?']);
    assert_eq!(
        comm.flow_control(),
        FlowControl::CharacterCounting { buffer_size: 20 }
    );
    assert_eq!(controller.firmware_name(), "GRBL");
}

#[test]
fn character_counting_stream() {
    let (controller, comm, wire, listener) = connected(20);
    controller
        .queue_stream(Box::new(StringStreamReader::new(
            "G0 X10\nG0 X20\nG0 X30\nG0 X40\n",
        )))
        .unwrap();
    controller.begin_streaming().unwrap();

    // 7 bytes per line: two fit in 20
    assert_eq!(wire.lines(), vec!["G0 X10", "G0 X20"]);
    assert_eq!(comm.sent_buffer_size(), 14);

    wire.respond("ok");
    assert_eq!(wire.lines().len(), 3);
    wire.respond("<Run|MPos:10.000,0.000,0.000|FS:500,0>");
    assert_eq!(controller.get_controller_state(), ControllerState::Run);
    wire.respond("ok");
    wire.respond("ok");
    assert!(controller.is_streaming());
    wire.respond("ok");

    assert!(!controller.is_streaming());
    assert_eq!(listener.count("complete:"), 4);
    assert_eq!(listener.count("stream:complete"), 1);
    assert_eq!(comm.sent_buffer_size(), 0);
}

#[test]
fn status_report_positions_use_modal_units() {
    let (controller, _comm, wire, _listener) = connected(128);

    wire.respond("<Idle|MPos:1.000,2.000,3.000|FS:0,0|WCO:0.000,0.000,0.000>");

    let status = controller.get_controller_status();
    assert_eq!(status.state, ControllerState::Idle);
    assert_eq!(status.machine_position.x, 1.0);
    assert_eq!(status.machine_position.y, 2.0);
    assert_eq!(status.machine_position.z, 3.0);
    assert_eq!(status.machine_position.units, Units::MM);
}

#[test]
fn error_response_reports_and_completes() {
    let (controller, _comm, wire, listener) = connected(128);
    controller
        .send_command_immediately(gcodestream_core::GcodeCommand::new("G99"))
        .unwrap();

    wire.respond("error:20");

    assert_eq!(listener.count("complete:G99"), 1);
    assert_eq!(listener.count("message:ERROR:error:20"), 1);
    assert_eq!(controller.outstanding_commands(), 0);
}

#[test]
fn unexpected_ok_warns_and_resyncs() {
    let (_controller, _comm, wire, listener) = connected(128);

    wire.respond("ok");

    assert_eq!(listener.count("message:WARNING"), 1);
    assert_eq!(listener.count("complete:"), 0);
    assert_eq!(wire.realtime(), vec![b'?', b'?']);
}

#[test]
fn alarm_enters_alarm_state_and_unlock_clears_it() {
    let (controller, _comm, wire, listener) = connected(128);

    wire.respond("ALARM:1");
    assert_eq!(controller.get_controller_state(), ControllerState::Alarm);
    assert_eq!(listener.count("message:ERROR:ALARM:1"), 1);

    controller.kill_alarm_lock().unwrap();
    assert_eq!(wire.lines(), vec!["$X"]);
    wire.respond("ok");
    wire.respond("<Idle|MPos:0.000,0.000,0.000|FS:0,0>");
    assert_eq!(controller.get_controller_state(), ControllerState::Idle);
}

#[test]
fn version_banner_triggers_status_query() {
    let (_controller, _comm, wire, listener) = connected(128);

    wire.respond("Grbl 1.1h ['$' for help]");

    assert_eq!(listener.count("message:INFO:Grbl 1.1h"), 1);
    assert_eq!(wire.realtime(), vec![b'?', b'?']);
}

#[test]
fn cancel_sends_soft_reset() {
    let (controller, comm, wire, listener) = connected(20);
    controller
        .queue_stream(Box::new(StringStreamReader::new(
            "G0 X10\nG0 X20\nG0 X30\nG0 X40\n",
        )))
        .unwrap();
    controller.begin_streaming().unwrap();

    controller.cancel_send().unwrap();

    assert_eq!(wire.realtime(), vec![b'?', 0x18, b'?']);
    assert_eq!(comm.num_active_commands(), 0);
    assert_eq!(comm.sent_buffer_size(), 0);
    assert_eq!(listener.count("stream:canceled"), 1);

    wire.respond("ok");
    assert_eq!(listener.count("complete:"), 0);
}

#[test]
fn jog_while_jogging_reports_jog() {
    let (controller, _comm, wire, _listener) = connected(128);
    wire.respond("<Idle|MPos:0.000,0.000,0.000|FS:0,0>");

    controller
        .jog_machine(
            &gcodestream_core::PartialPosition::new(Units::MM).with_y(-5.0),
            300.0,
        )
        .unwrap();
    assert_eq!(wire.lines(), vec!["G21G91G1Y-5F300", "G21G90"]);

    wire.respond("<Run|MPos:0.000,-2.500,0.000|FS:300,0>");
    assert_eq!(controller.get_controller_state(), ControllerState::Jog);
    assert_eq!(controller.get_controller_status().machine_position.y, -2.5);
}
