mod common;

use common::{Call, RecordingCommunicator, RecordingListener};
use gcodestream_communication::{G2CoreAdapter, StreamingController};
use gcodestream_core::{
    CommunicatorState, ControllerConfig, ControllerError, ControllerState, Error, GcodeCommand,
    GcodeState, PartialPosition, Units,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn setup(connected: bool) -> (Arc<StreamingController>, Arc<RecordingCommunicator>) {
    let comm = RecordingCommunicator::new(connected);
    let config = ControllerConfig {
        status_poll_interval_ms: 0,
        ..ControllerConfig::default()
    };
    let controller = StreamingController::new(comm.clone(), Box::new(G2CoreAdapter::new()), config);
    (controller, comm)
}

fn with_units(controller: &StreamingController, units: Units) {
    let mut state = GcodeState::new();
    state.set_units(units);
    controller.set_gcode_state(state);
}

#[test]
fn raw_response_with_ready_response_queries_status() {
    let (controller, comm) = setup(false);

    controller.raw_response_handler(r#"{"r":{"msg":"SYSTEM READY"}}"#);

    assert_eq!(comm.calls(), vec![Call::SendByte(b'?')]);
}

#[test]
fn raw_response_with_ack_queues_bootstrap_sequence() {
    let (controller, comm) = setup(false);

    controller.raw_response_handler(r#"{"ack":true}"#);

    let queued: Vec<String> = comm
        .queued()
        .iter()
        .map(|c| c.command().to_string())
        .collect();
    assert_eq!(
        queued,
        vec![
            "{ej:1}",
            "{sr:{posx:t, posy:t, posz:t, mpox:t, mpoy:t, mpoz:t, plan:t, vel:t, unit:t, stat:t, dist:t, admo:t, frmo:t, coor:t}}",
            "{jv:4}",
            "{qv:0}",
            "{sv:1}",
            "$$",
            "{mfoe:1}",
            "{mfo:1}",
            "{mtoe:1}",
            "{mto:1}",
            "{ssoe:1}",
            "{sso:1}",
        ]
    );
    assert!(comm.queued().iter().all(GcodeCommand::is_generated));
    assert_eq!(comm.calls().last(), Some(&Call::StreamCommands));
    assert_eq!(
        comm.calls()
            .iter()
            .filter(|c| **c == Call::StreamCommands)
            .count(),
        1
    );
}

#[test]
fn raw_response_with_status_report_in_result() {
    let (controller, _comm) = setup(false);
    let listener = RecordingListener::new();
    controller.add_listener(listener.clone());

    controller.raw_response_handler(r#"{"r":{"sr":{"stat":5}}}"#);

    assert_eq!(controller.get_controller_status().state, ControllerState::Run);
    assert_eq!(listener.count("complete:"), 0);
}

#[test]
fn result_for_no_command_does_not_dispatch_command_complete() {
    let (controller, comm) = setup(false);
    let listener = RecordingListener::new();
    controller.add_listener(listener.clone());

    controller.raw_response_handler(r#"{"r":{}}"#);

    assert_eq!(listener.count("complete:"), 0);
    assert!(!comm.calls().contains(&Call::Acknowledge));
}

#[test]
fn result_for_command_dispatches_command_complete() {
    let (controller, _comm) = setup(false);
    let listener = RecordingListener::new();
    controller.add_listener(listener.clone());

    controller.command_sent(&GcodeCommand::new("test"));
    controller.raw_response_handler(r#"{"r":{}}"#);

    assert_eq!(listener.count("complete:test"), 1);
    assert_eq!(controller.outstanding_commands(), 0);
}

#[test]
fn status_report_state_codes_update_controller_state() {
    let (controller, _comm) = setup(false);
    assert_eq!(
        controller.get_controller_status().state,
        ControllerState::Disconnected,
        "the controller should begin in a disconnected state"
    );

    let expected = [
        (1, ControllerState::Idle, CommunicatorState::Idle),
        (2, ControllerState::Alarm, CommunicatorState::Idle),
        (3, ControllerState::Idle, CommunicatorState::Idle),
        (4, ControllerState::Idle, CommunicatorState::Idle),
        (5, ControllerState::Run, CommunicatorState::Sending),
        (6, ControllerState::Hold, CommunicatorState::SendingPaused),
        (7, ControllerState::Alarm, CommunicatorState::Idle),
        (8, ControllerState::Alarm, CommunicatorState::Idle),
        (9, ControllerState::Home, CommunicatorState::Idle),
        (10, ControllerState::Jog, CommunicatorState::Sending),
        (11, ControllerState::Alarm, CommunicatorState::Idle),
        (12, ControllerState::Alarm, CommunicatorState::Idle),
        (13, ControllerState::Alarm, CommunicatorState::Idle),
        (42, ControllerState::Unknown, CommunicatorState::Idle),
    ];

    for (code, state, comm_state) in expected {
        controller.raw_response_handler(&format!(r#"{{"sr":{{"stat": {}}}}}"#, code));
        assert_eq!(
            controller.get_controller_status().state,
            state,
            "stat {}",
            code
        );
        assert_eq!(controller.get_communicator_state(), comm_state, "stat {}", code);
    }
}

#[test]
fn cancel_send_runs_abort_sequence_in_order() {
    let (controller, comm) = setup(true);

    controller.cancel_send().unwrap();

    let calls = comm.calls();
    assert_eq!(
        &calls[..5],
        &[
            Call::CancelSend,
            Call::SendByte(0x04),
            Call::CancelSend,
            Call::QueueCommand("{clear:n}".to_string()),
            Call::StreamCommands,
        ]
    );
    assert_eq!(calls.last(), Some(&Call::SendByte(b'?')));
}

#[test]
fn jog_machine() {
    let (controller, comm) = setup(true);
    with_units(&controller, Units::MM);

    controller
        .jog_machine(&PartialPosition::xyz(100.0, 100.0, 100.0, Units::MM), 1000.0)
        .unwrap();

    assert_eq!(
        comm.calls(),
        vec![
            Call::QueueCommand("G21G91G1X100Y100Z100F1000".to_string()),
            Call::StreamCommands
        ]
    );
    let command = &comm.queued()[0];
    assert!(command.is_generated());
    assert!(command.is_temporary_modal_change());
}

#[test]
fn jog_machine_when_using_inches_converts_coordinates() {
    let (controller, comm) = setup(true);
    with_units(&controller, Units::INCH);

    controller
        .jog_machine(&PartialPosition::xyz(100.0, 100.0, 100.0, Units::MM), 1000.0)
        .unwrap();

    assert_eq!(
        comm.queued()[0].command(),
        "G20G91G1X3.937Y3.937Z3.937F39.37"
    );
}

#[test]
fn jog_machine_to() {
    let (controller, comm) = setup(true);
    with_units(&controller, Units::MM);

    controller
        .jog_machine_to(&PartialPosition::xyz(1.0, 2.0, 3.0, Units::MM), 1000.0)
        .unwrap();

    let command = &comm.queued()[0];
    assert_eq!(command.command(), "G21G90G1X1Y2Z3F1000");
    assert!(command.is_generated());
    assert!(command.is_temporary_modal_change());
}

#[test]
fn jog_machine_to_when_using_inches_converts_coordinates() {
    let (controller, comm) = setup(true);
    with_units(&controller, Units::INCH);

    controller
        .jog_machine_to(&PartialPosition::xyz(1.0, 2.0, 3.0, Units::MM), 1000.0)
        .unwrap();

    assert_eq!(
        comm.queued()[0].command(),
        "G20G90G1X0.039Y0.079Z0.118F39.37"
    );
}

#[test]
fn jog_reports_run_as_jog() {
    let (controller, _comm) = setup(true);
    controller
        .jog_machine(&PartialPosition::xyz(1.0, 2.0, 3.0, Units::MM), 1000.0)
        .unwrap();

    controller.raw_response_handler(r#"{"sr":{"stat": 5}}"#);

    assert_eq!(controller.get_controller_status().state, ControllerState::Jog);
}

#[test]
fn jog_returns_to_idle_when_done() {
    let (controller, _comm) = setup(true);
    controller
        .jog_machine(&PartialPosition::xyz(1.0, 2.0, 3.0, Units::MM), 1000.0)
        .unwrap();

    controller.raw_response_handler(r#"{"sr":{"stat": 1}}"#);

    assert_eq!(controller.get_controller_status().state, ControllerState::Idle);
    assert!(!controller.is_jogging());
}

#[test]
fn immediate_command_after_jog_runs_as_normal() {
    let (controller, _comm) = setup(true);
    controller
        .jog_machine(&PartialPosition::xyz(1.0, 2.0, 3.0, Units::MM), 1000.0)
        .unwrap();
    controller.raw_response_handler(r#"{"sr":{"stat": 1}}"#);

    controller
        .send_command_immediately(GcodeCommand::new("G0 X1"))
        .unwrap();
    controller.raw_response_handler(r#"{"sr":{"stat": 5}}"#);

    assert_eq!(
        controller.get_controller_status().state,
        ControllerState::Run,
        "sent commands should now count as a normal run state"
    );
}

#[test]
fn temporary_modal_change_is_reverted_after_send() {
    let (controller, comm) = setup(true);
    with_units(&controller, Units::INCH);

    let jog = GcodeCommand::generated("G20G91G1X1F10").with_temporary_modal_change();
    controller.command_sent(&jog);

    assert_eq!(
        comm.calls(),
        vec![
            Call::QueueCommand("G20G90".to_string()),
            Call::StreamCommands
        ]
    );
    assert!(comm.queued()[0].is_generated());
    let state = controller.current_gcode_state();
    assert!(state.is_absolute());
    assert_eq!(state.units(), Units::INCH);
}

#[test]
fn ordinary_command_updates_modal_state_without_restore() {
    let (controller, comm) = setup(true);

    controller.command_sent(&GcodeCommand::new("G91 G0 X1"));

    assert!(comm.calls().is_empty());
    assert!(!controller.current_gcode_state().is_absolute());
}

#[test]
fn jog_rejects_unusable_feed_rates() {
    let (controller, comm) = setup(true);
    let target = PartialPosition::xyz(1.0, 0.0, 0.0, Units::MM);

    for feed in [f64::NAN, f64::INFINITY, 0.0, -100.0] {
        let err = controller.jog_machine(&target, feed).unwrap_err();
        assert!(
            matches!(
                err,
                Error::Controller(ControllerError::InvalidParameter { .. })
            ),
            "feed {} should be rejected",
            feed
        );
    }

    assert!(comm.calls().is_empty());
    assert!(!controller.is_jogging());
}

#[test]
fn command_complete_fires_command_listener() {
    let (controller, _comm) = setup(false);
    let dispatched = Arc::new(AtomicBool::new(false));
    let flag = dispatched.clone();
    let mut command = GcodeCommand::new("{}");
    command.add_listener(move |_| flag.store(true, Ordering::SeqCst));

    controller.command_sent(&command);
    controller.command_complete("{}");

    assert!(
        dispatched.load(Ordering::SeqCst),
        "completing a command should notify its listeners"
    );
}

#[test]
fn malformed_json_is_reported_not_raised() {
    let (controller, _comm) = setup(false);
    let listener = RecordingListener::new();
    controller.add_listener(listener.clone());

    controller.raw_response_handler(r#"{"sr":{"stat":"#);

    assert_eq!(listener.count("message:ERROR"), 1);
    assert_eq!(
        controller.get_controller_state(),
        ControllerState::Disconnected
    );
}
