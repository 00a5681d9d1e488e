//! Error-queue verification and error classification through the public API

use scope_daq::session::{MockHandle, MockSession};
use scope_daq::subsystems::WaveformFormat;
use scope_daq::{Oscilloscope, ScopeError, ScopeOptions, Severity};

fn scope() -> (Oscilloscope, MockHandle) {
    let session = MockSession::new();
    let handle = session.handle();
    let options = ScopeOptions {
        default_setup: false,
        capture_points: 100,
        ..Default::default()
    };
    (Oscilloscope::new(Box::new(session), options).unwrap(), handle)
}

#[test]
fn silent_error_queue_is_a_protocol_violation() {
    let (mut scope, handle) = scope();
    handle.set_silent_error_queue(true);

    let err = scope.identify().unwrap_err();
    assert!(matches!(err, ScopeError::ProtocolViolation { ref command } if command == "*IDN?"));
    assert_eq!(err.severity(), Severity::LinkFailure);
}

#[test]
fn protocol_violation_outranks_instrument_fault() {
    let fault = ScopeError::InstrumentFault {
        command: ":TRIGger:SWEep normal".into(),
        device_error: "-222,\"Data out of range\"".into(),
    };
    let violation = ScopeError::ProtocolViolation {
        command: ":TRIGger:SWEep normal".into(),
    };
    assert!(violation.severity() > fault.severity());
    assert!(!fault.can_recover());
}

#[test]
fn fault_during_read_all_keeps_cache_stale() {
    let (mut scope, handle) = scope();
    let trigger = scope.trigger().unwrap();

    handle.push_error("+0,\"No error\"");
    handle.push_error("+0,\"No error\"");
    handle.push_error("-113,\"Undefined header\"");
    let err = trigger.namespace_mut().refresh_state(false).unwrap_err();
    match err {
        ScopeError::InstrumentFault { command, .. } => {
            assert_eq!(command, ":TRIGger:HOLDoff:MAXimum?")
        }
        other => panic!("expected InstrumentFault, got {other:?}"),
    }
    assert!(!trigger.namespace().is_fresh());

    // Next read retries the whole table.
    handle.clear_transcript();
    trigger.namespace_mut().refresh_state(false).unwrap();
    assert_eq!(handle.setting_queries().len(), 13);
}

#[test]
fn rejected_values_never_reach_the_error_queue() {
    let (mut scope, handle) = scope();
    let err = scope
        .subsystem("waveform")
        .unwrap()
        .set_field("format", "float", false)
        .unwrap_err();
    match err {
        ScopeError::InvalidValue { field, allowed, .. } => {
            assert_eq!(field, "format");
            assert_eq!(allowed, vec!["word", "byte", "ascii"]);
        }
        other => panic!("expected InvalidValue, got {other:?}"),
    }
    assert_eq!(handle.error_polls(), 0);
    assert!(handle.transcript().is_empty());
}

#[test]
fn capture_fault_surfaces_the_data_query() {
    let (mut scope, handle) = scope();
    scope
        .waveform()
        .unwrap()
        .set_format(WaveformFormat::Byte)
        .unwrap();

    // source write, points write, then the binary query faults
    handle.push_error("+0,\"No error\"");
    handle.push_error("+0,\"No error\"");
    handle.push_error("-222,\"Data out of range\"");
    let err = scope.capture_waveform("channel1").unwrap_err();
    assert!(
        matches!(
            err,
            ScopeError::InstrumentFault { ref command, .. } if command == ":WAVeform:DATA?"
        ),
        "{err:?}"
    );
}
