//! End-to-end scenarios against the simulated oscilloscope
//!
//! Each test drives the public API the way an application would and checks
//! the exact SCPI traffic that reached the instrument.

use scope_daq::session::{Exchange, MockHandle, MockSession};
use scope_daq::{
    AllowList, ChannelId, CommandTable, InstrumentLink, Oscilloscope, ScopeError, ScopeOptions,
    SettingNamespace, Timebase, Trigger,
};

fn mock_link() -> (scope_daq::SharedLink, MockHandle) {
    let session = MockSession::new();
    let handle = session.handle();
    (
        InstrumentLink::new(Box::new(session), false).into_shared(),
        handle,
    )
}

// =============================================================================
// Namespace writes
// =============================================================================

#[test]
fn scale_write_is_prefixed_and_marks_state_stale() {
    let (link, handle) = mock_link();
    let mut ns = SettingNamespace::new(
        "CHANnel1",
        CommandTable::from_pairs(&[("Scale", "SCALe")]),
        AllowList::from_pairs(&[("scale", &[])]),
        link,
        false,
    )
    .unwrap();

    ns.refresh_state(false).unwrap();
    ns.set_field("scale", "3.00", false).unwrap();

    assert_eq!(handle.writes(), vec![":CHANnel1:SCALe 3.00".to_string()]);
    assert!(!ns.is_fresh());

    handle.clear_transcript();
    ns.refresh_state(false).unwrap();
    assert_eq!(handle.setting_queries(), vec![":CHANnel1:SCALe?".to_string()]);
}

// =============================================================================
// Trigger routing
// =============================================================================

#[test]
fn trigger_source_routes_through_edge_mode() {
    let (link, handle) = mock_link();
    let mut trigger = Trigger::new(link, false).unwrap();
    assert_eq!(trigger.mode().unwrap(), "EDGE");

    trigger.set_source("channel2").unwrap();
    assert_eq!(
        handle.writes(),
        vec![":TRIGger:EDGE:SOURCE channel2".to_string()]
    );
}

// =============================================================================
// Timebase cache
// =============================================================================

#[test]
fn timebase_read_all_is_eleven_ordered_queries_then_none() {
    let (link, handle) = mock_link();
    let mut timebase = Timebase::new(link, false).unwrap();

    timebase.namespace_mut().refresh_state(false).unwrap();
    let expected: Vec<String> = [
        "MODE",
        "POSition",
        "RANGe",
        "REFClock",
        "REFerence",
        "REFerence:LOCation",
        "SCALe",
        "VERNier",
        "WINDow:POSition",
        "WINDow:RANGe",
        "WINDow:SCALe",
    ]
    .iter()
    .map(|suffix| format!(":TIMebase:{suffix}?"))
    .collect();
    assert_eq!(handle.setting_queries(), expected);

    handle.clear_transcript();
    timebase.namespace_mut().refresh_state(false).unwrap();
    assert!(handle.transcript().is_empty());
}

// =============================================================================
// Capture
// =============================================================================

#[test]
fn capture_from_unknown_channel_performs_no_io() {
    let session = MockSession::new();
    let handle = session.handle();
    let mut scope = Oscilloscope::new(Box::new(session), ScopeOptions::default()).unwrap();
    handle.clear_transcript();

    let err = scope.capture_waveform("channel5").unwrap_err();
    assert!(matches!(err, ScopeError::InvalidChannel(_)));
    assert!(handle.transcript().is_empty());
}

#[test]
fn capture_sequence_is_source_points_data() {
    let session = MockSession::new();
    let handle = session.handle();
    let options = ScopeOptions {
        capture_points: 2048,
        ..Default::default()
    };
    let mut scope = Oscilloscope::new(Box::new(session), options).unwrap();
    handle.clear_transcript();

    let samples = scope.capture_waveform("CHANNEL3").unwrap();
    assert_eq!(samples.len(), 2048);
    assert!(samples.iter().all(|s| (0.0..=255.0).contains(s)));

    let transcript = handle.transcript();
    let non_error: Vec<&Exchange> = transcript
        .iter()
        .filter(|e| !matches!(e, Exchange::Query(q) if q.starts_with(":SYSTem:ERRor")))
        .collect();
    assert_eq!(
        non_error,
        vec![
            &Exchange::Write(":WAVeform:SOURce channel3".into()),
            &Exchange::Write(":WAVeform:POINts 2048".into()),
            &Exchange::QueryBinary(":WAVeform:DATA?".into()),
        ]
    );
    // Every exchange is followed by an error-queue poll.
    assert_eq!(handle.error_polls(), 3);
}

// =============================================================================
// Error queue
// =============================================================================

#[test]
fn no_error_reply_lets_the_write_succeed() {
    let (link, handle) = mock_link();
    let mut trigger = Trigger::new(link, false).unwrap();
    handle.push_error("+0,\"No error\"");
    trigger.set_sweep("normal").unwrap();
}

#[test]
fn queue_overflow_fails_with_the_original_command() {
    let (link, handle) = mock_link();
    let mut trigger = Trigger::new(link, false).unwrap();
    handle.push_error("-350,\"Queue overflow\"");

    match trigger.set_sweep("normal").unwrap_err() {
        ScopeError::InstrumentFault {
            command,
            device_error,
        } => {
            assert_eq!(command, ":TRIGger:SWEep normal");
            assert_eq!(device_error, "-350,\"Queue overflow\"");
        }
        other => panic!("expected InstrumentFault, got {other:?}"),
    }
}

#[test]
fn channel_ids_round_trip_through_display() {
    for id in ChannelId::ALL {
        assert_eq!(id.to_string().parse::<ChannelId>().unwrap(), id);
    }
}
