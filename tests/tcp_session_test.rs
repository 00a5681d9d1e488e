//! Controller over a real TCP socket
//!
//! A minimal SCPI responder runs on a loopback listener so the whole stack
//! (resource parsing, socket framing, block decoding, error polling) is
//! exercised without hardware.

use scope_daq::session::open_session;
use scope_daq::{Oscilloscope, ScopeError, ScopeOptions};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(2);

/// Serve one connection; returns the port and a log of received lines.
fn spawn_responder(payload: Vec<u8>) -> (u16, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let received = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&received);

    thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        let reader = BufReader::new(stream);
        let mut settings: HashMap<String, String> = HashMap::new();

        for line in reader.lines() {
            let Ok(line) = line else { break };
            log.lock().unwrap().push(line.clone());
            let upper = line.to_ascii_uppercase();

            if upper == ":SYSTEM:ERROR?" {
                writer.write_all(b"+0,\"No error\"\n").unwrap();
            } else if upper == "*IDN?" {
                writer.write_all(b"ACME,LOOPBACK-SCOPE,0001,1.0\n").unwrap();
            } else if upper == ":WAVEFORM:DATA?" {
                let header = format!("#{}{}", payload.len().to_string().len(), payload.len());
                writer.write_all(header.as_bytes()).unwrap();
                writer.write_all(&payload).unwrap();
                writer.write_all(b"\n").unwrap();
            } else if let Some(header) = upper.strip_suffix('?') {
                let value = settings.get(header).cloned().unwrap_or_else(|| "0".into());
                writer.write_all(format!("{value}\n").as_bytes()).unwrap();
            } else if let Some((header, value)) = line.split_once(' ') {
                settings.insert(header.to_ascii_uppercase(), value.to_string());
            }
        }
    });

    (port, received)
}

#[test]
fn capture_over_socket_decodes_block_payload() {
    let payload: Vec<u8> = (0..=255u8).collect();
    let (port, received) = spawn_responder(payload.clone());

    let resource = format!("TCPIP0::127.0.0.1::{port}::SOCKET");
    let session = open_session(&resource, TIMEOUT).unwrap();
    let mut scope = Oscilloscope::new(
        session,
        ScopeOptions {
            capture_points: 256,
            ..Default::default()
        },
    )
    .unwrap();

    assert_eq!(scope.identify().unwrap(), "ACME,LOOPBACK-SCOPE,0001,1.0");

    let samples = scope.capture_waveform("channel2").unwrap();
    let expected: Vec<f64> = payload.iter().map(|b| f64::from(*b)).collect();
    assert_eq!(samples, expected);

    scope.close().unwrap();

    let lines = received.lock().unwrap().clone();
    assert!(lines.contains(&":WAVeform:SOURce channel2".to_string()));
    assert!(lines.contains(&":WAVeform:POINts 256".to_string()));
    assert!(lines.contains(&":WAVeform:DATA?".to_string()));
}

#[test]
fn settings_written_over_socket_read_back() {
    let (port, _) = spawn_responder(Vec::new());
    let session = open_session(&format!("TCPIP0::127.0.0.1::{port}::SOCKET"), TIMEOUT).unwrap();
    let mut scope = Oscilloscope::new(
        session,
        ScopeOptions {
            default_setup: false,
            ..Default::default()
        },
    )
    .unwrap();

    let channel = scope.subsystem("channel1").unwrap();
    channel.set_field("scale", "0.25", true).unwrap();
    assert_eq!(channel.get_field("Scale").unwrap(), "0.25");
}

#[test]
fn unreachable_instrument_is_resource_unavailable() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let err = open_session(&format!("TCPIP0::127.0.0.1::{port}::SOCKET"), TIMEOUT)
        .err()
        .unwrap();
    assert!(matches!(err, ScopeError::ResourceUnavailable { .. }));
    assert!(err.can_recover());
}
