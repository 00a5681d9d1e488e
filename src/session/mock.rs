//! Simulated oscilloscope session for testing
//!
//! This session answers SCPI traffic without requiring physical hardware. It provides:
//! - A settings store keyed by command header (case-insensitive)
//! - An injectable device error queue behind `:SYSTem:ERRor?`
//! - Synthetic waveform data and a consistent preamble
//! - A transcript of every exchange for test verification
//!
//! The session is usually moved into an [`InstrumentLink`](crate::link::InstrumentLink);
//! keep a [`MockHandle`] to inspect or steer it afterwards.

use super::Session;
use crate::error::{Result, ScopeError};
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::f64::consts::PI;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Error queue reply meaning "nothing to report".
pub const NO_ERROR: &str = "+0,\"No error\"";

const ERROR_QUERY: &str = ":SYSTEM:ERROR?";
const DEFAULT_POINTS: usize = 1000;

/// One recorded transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exchange {
    /// Text query
    Query(String),
    /// Write-only command
    Write(String),
    /// Query with a binary reply
    QueryBinary(String),
    /// Session closed
    Close,
}

#[derive(Debug, Default)]
struct MockState {
    settings: HashMap<String, String>,
    errors: VecDeque<String>,
    silent_error_queue: bool,
    transcript: Vec<Exchange>,
    closed: bool,
}

impl MockState {
    fn seeded() -> Self {
        let mut state = Self::default();
        let defaults: &[(&str, &str)] = &[
            (":TRIGGER:HFREJECT", "0"),
            (":TRIGGER:HOLDOFF", "+40.0000000000E-09"),
            (":TRIGGER:HOLDOFF:MAXIMUM", "+50.0000000000E-09"),
            (":TRIGGER:HOLDOFF:MINIMUM", "+40.0000000000E-09"),
            (":TRIGGER:HOLDOFF:RANDOM", "0"),
            (":TRIGGER:MODE", "EDGE"),
            (":TRIGGER:NREJECT", "0"),
            (":TRIGGER:SWEEP", "AUTO"),
            (":TRIGGER:EDGE:COUPLING", "DC"),
            (":TRIGGER:EDGE:REJECT", "OFF"),
            (":TRIGGER:EDGE:LEVEL", "+0.00000E+00"),
            (":TRIGGER:EDGE:SLOPE", "POS"),
            (":TRIGGER:EDGE:SOURCE", "CHAN1"),
            (":TIMEBASE:MODE", "MAIN"),
            (":TIMEBASE:POSITION", "+0.0E+00"),
            (":TIMEBASE:RANGE", "+1.00E-03"),
            (":TIMEBASE:REFCLOCK", "0"),
            (":TIMEBASE:REFERENCE", "CENT"),
            (":TIMEBASE:REFERENCE:LOCATION", "+500.000000000E-03"),
            (":TIMEBASE:SCALE", "+100.0E-06"),
            (":TIMEBASE:VERNIER", "0"),
            (":WAVEFORM:BYTEORDER", "MSBF"),
            (":WAVEFORM:FORMAT", "BYTE"),
            (":WAVEFORM:POINTS", "1000"),
            (":WAVEFORM:POINTS:MODE", "NORM"),
            (":WAVEFORM:SOURCE", "CHAN1"),
            (":WAVEFORM:TYPE", "NORM"),
            (":WAVEFORM:UNSIGNED", "1"),
        ];
        for (header, value) in defaults {
            state.settings.insert(header.to_string(), value.to_string());
        }
        for n in 1..=4 {
            let channel_defaults = [
                ("BWLIMIT", "0"),
                ("COUPLING", "DC"),
                ("DISPLAY", if n == 1 { "1" } else { "0" }),
                ("IMPEDANCE", "ONEM"),
                ("INVERT", "0"),
                ("OFFSET", "+0.00000E+00"),
                ("PROBE", "+10.000E+00"),
                ("PROTECTION", "NORM"),
                ("RANGE", "+8.00E+00"),
                ("SCALE", "+1.00E+00"),
                ("UNITS", "VOLT"),
                ("VERNIER", "0"),
            ];
            for (suffix, value) in channel_defaults {
                state
                    .settings
                    .insert(format!(":CHANNEL{n}:{suffix}"), value.to_string());
            }
            state
                .settings
                .insert(format!(":CHANNEL{n}:LABEL"), format!("\"{n}\""));
        }
        state
    }

    fn setting(&self, header: &str) -> Option<&str> {
        self.settings.get(header).map(String::as_str)
    }

    fn points(&self) -> usize {
        self.setting(":WAVEFORM:POINTS")
            .and_then(|p| p.parse::<usize>().ok())
            .filter(|p| *p > 0)
            .unwrap_or(DEFAULT_POINTS)
    }

    fn format(&self) -> String {
        self.setting(":WAVEFORM:FORMAT")
            .unwrap_or("BYTE")
            .to_ascii_uppercase()
    }

    fn preamble(&self) -> String {
        let format = match self.format().as_str() {
            "WORD" => 1,
            "ASCII" | "ASC" => 4,
            _ => 0,
        };
        let points = self.points();
        // Keep a 1 ms window regardless of the point count.
        let xincrement = 1.0e-3 / points as f64;
        format!(
            "+{format},+0,+{points},+1,{xincrement:+.6E},{:+.6E},+0,{:+.6E},{:+.6E},+128",
            -0.5e-3, 0.02, 0.0
        )
    }

    fn samples(&self) -> impl Iterator<Item = f64> {
        let points = self.points();
        (0..points).map(move |i| (2.0 * PI * 5.0 * i as f64 / points as f64).sin())
    }

    fn waveform_payload(&self) -> Bytes {
        match self.format().as_str() {
            "WORD" => {
                let little_endian = self
                    .setting(":WAVEFORM:BYTEORDER")
                    .is_some_and(|o| o.to_ascii_uppercase().starts_with("LSBF"));
                let mut payload = Vec::with_capacity(self.points() * 2);
                for s in self.samples() {
                    let code = (32768.0 + s * 25600.0) as u16;
                    if little_endian {
                        payload.extend_from_slice(&code.to_le_bytes());
                    } else {
                        payload.extend_from_slice(&code.to_be_bytes());
                    }
                }
                Bytes::from(payload)
            }
            "ASCII" | "ASC" => {
                let text = self
                    .samples()
                    .map(|s| format!("{:+.6E}", s * 2.0))
                    .collect::<Vec<_>>()
                    .join(",");
                Bytes::from(text)
            }
            _ => Bytes::from(
                self.samples()
                    .map(|s| (128.0 + s * 100.0).round() as u8)
                    .collect::<Vec<_>>(),
            ),
        }
    }
}

fn normalize_header(text: &str) -> String {
    let header = text.trim().to_ascii_uppercase();
    if header.starts_with(':') || header.starts_with('*') {
        header
    } else {
        format!(":{header}")
    }
}

/// Simulated oscilloscope implementing [`Session`].
///
/// # Example
///
/// ```
/// use scope_daq::session::{MockSession, Session};
///
/// let mut session = MockSession::new();
/// let handle = session.handle();
/// assert_eq!(session.query(":TRIGger:MODE?").unwrap().trim(), "EDGE");
/// assert_eq!(handle.transcript().len(), 1);
/// ```
pub struct MockSession {
    resource: String,
    state: Arc<Mutex<MockState>>,
}

impl MockSession {
    /// Create a simulated scope with factory-default settings.
    pub fn new() -> Self {
        Self::with_resource("MOCK0::scope")
    }

    /// Create a simulated scope reporting `resource` as its identifier.
    pub fn with_resource(resource: &str) -> Self {
        Self {
            resource: resource.to_string(),
            state: Arc::new(Mutex::new(MockState::seeded())),
        }
    }

    /// Handle for inspecting and steering this session after it has been moved.
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Session for MockSession {
    fn query(&mut self, text: &str) -> Result<String> {
        let mut state = self.state();
        if state.closed {
            return Err(ScopeError::SessionClosed);
        }
        state.transcript.push(Exchange::Query(text.to_string()));
        tracing::trace!(command = text, "mock query");

        let header = normalize_header(text);
        if header == ERROR_QUERY {
            if state.silent_error_queue {
                return Ok(String::new());
            }
            return Ok(state
                .errors
                .pop_front()
                .unwrap_or_else(|| NO_ERROR.to_string()));
        }

        let key = header.trim_end_matches('?');
        let response = match key {
            "*IDN" => "KEYSIGHT TECHNOLOGIES,DSOX1204G,MOCK000001,02.12.2021071625".to_string(),
            "*OPC" => "1".to_string(),
            ":WAVEFORM:PREAMBLE" => state.preamble(),
            _ => state.setting(key).unwrap_or("0").to_string(),
        };
        Ok(format!("{response}\n"))
    }

    fn write(&mut self, text: &str) -> Result<()> {
        let mut state = self.state();
        if state.closed {
            return Err(ScopeError::SessionClosed);
        }
        state.transcript.push(Exchange::Write(text.to_string()));
        tracing::trace!(command = text, "mock write");

        let trimmed = text.trim();
        if let Some((header, value)) = trimmed.split_once(char::is_whitespace) {
            let value = value.trim();
            if !value.is_empty() {
                state
                    .settings
                    .insert(normalize_header(header), value.to_string());
            }
        }
        Ok(())
    }

    fn query_binary(&mut self, text: &str) -> Result<Bytes> {
        let mut state = self.state();
        if state.closed {
            return Err(ScopeError::SessionClosed);
        }
        state.transcript.push(Exchange::QueryBinary(text.to_string()));

        let header = normalize_header(text);
        if header.trim_end_matches('?') == ":WAVEFORM:DATA" {
            Ok(state.waveform_payload())
        } else {
            let key = header.trim_end_matches('?');
            Ok(Bytes::from(state.setting(key).unwrap_or("0").to_string()))
        }
    }

    fn close(&mut self) -> Result<()> {
        let mut state = self.state();
        if state.closed {
            return Err(ScopeError::SessionClosed);
        }
        state.closed = true;
        state.transcript.push(Exchange::Close);
        Ok(())
    }

    fn resource(&self) -> &str {
        &self.resource
    }
}

/// Shared view of a [`MockSession`].
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a device error; the next `:SYSTem:ERRor?` returns it.
    pub fn push_error(&self, error: &str) {
        self.state().errors.push_back(error.to_string());
    }

    /// Make `:SYSTem:ERRor?` answer with an empty string.
    pub fn set_silent_error_queue(&self, silent: bool) {
        self.state().silent_error_queue = silent;
    }

    /// Seed a setting, e.g. `set(":TRIGger:MODE", "GLITch")`.
    pub fn set(&self, header: &str, value: &str) {
        self.state()
            .settings
            .insert(normalize_header(header), value.to_string());
    }

    /// Current value of a setting, if the scope knows it.
    pub fn get(&self, header: &str) -> Option<String> {
        self.state()
            .settings
            .get(&normalize_header(header))
            .cloned()
    }

    /// Every exchange so far, in order.
    pub fn transcript(&self) -> Vec<Exchange> {
        self.state().transcript.clone()
    }

    /// Write-only commands so far, in order.
    pub fn writes(&self) -> Vec<String> {
        self.state()
            .transcript
            .iter()
            .filter_map(|e| match e {
                Exchange::Write(cmd) => Some(cmd.clone()),
                _ => None,
            })
            .collect()
    }

    /// Text queries so far, excluding error-queue polls.
    pub fn setting_queries(&self) -> Vec<String> {
        self.state()
            .transcript
            .iter()
            .filter_map(|e| match e {
                Exchange::Query(cmd) if normalize_header(cmd) != ERROR_QUERY => Some(cmd.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of `:SYSTem:ERRor?` polls so far.
    pub fn error_polls(&self) -> usize {
        self.state()
            .transcript
            .iter()
            .filter(|e| matches!(e, Exchange::Query(cmd) if normalize_header(cmd) == ERROR_QUERY))
            .count()
    }

    /// Forget the transcript.
    pub fn clear_transcript(&self) {
        self.state().transcript.clear();
    }

    /// Whether the session has been closed.
    pub fn is_closed(&self) -> bool {
        self.state().closed
    }
}
