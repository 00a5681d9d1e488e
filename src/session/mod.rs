//! Transport sessions to a physical (or simulated) oscilloscope.
//!
//! A [`Session`] is the only piece of the library that touches the wire. It
//! offers plain request/response primitives; error-queue verification and
//! verbosity live one level up in [`crate::link::InstrumentLink`].
//!
//! Supported resource strings:
//! - `"TCPIP0::192.168.0.17::5025::SOCKET"` (raw SCPI socket)
//! - `"TCPIP0::192.168.0.17::INSTR"` (served over the raw socket on port 5025)
//! - `"MOCK0::scope"` (simulated oscilloscope, see [`mock`])
//!
//! USB and GPIB identifiers parse but cannot be opened without a VISA driver.

pub mod mock;
pub mod select;
pub mod tcp;

pub use mock::{Exchange, MockHandle, MockSession};
pub use select::{open_with_fallback, select_resource};
pub use tcp::TcpSession;

use crate::error::{Result, ScopeError};
use bytes::Bytes;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Synchronous request/response channel to one instrument.
///
/// Implementations are not internally synchronised; interleaving calls from
/// several threads would corrupt query/response pairing. Share a session only
/// through [`crate::link::SharedLink`].
pub trait Session: Send {
    /// Write `text` and read one line of textual response.
    fn query(&mut self, text: &str) -> Result<String>;

    /// Write `text` without expecting a response.
    fn write(&mut self, text: &str) -> Result<()>;

    /// Write `text` and read a binary payload (block framing already removed).
    fn query_binary(&mut self, text: &str) -> Result<Bytes>;

    /// Release the connection. Every later call must fail.
    fn close(&mut self) -> Result<()>;

    /// Resource identifier this session was opened with.
    fn resource(&self) -> &str;
}

/// Parsed VISA-style resource identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceId {
    /// `TCPIP[n]::host::port::SOCKET`
    TcpSocket {
        /// Hostname or IP address
        host: String,
        /// TCP port
        port: u16,
    },
    /// `TCPIP[n]::host[::device]::INSTR`
    TcpInstr {
        /// Hostname or IP address
        host: String,
    },
    /// `MOCK[n]::name`
    Mock {
        /// Free-form name of the simulated instrument
        name: String,
    },
    /// Any other interface (USB, GPIB, ASRL, ...).
    Other {
        /// Interface prefix, upper-cased
        interface: String,
        /// The full identifier as given
        raw: String,
    },
}

impl ResourceId {
    fn unavailable(raw: &str, reason: impl Into<String>) -> ScopeError {
        ScopeError::ResourceUnavailable {
            resource: raw.to_string(),
            reason: reason.into(),
        }
    }
}

impl FromStr for ResourceId {
    type Err = ScopeError;

    fn from_str(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Self::unavailable(raw, "empty resource identifier"));
        }

        let parts: Vec<&str> = trimmed.split("::").collect();
        let interface = parts[0].trim_end_matches(|c: char| c.is_ascii_digit());
        let interface = interface.to_ascii_uppercase();

        match interface.as_str() {
            "TCPIP" => {
                let host = parts
                    .get(1)
                    .filter(|h| !h.is_empty())
                    .ok_or_else(|| Self::unavailable(raw, "missing host"))?
                    .to_string();
                let last = parts.last().map(|p| p.to_ascii_uppercase());
                match last.as_deref() {
                    Some("SOCKET") => {
                        let port = parts
                            .get(2)
                            .filter(|_| parts.len() == 4)
                            .ok_or_else(|| Self::unavailable(raw, "SOCKET resource needs a port"))?
                            .parse::<u16>()
                            .map_err(|e| Self::unavailable(raw, format!("invalid port: {e}")))?;
                        Ok(ResourceId::TcpSocket { host, port })
                    }
                    Some("INSTR") if parts.len() >= 3 => Ok(ResourceId::TcpInstr { host }),
                    _ => Err(Self::unavailable(raw, "expected a ::SOCKET or ::INSTR suffix")),
                }
            }
            "MOCK" => Ok(ResourceId::Mock {
                name: parts.get(1).unwrap_or(&"scope").to_string(),
            }),
            _ => Ok(ResourceId::Other {
                interface,
                raw: trimmed.to_string(),
            }),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceId::TcpSocket { host, port } => write!(f, "TCPIP0::{host}::{port}::SOCKET"),
            ResourceId::TcpInstr { host } => write!(f, "TCPIP0::{host}::INSTR"),
            ResourceId::Mock { name } => write!(f, "MOCK0::{name}"),
            ResourceId::Other { raw, .. } => f.write_str(raw),
        }
    }
}

/// Open a session for `resource`, failing with `ResourceUnavailable` when the
/// identifier is malformed, unsupported, or unreachable.
pub fn open_session(resource: &str, timeout: Duration) -> Result<Box<dyn Session>> {
    match resource.parse::<ResourceId>()? {
        ResourceId::TcpSocket { host, port } => Ok(Box::new(TcpSession::connect(
            resource, &host, port, timeout,
        )?)),
        ResourceId::TcpInstr { host } => Ok(Box::new(TcpSession::connect(
            resource,
            &host,
            tcp::DEFAULT_PORT,
            timeout,
        )?)),
        ResourceId::Mock { .. } => Ok(Box::new(MockSession::with_resource(resource))),
        ResourceId::Other { interface, .. } => Err(ScopeError::ResourceUnavailable {
            resource: resource.to_string(),
            reason: format!("no driver for {interface} resources"),
        }),
    }
}
