//! Custom error types for the library.
//!
//! This module defines the primary error type, `ScopeError`, used by every layer
//! between the session and the controller. Using the `thiserror` crate, it provides
//! a centralized and consistent way to report what went wrong while talking to the
//! oscilloscope.
//!
//! ## Error Hierarchy
//!
//! - **`ResourceUnavailable`**: the session could not be opened. Callers may retry
//!   with a different resource identifier.
//! - **`InstrumentFault`**: the device error queue reported a non-zero code after a
//!   query or command. Carries the command text and the device error string.
//! - **`ProtocolViolation`**: the device did not answer the mandatory
//!   `:SYSTem:ERRor?` query. The link itself is suspect.
//! - **`UnknownSetting`** / **`UnknownWritableField`**: a name that is not present
//!   in the relevant namespace table. These are programming errors.
//! - **`InvalidValue`**: a value outside the declared allow-set. Raised before any
//!   I/O takes place.
//! - **`UnsupportedMode`** / **`InvalidChannel`**: feature gaps and bad selectors.
//! - **`Timeout`**: a bounded wait on the session expired.
//!
//! Nothing in the library swallows these errors or retries them automatically.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the library error type.
pub type Result<T> = std::result::Result<T, ScopeError>;

/// How bad an error is for the link that produced it.
///
/// Ordered so that `LinkFailure` compares greater than `Fatal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// The caller can retry, possibly with different inputs.
    Recoverable,
    /// The in-flight operation is aborted; the link is still usable.
    Fatal,
    /// The link can no longer be trusted.
    LinkFailure,
}

#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum ScopeError {
    #[error("Resource '{resource}' is unavailable: {reason}")]
    ResourceUnavailable { resource: String, reason: String },

    #[error("Instrument fault '{device_error}' after command '{command}'")]
    InstrumentFault {
        command: String,
        device_error: String,
    },

    #[error(":SYSTem:ERRor? returned nothing after command '{command}'")]
    ProtocolViolation { command: String },

    #[error("Unknown setting '{name}' in {namespace}")]
    UnknownSetting { namespace: String, name: String },

    #[error("Unknown writable field '{key}' in {namespace}")]
    UnknownWritableField { namespace: String, key: String },

    #[error("Invalid value '{value}' for '{field}'. Must be one of: {}", allowed.join(", "))]
    InvalidValue {
        field: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("Unsupported mode '{0}'")]
    UnsupportedMode(String),

    #[error("'{0}' is not a known channel. Must be one of: channel1, channel2, channel3, channel4")]
    InvalidChannel(String),

    #[error("Timed out after {}ms waiting for response to '{command}'", timeout.as_millis())]
    Timeout { command: String, timeout: Duration },

    #[error("Session is closed")]
    SessionClosed,

    #[error("Malformed response to '{command}': {response}")]
    MalformedResponse { command: String, response: String },

    #[error("Invalid namespace table: {0}")]
    InvalidTable(String),

    #[error("No resource selected after {attempts} attempts")]
    SelectionExhausted { attempts: u32 },

    #[error("Instrument link lock poisoned")]
    LinkPoisoned,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),
}

impl ScopeError {
    /// Severity used to escalate link-level failures above device faults.
    pub fn severity(&self) -> Severity {
        match self {
            ScopeError::ResourceUnavailable { .. } | ScopeError::SelectionExhausted { .. } => {
                Severity::Recoverable
            }
            ScopeError::ProtocolViolation { .. }
            | ScopeError::Timeout { .. }
            | ScopeError::LinkPoisoned
            | ScopeError::Io(_) => Severity::LinkFailure,
            _ => Severity::Fatal,
        }
    }

    /// Whether the caller may reasonably retry the operation.
    pub fn can_recover(&self) -> bool {
        self.severity() == Severity::Recoverable
    }
}

impl From<figment::Error> for ScopeError {
    fn from(value: figment::Error) -> Self {
        ScopeError::Config(Box::new(value))
    }
}
