//! Instrument link: the single choke point for all instrument I/O.
//!
//! Every query and command that passes through [`InstrumentLink`] is followed by a
//! poll of the device error queue (`:SYSTem:ERRor?`). A reply starting with code `0`
//! confirms the exchange; any other code aborts the operation with
//! [`ScopeError::InstrumentFault`], and an empty reply aborts it with
//! [`ScopeError::ProtocolViolation`]. Nothing is retried.

use crate::error::{Result, ScopeError};
use crate::session::Session;
use bytes::Bytes;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::{Arc, Mutex, MutexGuard};

/// Query that reads one entry of the device error queue.
pub const ERROR_QUERY: &str = ":SYSTem:ERRor?";

static ERROR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([+-]?\d+)\s*(?:,\s*(.*))?$").expect("Invalid error-queue regex")
});

/// Link shared between the controller and every facade.
///
/// The mutex serialises whole request/response pairs, including the error poll.
pub type SharedLink = Arc<Mutex<InstrumentLink>>;

/// Lock a shared link for one exchange.
pub fn lock(link: &SharedLink) -> Result<MutexGuard<'_, InstrumentLink>> {
    link.lock().map_err(|_| ScopeError::LinkPoisoned)
}

/// Outcome of parsing one `:SYSTem:ERRor?` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorStatus {
    /// Code 0.
    NoError,
    /// Any other code, or text without a leading code.
    Fault(String),
    /// Nothing at all.
    Empty,
}

impl ErrorStatus {
    /// Classify a raw error-queue reply.
    pub fn parse(reply: &str) -> Self {
        let reply = reply.trim();
        if reply.is_empty() {
            return ErrorStatus::Empty;
        }
        match ERROR_RE
            .captures(reply)
            .and_then(|caps| caps.get(1))
            .and_then(|code| code.as_str().parse::<i64>().ok())
        {
            Some(0) => ErrorStatus::NoError,
            _ => ErrorStatus::Fault(reply.to_string()),
        }
    }
}

/// Wraps exactly one [`Session`] and verifies every exchange against the
/// instrument's error queue.
pub struct InstrumentLink {
    session: Option<Box<dyn Session>>,
    resource: String,
    verbose: bool,
}

impl InstrumentLink {
    /// Take ownership of an open session.
    pub fn new(session: Box<dyn Session>, verbose: bool) -> Self {
        let resource = session.resource().to_string();
        Self {
            session: Some(session),
            resource,
            verbose,
        }
    }

    /// Wrap the link for sharing with facades.
    pub fn into_shared(self) -> SharedLink {
        Arc::new(Mutex::new(self))
    }

    /// Resource identifier of the underlying session.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Whether transmitted commands and results are logged at `info` level.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Enable or disable verbose I/O logging.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.session.is_none()
    }

    fn session(&mut self) -> Result<&mut Box<dyn Session>> {
        self.session.as_mut().ok_or(ScopeError::SessionClosed)
    }

    /// Send `bare_command?`, verify the error queue, and return the trimmed reply.
    pub fn query(&mut self, bare_command: &str) -> Result<String> {
        let command = format!("{bare_command}?");
        let response = self.session()?.query(&command)?;
        self.check_errors(&command)?;

        let response = response.trim().to_string();
        io_event!(self.verbose, command = %command, result = %response, "Query");
        Ok(response)
    }

    /// Send `bare_command` as a write-only directive, then verify the error queue.
    pub fn command(&mut self, bare_command: &str) -> Result<()> {
        io_event!(self.verbose, command = bare_command, "Writing command");
        self.session()?.write(bare_command)?;
        self.check_errors(bare_command)
    }

    /// Send `bare_command?` expecting a binary payload, then verify the error queue.
    pub fn query_binary(&mut self, bare_command: &str) -> Result<Bytes> {
        let command = format!("{bare_command}?");
        let payload = self.session()?.query_binary(&command)?;
        self.check_errors(&command)?;

        io_event!(self.verbose, command = %command, bytes = payload.len(), "Binary query");
        Ok(payload)
    }

    /// Poll `:SYSTem:ERRor?` once, attributing any fault to `command`.
    pub fn check_errors(&mut self, command: &str) -> Result<()> {
        let reply = self.session()?.query(ERROR_QUERY)?;
        match ErrorStatus::parse(&reply) {
            ErrorStatus::NoError => Ok(()),
            ErrorStatus::Fault(device_error) => {
                tracing::error!(
                    command,
                    device_error = %device_error,
                    "Instrument reported an error"
                );
                Err(ScopeError::InstrumentFault {
                    command: command.to_string(),
                    device_error,
                })
            }
            ErrorStatus::Empty => {
                tracing::error!(command, "{} returned nothing", ERROR_QUERY);
                Err(ScopeError::ProtocolViolation {
                    command: command.to_string(),
                })
            }
        }
    }

    /// Release the session. A second call fails with `SessionClosed`.
    pub fn close(&mut self) -> Result<()> {
        let mut session = self.session.take().ok_or(ScopeError::SessionClosed)?;
        tracing::info!(resource = %self.resource, "Closing instrument link");
        session.close()
    }
}

impl Drop for InstrumentLink {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close() {
                tracing::warn!(resource = %self.resource, "Failed to close session on drop: {}", e);
            }
        }
    }
}
