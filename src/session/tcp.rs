//! SCPI over a raw TCP socket.
//!
//! Keysight InfiniiVision scopes listen for SCPI on port 5025. Commands are
//! newline terminated; binary payloads arrive as IEEE 488.2 definite-length
//! blocks (`#<n><length><payload>`), followed by a newline.

use super::Session;
use crate::error::{Result, ScopeError};
use bytes::Bytes;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Default SCPI socket port
pub const DEFAULT_PORT: u16 = 5025;

/// Largest binary block accepted from the instrument.
pub const MAX_BLOCK_LEN: usize = 10_000_000;

/// Blocking SCPI client with bounded waits on every read and write.
pub struct TcpSession {
    resource: String,
    stream: Option<BufReader<TcpStream>>,
    timeout: Duration,
}

impl TcpSession {
    /// Connect to `host:port`, trying each resolved address in turn.
    ///
    /// # Arguments
    /// * `resource` - identifier reported by [`Session::resource`]
    /// * `host` - hostname or IP address
    /// * `port` - TCP port (typically [`DEFAULT_PORT`])
    /// * `timeout` - applied to connect, every read and every write
    pub fn connect(resource: &str, host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let unavailable = |reason: String| ScopeError::ResourceUnavailable {
            resource: resource.to_string(),
            reason,
        };

        let addrs = (host, port)
            .to_socket_addrs()
            .map_err(|e| unavailable(format!("cannot resolve {host}:{port}: {e}")))?;

        let mut last_err = None;
        let mut connected = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    connected = Some(stream);
                    break;
                }
                Err(e) => last_err = Some(e),
            }
        }
        let stream = connected.ok_or_else(|| {
            unavailable(match last_err {
                Some(e) => format!("failed to connect to {host}:{port}: {e}"),
                None => format!("{host} resolved to no addresses"),
            })
        })?;

        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;

        tracing::info!(resource, "Connected to {}:{}", host, port);

        Ok(Self {
            resource: resource.to_string(),
            stream: Some(BufReader::new(stream)),
            timeout,
        })
    }

    fn stream(&mut self) -> Result<&mut BufReader<TcpStream>> {
        self.stream.as_mut().ok_or(ScopeError::SessionClosed)
    }

    fn send(&mut self, text: &str) -> Result<()> {
        let timeout = self.timeout;
        let stream = self.stream()?;
        let line = format!("{text}\n");
        stream
            .get_mut()
            .write_all(line.as_bytes())
            .and_then(|_| stream.get_mut().flush())
            .map_err(|e| map_io(e, text, timeout))
    }
}

impl Session for TcpSession {
    fn query(&mut self, text: &str) -> Result<String> {
        self.send(text)?;
        let timeout = self.timeout;
        let stream = self.stream()?;

        let mut response = String::new();
        match stream.read_line(&mut response) {
            Ok(0) => Err(ScopeError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by device",
            ))),
            Ok(_) => Ok(response.trim_end_matches(['\r', '\n']).to_string()),
            Err(e) => Err(map_io(e, text, timeout)),
        }
    }

    fn write(&mut self, text: &str) -> Result<()> {
        self.send(text)
    }

    fn query_binary(&mut self, text: &str) -> Result<Bytes> {
        self.send(text)?;
        let timeout = self.timeout;
        let stream = self.stream()?;
        read_block(stream, text).map_err(|e| match e {
            ScopeError::Io(io) => map_io(io, text, timeout),
            other => other,
        })
    }

    fn close(&mut self) -> Result<()> {
        let stream = self.stream.take().ok_or(ScopeError::SessionClosed)?;
        // The peer may already have gone away; the socket is dropped regardless.
        if let Err(e) = stream.get_ref().shutdown(Shutdown::Both) {
            tracing::debug!(resource = %self.resource, "shutdown: {}", e);
        }
        tracing::info!(resource = %self.resource, "Session closed");
        Ok(())
    }

    fn resource(&self) -> &str {
        &self.resource
    }
}

fn map_io(err: io::Error, command: &str, timeout: Duration) -> ScopeError {
    match err.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => ScopeError::Timeout {
            command: command.to_string(),
            timeout,
        },
        _ => ScopeError::Io(err),
    }
}

/// Read one IEEE 488.2 block from `reader`, consuming the trailing newline.
///
/// `#0` (indefinite length) blocks run up to the terminating newline.
pub fn read_block<R: BufRead>(reader: &mut R, command: &str) -> Result<Bytes> {
    let malformed = |response: String| ScopeError::MalformedResponse {
        command: command.to_string(),
        response,
    };

    let mut header = [0u8; 2];
    reader.read_exact(&mut header)?;
    if header[0] != b'#' || !header[1].is_ascii_digit() {
        return Err(malformed(format!(
            "expected block header, got {:?}",
            String::from_utf8_lossy(&header)
        )));
    }

    let digits = usize::from(header[1] - b'0');
    if digits == 0 {
        let mut payload = Vec::new();
        reader.read_until(b'\n', &mut payload)?;
        if payload.last() == Some(&b'\n') {
            payload.pop();
        }
        return Ok(Bytes::from(payload));
    }

    let mut len_buf = vec![0u8; digits];
    reader.read_exact(&mut len_buf)?;
    let len = std::str::from_utf8(&len_buf)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| {
            malformed(format!(
                "bad block length {:?}",
                String::from_utf8_lossy(&len_buf)
            ))
        })?;
    if len > MAX_BLOCK_LEN {
        return Err(malformed(format!("block of {len} bytes exceeds {MAX_BLOCK_LEN}")));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;

    // Swallow the terminator so the next query starts on a clean line.
    if reader.fill_buf()?.first() == Some(&b'\n') {
        reader.consume(1);
    }

    Ok(Bytes::from(payload))
}
