//! Error types for the EtherNet/IP transport.
//!
//! Errors are split by what a retry can fix:
//! - [`TransportError`] covers link-level faults.
//!   [`Connection::execute`](crate::Connection::execute) closes the link and retries these.
//! - [`ProtocolError`] covers structurally wrong frames. These are surfaced immediately.
//! - [`Error::RetryExhausted`] wraps the last [`TransportError`] once the retry budget is spent.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::encapsulation::{Command, EncapsulationStatus};

/// Link-level failure: resolving, connecting, sending, receiving or timing out.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The device address did not resolve to any socket address.
    #[error("could not resolve device address {address}")]
    Resolve { address: String },
    /// The link to the device could not be established.
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },
    /// A send or receive did not complete within the configured timeout.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// The peer closed the link before a complete message arrived.
    #[error("end of stream after {received} of {expected} bytes")]
    UnexpectedEof { received: usize, expected: usize },
    /// An operation needed an open link but none was present.
    #[error("not connected")]
    NotConnected,
    /// Any other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Maps an I/O error, turning socket timeouts into [`TransportError::Timeout`].
    ///
    /// Blocking sockets with a read timeout report expiry as `WouldBlock` on Unix
    /// and `TimedOut` on Windows.
    pub fn from_io(err: io::Error, timeout: Duration) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => TransportError::Timeout(timeout),
            _ => TransportError::Io(err),
        }
    }
}

/// A frame that could not be encoded or does not decode to a valid response.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Encoding would write past the end of the frame buffer.
    #[error("request needs {requested} bytes but the buffer holds {capacity}")]
    BufferOverflow { capacity: usize, requested: usize },
    /// The announced response size does not fit in the frame buffer.
    #[error("response of {size} bytes exceeds buffer capacity {capacity}")]
    ResponseTooLarge { size: usize, capacity: usize },
    /// Fewer bytes than the frame requires.
    #[error("response truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    /// More bytes than the frame announces.
    #[error("unexpected trailing bytes: expected {expected} bytes, got {actual}")]
    TrailingBytes { expected: usize, actual: usize },
    /// The reply echoes a different command than the request.
    #[error("expected reply to {expected:?}, got {actual:?}")]
    UnexpectedCommand { expected: Command, actual: Command },
    /// The reply carries a command code this crate does not know.
    #[error("unknown encapsulation command 0x{0:04X}")]
    UnknownCommand(u16),
    /// The device rejected the request.
    #[error("device returned status {0}")]
    Status(EncapsulationStatus),
    /// The reply belongs to another session.
    #[error("session mismatch: expected 0x{expected:08X}, got 0x{actual:08X}")]
    SessionMismatch { expected: u32, actual: u32 },
    /// The payload could not be parsed.
    #[error("malformed response: {0}")]
    Malformed(&'static str),
}

/// Top-level error returned by [`Connection`](crate::Connection) operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// Every attempt allowed by the retry budget failed at the transport level.
    #[error("failed to execute {attempts} times")]
    RetryExhausted {
        attempts: u32,
        #[source]
        last: TransportError,
    },
}

impl Error {
    /// Whether [`Connection::execute`](crate::Connection::execute) may retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
