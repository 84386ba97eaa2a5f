//! Transport bindings for the encapsulation protocol.
//!
//! A [`Binding`] knows how to open a link to a device; the resulting [`Transport`] moves raw
//! bytes. Neither knows anything about frames: framing, the session handshake and retries
//! live in [`Connection`](crate::Connection), which is generic over the binding.
//!
//! # Features
//!
//! - `transport-tcp` - [`tcp::TcpBinding`], ordered byte stream with session registration
//! - `transport-udp` - [`udp::UdpBinding`], discrete datagrams without a session
//!
//! # Timeouts
//!
//! Both bindings apply [`ConnectionSettings::timeout`] to connecting, sending and receiving,
//! so a silent device surfaces as [`TransportError::Timeout`] instead of blocking forever.

use core::fmt;
use std::net::{SocketAddr, ToSocketAddrs};

use crate::error::TransportError;
use crate::settings::ConnectionSettings;

#[cfg(feature = "transport-tcp")]
pub mod tcp;

#[cfg(feature = "transport-udp")]
pub mod udp;

#[cfg(feature = "transport-tcp")]
pub use tcp::{TcpBinding, TcpTransport};

#[cfg(feature = "transport-udp")]
pub use udp::{UdpBinding, UdpTransport};

/// An open link to a device.
///
/// Implementations handle the low-level details of sending and receiving bytes.
pub trait Transport: fmt::Debug + Send {
    /// Sends all of `data`, failing if any of it cannot be transmitted.
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Receives into `buffer` and returns the number of bytes written.
    ///
    /// `Ok(0)` means the peer closed the link.
    fn recv(&mut self, buffer: &mut [u8]) -> Result<usize, TransportError>;

    /// Releases the link. The transport is dropped right after.
    fn shutdown(&mut self) -> Result<(), TransportError>;
}

/// Opens [`Transport`]s and states whether they need a registered session.
pub trait Binding: fmt::Debug + Send + Sync {
    type Transport: Transport;

    /// Whether [`Connection::connect`](crate::Connection::connect) registers a session
    /// after opening the link, and `close` unregisters it.
    const SESSION_HANDSHAKE: bool;

    /// Opens a link to the device described by `settings` within its timeout.
    fn open(&self, settings: &ConnectionSettings) -> Result<Self::Transport, TransportError>;
}

/// Resolves the device address and port.
pub fn resolve(settings: &ConnectionSettings) -> Result<Vec<SocketAddr>, TransportError> {
    let addrs: Vec<SocketAddr> = (settings.address.as_str(), settings.port)
        .to_socket_addrs()
        .map_err(|_| TransportError::Resolve { address: settings.endpoint() })?
        .collect();
    if addrs.is_empty() {
        return Err(TransportError::Resolve { address: settings.endpoint() });
    }
    Ok(addrs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_literal_address() {
        let settings = ConnectionSettings::new("127.0.0.1", 0).with_port(1234);
        let addrs = resolve(&settings).unwrap();
        assert_eq!(addrs, vec!["127.0.0.1:1234".parse::<SocketAddr>().unwrap()]);
    }

    #[test]
    fn test_resolve_invalid_address() {
        let settings = ConnectionSettings::new("not an address", 0);
        assert!(matches!(resolve(&settings), Err(TransportError::Resolve { .. })));
    }
}
