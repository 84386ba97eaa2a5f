//! UDP binding.
//!
//! Each receive yields at most one datagram, so a reply spread over several datagrams is
//! assembled by the connection's read loop like a fragmented TCP stream. There is no
//! session handshake on this binding; requests keep whatever session they were built with.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use tracing::trace;

use super::{Binding, Transport, resolve};
use crate::error::TransportError;
use crate::settings::ConnectionSettings;

/// Opens [`UdpTransport`]s. Connections over this binding never register a session.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpBinding;

impl Binding for UdpBinding {
    type Transport = UdpTransport;

    const SESSION_HANDSHAKE: bool = false;

    fn open(&self, settings: &ConnectionSettings) -> Result<UdpTransport, TransportError> {
        UdpTransport::connect(settings)
    }
}

/// UDP socket bound to an ephemeral local port and connected to one device.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    remote: SocketAddr,
    timeout: Duration,
}

impl UdpTransport {
    /// Binds a local endpoint and records the device as the only peer.
    pub fn connect(settings: &ConnectionSettings) -> Result<Self, TransportError> {
        let remote = resolve(settings)?[0];
        let timeout = settings.timeout();
        let socket = bind_for(remote)
            .and_then(|socket| {
                socket.set_read_timeout(Some(timeout))?;
                socket.set_write_timeout(Some(timeout))?;
                socket.connect(remote)?;
                Ok(socket)
            })
            .map_err(|source| TransportError::Connect { address: settings.endpoint(), source })?;
        Ok(Self { socket, remote, timeout })
    }

    /// Device endpoint that every datagram is sent to and accepted from.
    pub fn peer_addr(&self) -> SocketAddr {
        self.remote
    }
}

fn bind_for(remote: SocketAddr) -> io::Result<UdpSocket> {
    match remote {
        SocketAddr::V4(_) => UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)),
        SocketAddr::V6(_) => UdpSocket::bind((Ipv6Addr::UNSPECIFIED, 0)),
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let sent =
            self.socket.send(data).map_err(|err| TransportError::from_io(err, self.timeout))?;
        if sent != data.len() {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("datagram truncated to {sent} of {} bytes", data.len()),
            )));
        }
        Ok(())
    }

    fn recv(&mut self, buffer: &mut [u8]) -> Result<usize, TransportError> {
        loop {
            match self.socket.recv(buffer) {
                // An empty datagram carries nothing and must not read as end of stream.
                Ok(0) if !buffer.is_empty() => trace!("Skipping empty datagram"),
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(TransportError::from_io(err, self.timeout)),
            }
        }
    }

    fn shutdown(&mut self) -> Result<(), TransportError> {
        // Dropping the socket releases the local endpoint.
        Ok(())
    }
}
