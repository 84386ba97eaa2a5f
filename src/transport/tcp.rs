//! TCP binding.
//!
//! Sockets are configured through `socket2` before connecting: address reuse, keep-alive,
//! a one second linger so that a pending `UnRegisterSession` is flushed on close, and
//! `TCP_NODELAY` since every request waits for its reply.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::debug;

use super::{Binding, Transport, resolve};
use crate::error::TransportError;
use crate::settings::ConnectionSettings;

/// How long `close` may block flushing unsent data.
pub const LINGER: Duration = Duration::from_secs(1);

/// Opens [`TcpTransport`]s. Connections over this binding register a session.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpBinding;

impl Binding for TcpBinding {
    type Transport = TcpTransport;

    const SESSION_HANDSHAKE: bool = true;

    fn open(&self, settings: &ConnectionSettings) -> Result<TcpTransport, TransportError> {
        TcpTransport::connect(settings)
    }
}

/// Blocking TCP stream to a device.
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
    timeout: Duration,
}

impl TcpTransport {
    /// Connects to the device, trying each resolved address in turn.
    pub fn connect(settings: &ConnectionSettings) -> Result<Self, TransportError> {
        let timeout = settings.timeout();
        let mut last_err = None;
        for addr in resolve(settings)? {
            match open_stream(addr, timeout) {
                Ok(stream) => return Ok(Self { stream, timeout }),
                Err(err) => {
                    debug!("Connecting to {} failed: {}", addr, err);
                    last_err = Some(err);
                }
            }
        }
        Err(TransportError::Connect {
            address: settings.endpoint(),
            source: last_err.unwrap_or_else(|| io::Error::from(io::ErrorKind::AddrNotAvailable)),
        })
    }

    /// Address of the device this stream is connected to.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }
}

fn open_stream(addr: SocketAddr, timeout: Duration) -> io::Result<TcpStream> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_keepalive(true)?;
    socket.set_linger(Some(LINGER))?;
    socket.set_nodelay(true)?;
    socket.connect_timeout(&addr.into(), timeout)?;
    socket.set_read_timeout(Some(timeout))?;
    socket.set_write_timeout(Some(timeout))?;
    Ok(socket.into())
}

impl Transport for TcpTransport {
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.stream
            .write_all(data)
            .and_then(|()| self.stream.flush())
            .map_err(|err| TransportError::from_io(err, self.timeout))
    }

    fn recv(&mut self, buffer: &mut [u8]) -> Result<usize, TransportError> {
        loop {
            match self.stream.read(buffer) {
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                result => return result.map_err(|err| TransportError::from_io(err, self.timeout)),
            }
        }
    }

    fn shutdown(&mut self) -> Result<(), TransportError> {
        match self.stream.shutdown(Shutdown::Both) {
            // The device usually drops the link first after UnRegisterSession.
            Err(err) if err.kind() == io::ErrorKind::NotConnected => Ok(()),
            result => result.map_err(TransportError::Io),
        }
    }
}
