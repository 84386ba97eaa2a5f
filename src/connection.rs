//! Connection to an EtherNet/IP device.
//!
//! A [`Connection`] owns the link, the frame buffer and the session handle for its whole
//! lifetime. [`execute`](Connection::execute) ties connect, write and read into one
//! operation that survives transient link failures:
//!
//! 1. Connect if needed. On a session-registering binding this runs the handshake and the
//!    request is rebound to the new session.
//! 2. Write the request, then read until the decoder reports a complete reply.
//! 3. On a [`TransportError`], close the link (dropping the session), wait a jittered
//!    [`Backoff`] delay and start over, up to the retry limit.
//!
//! [`ProtocolError`]s are returned at once: a malformed reply will not improve on retry.
//!
//! # Examples
//!
//! ```no_run
//! # #[cfg(feature = "transport-tcp")]
//! # {
//! use etherip::{Command, ConnectionSettings, Encapsulation, RawPayload, TcpConnection};
//!
//! # fn example() -> etherip::Result<()> {
//! let connection = TcpConnection::new(ConnectionSettings::new("192.168.1.10", 0));
//! connection.connect()?;
//! println!("Session 0x{:08X}", connection.session());
//!
//! let session = connection.session();
//! let mut request = Encapsulation::new(Command::SendRRData, session, RawPayload(vec![]));
//! let reply = connection.execute(&mut request)?;
//! # let _ = reply;
//! connection.close();
//! # Ok(())
//! # }
//! # }
//! ```

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::backoff::Backoff;
use crate::buffer::FrameBuffer;
use crate::error::{Error, ProtocolError, Result, TransportError};
use crate::hexdump::Hexdump;
use crate::protocol::{Decoder, Encoder, Request, SessionId};
use crate::session::{RegisterSession, unregister_session};
use crate::settings::ConnectionSettings;
use crate::transport::{Binding, Transport};

#[cfg(feature = "transport-tcp")]
use crate::transport::TcpBinding;
#[cfg(feature = "transport-udp")]
use crate::transport::UdpBinding;

/// Connection over TCP; registers a session on connect.
#[cfg(feature = "transport-tcp")]
pub type TcpConnection = Connection<TcpBinding>;

/// Connection over UDP; the session stays `0`.
#[cfg(feature = "transport-udp")]
pub type UdpConnection = Connection<UdpBinding>;

/// State guarded by the connection lock.
#[derive(Debug)]
struct Link<T> {
    transport: Option<T>,
    buffer: FrameBuffer,
}

/// Connection to an EtherNet/IP device over binding `B`.
///
/// All operations take `&self` and are serialized by an internal lock, so a connection can
/// be shared between threads; concurrent calls queue up rather than interleave.
#[derive(Debug)]
pub struct Connection<B: Binding> {
    binding: B,
    settings: ConnectionSettings,
    backoff: Backoff,
    open: AtomicBool,
    session: AtomicU32,
    link: Mutex<Link<B::Transport>>,
}

impl<B: Binding + Default> Connection<B> {
    /// Creates a closed connection. Nothing is sent until [`connect`](Self::connect) or
    /// [`execute`](Self::execute).
    pub fn new(settings: ConnectionSettings) -> Self {
        Self::with_binding(B::default(), settings)
    }
}

impl<B: Binding> Connection<B> {
    /// Creates a closed connection that opens its links through `binding`.
    pub fn with_binding(binding: B, settings: ConnectionSettings) -> Self {
        info!("Created connection to {} (slot {})", settings.endpoint(), settings.slot);
        let backoff = Backoff::new(settings.retry_delay());
        Self {
            binding,
            settings,
            backoff,
            open: AtomicBool::new(false),
            session: AtomicU32::new(0),
            link: Mutex::new(Link { transport: None, buffer: FrameBuffer::new() }),
        }
    }

    /// Replaces the retry backoff, e.g. with a seeded one.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Settings this connection was created with.
    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Device host name or IP address.
    pub fn address(&self) -> &str {
        &self.settings.address
    }

    /// Device encapsulation port.
    pub fn port(&self) -> u16 {
        self.settings.port
    }

    /// Controller slot within the PLC crate.
    pub fn slot(&self) -> u8 {
        self.settings.slot
    }

    /// Timeout applied to connecting, sending and receiving.
    pub fn timeout(&self) -> Duration {
        self.settings.timeout()
    }

    /// Session handle of the current link, `0` while unregistered.
    pub fn session(&self) -> SessionId {
        self.session.load(Ordering::Acquire)
    }

    /// Whether a link is currently open. Cleared by `close` and by failed attempts.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Opens the link and, if the binding requires it, registers a session.
    ///
    /// Does nothing if the connection is already open.
    pub fn connect(&self) -> Result<()> {
        let mut link = self.lock();
        self.connect_locked(&mut link)
    }

    /// Encodes `encoder` into the frame buffer and sends it.
    pub fn write<E: Encoder + ?Sized>(&self, encoder: &E) -> Result<()> {
        let mut link = self.lock();
        let Link { transport, buffer } = &mut *link;
        let transport = transport.as_mut().ok_or(TransportError::NotConnected)?;
        transmit(transport, buffer, encoder)
    }

    /// Receives one complete reply and decodes it.
    ///
    /// A reply too large for the frame buffer closes the link, since its unread tail would
    /// otherwise be taken for the start of the next reply.
    pub fn read<D: Decoder + ?Sized>(&self, decoder: &D) -> Result<D::Response> {
        let mut link = self.lock();
        let Link { transport, buffer } = &mut *link;
        let transport = transport.as_mut().ok_or(TransportError::NotConnected)?;
        let result = receive(transport, buffer, decoder);
        if let Err(err @ Error::Protocol(ProtocolError::ResponseTooLarge { .. })) = &result {
            debug!("Dropping link to {} after {}", self.settings.endpoint(), err);
            self.close_locked(&mut link);
        }
        result
    }

    /// Sends `request` and returns its decoded reply, reconnecting and retrying on
    /// transport failures.
    ///
    /// After a (re)connect that registered a session, `request` is rebound to that session
    /// before it is sent, so its session field is current once this returns.
    ///
    /// # Errors
    ///
    /// - [`Error::RetryExhausted`] once every attempt allowed by
    ///   [`ConnectionSettings::retry_limit`] has failed at the transport level.
    /// - [`Error::Protocol`] from the first malformed reply or failed handshake, without
    ///   retrying. A reply too large for the frame buffer also closes the link.
    pub fn execute<R: Request + ?Sized>(&self, request: &mut R) -> Result<R::Response> {
        let limit = self.settings.retry_limit();
        let mut link = self.lock();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt(&mut link, request) {
                Ok(response) => return Ok(response),
                Err(Error::Transport(err)) => {
                    let endpoint = self.settings.endpoint();
                    debug!("Attempt {}/{} to {} failed: {}", attempt, limit, endpoint, err);
                    self.close_locked(&mut link);
                    if attempt >= limit {
                        return Err(Error::RetryExhausted { attempts: attempt, last: err });
                    }
                    let delay = self.backoff.delay(attempt);
                    warn!("Retrying {} in {:?} after: {}", endpoint, delay, err);
                    thread::sleep(delay);
                }
                Err(err @ Error::Protocol(ProtocolError::ResponseTooLarge { .. })) => {
                    debug!("Dropping link to {} after {}", self.settings.endpoint(), err);
                    self.close_locked(&mut link);
                    return Err(err);
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Closes the link.
    ///
    /// On a session-registering binding with a registered session, `UnRegisterSession` is sent
    /// first. Its reply is not awaited, since the device drops the link right away. Failures
    /// while tearing down are logged and discarded.
    pub fn close(&self) {
        let mut link = self.lock();
        self.close_locked(&mut link);
    }

    fn lock(&self) -> MutexGuard<'_, Link<B::Transport>> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn attempt<R: Request + ?Sized>(
        &self,
        link: &mut Link<B::Transport>,
        request: &mut R,
    ) -> Result<R::Response> {
        if link.transport.is_none() {
            self.connect_locked(link)?;
            if B::SESSION_HANDSHAKE {
                request.rebind_session(self.session());
            }
        }
        let Link { transport, buffer } = link;
        let transport = transport.as_mut().ok_or(TransportError::NotConnected)?;
        transmit(transport, buffer, &*request)?;
        receive(transport, buffer, &*request)
    }

    fn connect_locked(&self, link: &mut Link<B::Transport>) -> Result<()> {
        if link.transport.is_some() {
            return Ok(());
        }
        debug!("Connecting to {}", self.settings.endpoint());
        let mut transport = self.binding.open(&self.settings)?;
        if B::SESSION_HANDSHAKE {
            let session = match register(&mut transport, &mut link.buffer) {
                Ok(session) => session,
                Err(err) => {
                    discard_shutdown(&mut transport);
                    return Err(err);
                }
            };
            info!("Registered session 0x{:08X} with {}", session, self.settings.endpoint());
            self.session.store(session, Ordering::Release);
        }
        link.transport = Some(transport);
        self.open.store(true, Ordering::Release);
        Ok(())
    }

    fn close_locked(&self, link: &mut Link<B::Transport>) {
        let session = self.session.swap(0, Ordering::AcqRel);
        self.open.store(false, Ordering::Release);
        let Some(mut transport) = link.transport.take() else {
            return;
        };
        if B::SESSION_HANDSHAKE && session != 0 {
            let request = unregister_session(session);
            if let Err(err) = transmit(&mut transport, &mut link.buffer, &request) {
                warn!("Error un-registering session 0x{:08X}: {}", session, err);
            }
        }
        discard_shutdown(&mut transport);
        debug!("Closed connection to {}", self.settings.endpoint());
    }
}

impl<B: Binding> Drop for Connection<B> {
    fn drop(&mut self) {
        if self.is_open() {
            self.close();
        }
    }
}

/// Runs the session handshake on a freshly opened link.
fn register<T>(transport: &mut T, buffer: &mut FrameBuffer) -> Result<SessionId>
where
    T: Transport + ?Sized,
{
    let request = RegisterSession::new();
    transmit(transport, buffer, &request)?;
    receive(transport, buffer, &request)
}

fn discard_shutdown<T: Transport + ?Sized>(transport: &mut T) {
    if let Err(err) = transport.shutdown() {
        warn!("Error shutting down link: {}", err);
    }
}

fn transmit<T, E>(transport: &mut T, buffer: &mut FrameBuffer, encoder: &E) -> Result<()>
where
    T: Transport + ?Sized,
    E: Encoder + ?Sized,
{
    buffer.clear();
    encoder.encode(buffer)?;
    trace!("Data sent ({} bytes):\n{}", buffer.len(), Hexdump(buffer.as_slice()));
    transport.send(buffer.as_slice())?;
    Ok(())
}

fn receive<T, D>(transport: &mut T, buffer: &mut FrameBuffer, decoder: &D) -> Result<D::Response>
where
    T: Transport + ?Sized,
    D: Decoder + ?Sized,
{
    buffer.clear();
    fill_frame(transport, buffer, |received| decoder.response_size(received))?;
    trace!("Data read ({} bytes):\n{}", buffer.len(), Hexdump(buffer.as_slice()));
    Ok(decoder.decode(buffer.as_slice())?)
}

/// Appends received bytes until `response_size` is satisfied by what has arrived.
///
/// Always receives at least once. Chunk boundaries do not matter: the size is re-evaluated
/// over everything received after each chunk.
fn fill_frame<T, F>(transport: &mut T, buffer: &mut FrameBuffer, response_size: F) -> Result<()>
where
    T: Transport + ?Sized,
    F: Fn(&[u8]) -> usize,
{
    loop {
        if buffer.remaining_capacity() == 0 {
            return Err(ProtocolError::ResponseTooLarge {
                size: response_size(buffer.as_slice()),
                capacity: buffer.capacity(),
            }
            .into());
        }
        let received = buffer.fill_from(|spare| transport.recv(spare))?;
        let expected = response_size(buffer.as_slice());
        if received == 0 {
            return Err(TransportError::UnexpectedEof { received: buffer.len(), expected }.into());
        }
        if buffer.len() >= expected {
            return Ok(());
        }
    }
}
