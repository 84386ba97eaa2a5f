//! Blocking EtherNet/IP encapsulation transport.
//!
//! This crate moves encapsulation frames between a client and an EtherNet/IP device (a PLC,
//! usually) and manages the session they run in. It does not build CIP service requests;
//! those travel as opaque payloads of [`Encapsulation`] requests.
//!
//! # Overview
//!
//! - [`Connection`] owns one link, a fixed 600-byte frame buffer and the session handle.
//!   [`Connection::execute`] sends a request and reads its reply, reconnecting with a
//!   jittered [`Backoff`] when the link fails.
//! - [`TcpConnection`] registers a session on connect and unregisters it on close.
//! - [`UdpConnection`] exchanges datagrams without a session.
//! - [`Request`] is the seam for your own frames: encode into a [`FrameBuffer`], report the
//!   expected reply size from a partial reply, decode the complete one.
//!
//! # Features
//!
//! - `transport-tcp` (default) - TCP binding
//! - `transport-udp` (default) - UDP binding
//! - `serde` - `Serialize`/`Deserialize` for [`ConnectionSettings`]
//!
//! # Logging
//!
//! Events are emitted through [`tracing`]: new connections and session registration at
//! `info`, connects and failed attempts at `debug`, retries and teardown failures at `warn`,
//! and hex dumps of every frame at `trace`.

pub mod backoff;
pub mod buffer;
pub mod connection;
pub mod encapsulation;
pub mod error;
pub mod hexdump;
pub mod protocol;
pub mod session;
pub mod settings;
pub mod transport;

pub use backoff::Backoff;
pub use buffer::FrameBuffer;
pub use connection::Connection;
#[cfg(feature = "transport-tcp")]
pub use connection::TcpConnection;
#[cfg(feature = "transport-udp")]
pub use connection::UdpConnection;
pub use encapsulation::{
    Command, Encapsulation, EncapsulationHeader, EncapsulationStatus, HEADER_SIZE, Payload,
    RawPayload,
};
pub use error::{Error, ProtocolError, Result, TransportError};
pub use protocol::{Decoder, Encoder, Request, SessionId};
pub use session::{PROTOCOL_VERSION, RegisterSession, unregister_session};
pub use settings::{
    BUFFER_SIZE, ConnectionSettings, DEFAULT_PORT, DEFAULT_RETRIES, DEFAULT_RETRY_DELAY_MS,
    DEFAULT_TIMEOUT_MS,
};
pub use transport::{Binding, Transport};
