//! Encoder/decoder capabilities through which requests reach the wire.
//!
//! A [`Connection`](crate::Connection) knows nothing about command layouts. It hands
//! its [`FrameBuffer`] to an [`Encoder`] before sending and asks a [`Decoder`] how many
//! bytes a complete reply needs before parsing it.

use crate::buffer::FrameBuffer;
use crate::error::ProtocolError;

/// Session identifier allocated by the device. `0` means unregistered.
pub type SessionId = u32;

/// Serializes a logical request into the frame buffer.
pub trait Encoder {
    /// Appends the request at the buffer's write position.
    ///
    /// Fails with [`ProtocolError::BufferOverflow`] if the request does not fit.
    fn encode(&self, buffer: &mut FrameBuffer) -> Result<(), ProtocolError>;
}

/// Sizes and parses a logical response.
pub trait Decoder {
    /// The parsed reply.
    type Response;

    /// Total number of bytes the complete response occupies, judged from the bytes
    /// received so far.
    ///
    /// When too few bytes have arrived to tell, implementations return a value larger
    /// than `received.len()` so that the caller keeps reading.
    fn response_size(&self, received: &[u8]) -> usize;

    /// Parses exactly one response. Trailing bytes are a protocol violation.
    fn decode(&self, data: &[u8]) -> Result<Self::Response, ProtocolError>;
}

/// A request that can be passed to [`Connection::execute`](crate::Connection::execute).
pub trait Request: Encoder + Decoder {
    /// Patches the session identifier carried by this request.
    ///
    /// Called by `execute` after a (re)connect so that requests built before the session
    /// was known go out with the current one. Requests that carry no session keep the
    /// default no-op.
    fn rebind_session(&mut self, _session: SessionId) {}
}
