//! Fixed-capacity frame buffer shared by every write/read cycle of a connection.
//!
//! All multi-byte values are little-endian, the byte order EtherNet/IP uses on the wire.

use heapless::Vec as HeaplessVec;

use crate::error::ProtocolError;
use crate::settings::BUFFER_SIZE;

/// Byte buffer owned by a [`Connection`](crate::Connection).
///
/// Encoding appends at the write position; [`as_slice`](Self::as_slice) then exposes
/// the encoded bytes for transmission. Receiving appends through
/// [`fill_from`](Self::fill_from) after a [`clear`](Self::clear).
#[derive(Debug, Clone, Default)]
pub struct FrameBuffer {
    data: HeaplessVec<u8, BUFFER_SIZE>,
}

impl FrameBuffer {
    /// Creates an empty buffer of [`BUFFER_SIZE`] bytes.
    pub fn new() -> Self {
        Self { data: HeaplessVec::new() }
    }

    /// Fixed capacity, always [`BUFFER_SIZE`].
    pub const fn capacity(&self) -> usize {
        BUFFER_SIZE
    }

    /// Number of bytes written or received since the last clear.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes that can still be written or received before the buffer is full.
    pub fn remaining_capacity(&self) -> usize {
        BUFFER_SIZE - self.data.len()
    }

    /// Resets the buffer for the next encode or receive.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Bytes written or received so far.
    pub fn as_slice(&self) -> &[u8] {
        self.data.as_slice()
    }

    /// Appends one byte.
    pub fn put_u8(&mut self, value: u8) -> Result<(), ProtocolError> {
        self.put_slice(&[value])
    }

    /// Appends a little-endian `u16`.
    pub fn put_u16(&mut self, value: u16) -> Result<(), ProtocolError> {
        self.put_slice(&value.to_le_bytes())
    }

    /// Appends a little-endian `u32`.
    pub fn put_u32(&mut self, value: u32) -> Result<(), ProtocolError> {
        self.put_slice(&value.to_le_bytes())
    }

    /// Appends `bytes`, failing with [`ProtocolError::BufferOverflow`] if they do not fit.
    /// Nothing is written on failure.
    pub fn put_slice(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        let requested = self.data.len() + bytes.len();
        self.data
            .extend_from_slice(bytes)
            .map_err(|_| ProtocolError::BufferOverflow { capacity: BUFFER_SIZE, requested })
    }

    /// Appends bytes produced by `recv`, which is handed the unused tail of the buffer.
    ///
    /// Returns whatever `recv` returned. On error nothing is appended.
    pub fn fill_from<F, E>(&mut self, recv: F) -> Result<usize, E>
    where
        F: FnOnce(&mut [u8]) -> Result<usize, E>,
    {
        let filled = self.data.len();
        // Growing to exactly the capacity cannot fail.
        let _ = self.data.resize(BUFFER_SIZE, 0);
        let result = recv(&mut self.data[filled..]);
        let appended = match &result {
            Ok(n) => (*n).min(BUFFER_SIZE - filled),
            Err(_) => 0,
        };
        self.data.truncate(filled + appended);
        result
    }
}
