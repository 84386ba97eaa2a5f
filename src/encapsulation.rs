//! EtherNet/IP encapsulation header and session-bearing requests.
//!
//! Every message on the encapsulation port starts with a fixed 24-byte header:
//!
//! ```text
//! +---------+--------+---------+--------+----------------+---------+------------+
//! | Command | Length | Session | Status | Sender Context | Options | Payload... |
//! |   u16   |  u16   |   u32   |  u32   |    [u8; 8]     |   u32   | Length     |
//! +---------+--------+---------+--------+----------------+---------+------------+
//! ```
//!
//! All fields are little-endian. `Length` counts payload bytes only, so the frame size
//! is known as soon as the first four bytes have arrived.

use core::fmt;

use derive_try_from_primitive::TryFromPrimitive;
use nom::IResult;
use nom::number::complete::{le_u16, le_u32, le_u64};

use crate::buffer::FrameBuffer;
use crate::error::ProtocolError;
use crate::protocol::{Decoder, Encoder, Request, SessionId};

/// Size of the encapsulation header in bytes.
pub const HEADER_SIZE: usize = 24;

/// Encapsulation command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u16)]
pub enum Command {
    Nop = 0x0000,
    ListServices = 0x0004,
    ListIdentity = 0x0063,
    ListInterfaces = 0x0064,
    RegisterSession = 0x0065,
    UnRegisterSession = 0x0066,
    SendRRData = 0x006F,
    SendUnitData = 0x0070,
}

impl Command {
    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}

/// Status field of the encapsulation header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncapsulationStatus {
    Success,
    InvalidCommand,
    InsufficientMemory,
    IncorrectData,
    InvalidSession,
    InvalidLength,
    UnsupportedProtocolVersion,
    Other(u32),
}

impl EncapsulationStatus {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0x0000 => Self::Success,
            0x0001 => Self::InvalidCommand,
            0x0002 => Self::InsufficientMemory,
            0x0003 => Self::IncorrectData,
            0x0064 => Self::InvalidSession,
            0x0065 => Self::InvalidLength,
            0x0069 => Self::UnsupportedProtocolVersion,
            other => Self::Other(other),
        }
    }

    pub const fn as_u32(self) -> u32 {
        match self {
            Self::Success => 0x0000,
            Self::InvalidCommand => 0x0001,
            Self::InsufficientMemory => 0x0002,
            Self::IncorrectData => 0x0003,
            Self::InvalidSession => 0x0064,
            Self::InvalidLength => 0x0065,
            Self::UnsupportedProtocolVersion => 0x0069,
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for EncapsulationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Success => "success",
            Self::InvalidCommand => "invalid or unsupported command",
            Self::InsufficientMemory => "insufficient memory",
            Self::IncorrectData => "incorrect data",
            Self::InvalidSession => "invalid session handle",
            Self::InvalidLength => "invalid length",
            Self::UnsupportedProtocolVersion => "unsupported protocol version",
            Self::Other(_) => "unknown status",
        };
        write!(f, "{} (0x{:04X})", text, self.as_u32())
    }
}

/// Decoded encapsulation header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncapsulationHeader {
    pub command: Command,
    /// Payload length in bytes, excluding the header.
    pub length: u16,
    pub session: SessionId,
    pub status: EncapsulationStatus,
    pub context: [u8; 8],
    pub options: u32,
}

impl EncapsulationHeader {
    pub fn new(command: Command, length: u16, session: SessionId) -> Self {
        Self {
            command,
            length,
            session,
            status: EncapsulationStatus::Success,
            context: [0; 8],
            options: 0,
        }
    }

    pub fn encode(&self, buffer: &mut FrameBuffer) -> Result<(), ProtocolError> {
        buffer.put_u16(self.command.as_u16())?;
        buffer.put_u16(self.length)?;
        buffer.put_u32(self.session)?;
        buffer.put_u32(self.status.as_u32())?;
        buffer.put_slice(&self.context)?;
        buffer.put_u32(self.options)
    }

    /// Parses a header from the start of `input`, returning it with the bytes that follow.
    pub fn parse(input: &[u8]) -> Result<(Self, &[u8]), ProtocolError> {
        let (rest, (command, length, session, status, context, options)) = header_fields(input)
            .map_err(|_| ProtocolError::Truncated { expected: HEADER_SIZE, actual: input.len() })?;
        let command = Command::try_from(command).map_err(ProtocolError::UnknownCommand)?;
        let header = Self {
            command,
            length,
            session,
            status: EncapsulationStatus::from_u32(status),
            context: context.to_le_bytes(),
            options,
        };
        Ok((header, rest))
    }

    /// Header plus payload size.
    pub fn frame_size(&self) -> usize {
        HEADER_SIZE + usize::from(self.length)
    }
}

fn header_fields(input: &[u8]) -> IResult<&[u8], (u16, u16, u32, u32, u64, u32)> {
    let (input, command) = le_u16(input)?;
    let (input, length) = le_u16(input)?;
    let (input, session) = le_u32(input)?;
    let (input, status) = le_u32(input)?;
    // Sender context is opaque; reading it as a little-endian u64 and writing it back with
    // `to_le_bytes` preserves the byte order.
    let (input, context) = le_u64(input)?;
    let (input, options) = le_u32(input)?;
    Ok((input, (command, length, session, status, context, options)))
}

/// Frame size announced by a partially received encapsulation message.
///
/// Returns [`HEADER_SIZE`] until the length field has arrived, which is always more than
/// the bytes available at that point.
pub fn frame_size(received: &[u8]) -> usize {
    match received {
        [_, _, lo, hi, ..] => HEADER_SIZE + usize::from(u16::from_le_bytes([*lo, *hi])),
        _ => HEADER_SIZE,
    }
}

/// Splits a received frame into its validated header and payload.
///
/// Checks the echoed command, the status, and that `data` holds exactly one frame.
pub fn split_frame(
    data: &[u8],
    expected: Command,
) -> Result<(EncapsulationHeader, &[u8]), ProtocolError> {
    let (header, rest) = EncapsulationHeader::parse(data)?;
    if header.command != expected {
        return Err(ProtocolError::UnexpectedCommand { expected, actual: header.command });
    }
    if header.status != EncapsulationStatus::Success {
        return Err(ProtocolError::Status(header.status));
    }
    let size = header.frame_size();
    if data.len() < size {
        return Err(ProtocolError::Truncated { expected: size, actual: data.len() });
    }
    if data.len() > size {
        return Err(ProtocolError::TrailingBytes { expected: size, actual: data.len() });
    }
    Ok((header, &rest[..usize::from(header.length)]))
}

/// Body carried inside an encapsulation frame.
pub trait Payload {
    type Response;

    /// Number of bytes [`encode_payload`](Self::encode_payload) writes.
    fn request_size(&self) -> usize;

    fn encode_payload(&self, buffer: &mut FrameBuffer) -> Result<(), ProtocolError>;

    /// Parses the reply payload, which excludes the header.
    fn decode_payload(&self, payload: &[u8]) -> Result<Self::Response, ProtocolError>;
}

/// Empty payload. Any reply body is accepted and ignored.
impl Payload for () {
    type Response = ();

    fn request_size(&self) -> usize {
        0
    }

    fn encode_payload(&self, _buffer: &mut FrameBuffer) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn decode_payload(&self, _payload: &[u8]) -> Result<(), ProtocolError> {
        Ok(())
    }
}

/// Opaque payload bytes; the reply payload is returned as-is.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawPayload(pub Vec<u8>);

impl Payload for RawPayload {
    type Response = Vec<u8>;

    fn request_size(&self) -> usize {
        self.0.len()
    }

    fn encode_payload(&self, buffer: &mut FrameBuffer) -> Result<(), ProtocolError> {
        buffer.put_slice(&self.0)
    }

    fn decode_payload(&self, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        Ok(payload.to_vec())
    }
}

/// An encapsulation request: a command, the session it runs in, and a payload.
///
/// This is the session-bearing request type. [`Connection::execute`](crate::Connection::execute)
/// rebinds it to the connection's session after each (re)connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encapsulation<P> {
    command: Command,
    session: SessionId,
    context: [u8; 8],
    payload: P,
}

impl<P: Payload> Encapsulation<P> {
    pub fn new(command: Command, session: SessionId, payload: P) -> Self {
        Self { command, session, context: [0; 8], payload }
    }

    /// Sets the sender context echoed back by the device.
    pub fn with_context(mut self, context: [u8; 8]) -> Self {
        self.context = context;
        self
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn context(&self) -> [u8; 8] {
        self.context
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }
}

impl<P: Payload> Encoder for Encapsulation<P> {
    fn encode(&self, buffer: &mut FrameBuffer) -> Result<(), ProtocolError> {
        let size = self.payload.request_size();
        let length = u16::try_from(size).map_err(|_| ProtocolError::BufferOverflow {
            capacity: buffer.capacity(),
            requested: HEADER_SIZE + size,
        })?;
        let header = EncapsulationHeader {
            context: self.context,
            ..EncapsulationHeader::new(self.command, length, self.session)
        };
        header.encode(buffer)?;
        self.payload.encode_payload(buffer)
    }
}

impl<P: Payload> Decoder for Encapsulation<P> {
    type Response = P::Response;

    fn response_size(&self, received: &[u8]) -> usize {
        frame_size(received)
    }

    fn decode(&self, data: &[u8]) -> Result<P::Response, ProtocolError> {
        let (header, payload) = split_frame(data, self.command)?;
        if self.session != 0 && header.session != self.session {
            return Err(ProtocolError::SessionMismatch {
                expected: self.session,
                actual: header.session,
            });
        }
        self.payload.decode_payload(payload)
    }
}

impl<P: Payload> Request for Encapsulation<P> {
    fn rebind_session(&mut self, session: SessionId) {
        self.session = session;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(command: Command, session: u32, status: u32, payload: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&command.as_u16().to_le_bytes());
        bytes.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        bytes.extend_from_slice(&session.to_le_bytes());
        bytes.extend_from_slice(&status.to_le_bytes());
        bytes.extend_from_slice(&[0; 8]);
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn test_command_codes() {
        assert_eq!(Command::try_from(0x0065u16), Ok(Command::RegisterSession));
        assert_eq!(Command::try_from(0x0066u16), Ok(Command::UnRegisterSession));
        assert_eq!(Command::try_from(0x006Fu16), Ok(Command::SendRRData));
        assert_eq!(Command::try_from(0x1234u16), Err(0x1234));
        assert_eq!(Command::SendUnitData.as_u16(), 0x0070);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(EncapsulationStatus::from_u32(0x64), EncapsulationStatus::InvalidSession);
        assert_eq!(EncapsulationStatus::from_u32(0xBEEF), EncapsulationStatus::Other(0xBEEF));
        assert_eq!(EncapsulationStatus::Other(0xBEEF).as_u32(), 0xBEEF);
    }

    #[test]
    fn test_encode_request_layout() {
        let payload = RawPayload(vec![0xAA, 0xBB]);
        let request = Encapsulation::new(Command::SendRRData, 0x0102_0304, payload)
            .with_context(*b"context!");
        let mut buffer = FrameBuffer::new();
        request.encode(&mut buffer).unwrap();

        let bytes = buffer.as_slice();
        assert_eq!(bytes.len(), HEADER_SIZE + 2);
        assert_eq!(&bytes[0..2], &[0x6F, 0x00]);
        assert_eq!(&bytes[2..4], &[0x02, 0x00]);
        assert_eq!(&bytes[4..8], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&bytes[8..12], &[0, 0, 0, 0]);
        assert_eq!(&bytes[12..20], b"context!");
        assert_eq!(&bytes[24..], &[0xAA, 0xBB]);
    }

    #[test]
    fn test_parse_header_keeps_context_bytes() {
        let mut bytes = frame(Command::ListIdentity, 9, 0, &[1, 2, 3]);
        bytes[12..20].copy_from_slice(&[8, 7, 6, 5, 4, 3, 2, 1]);
        let (header, rest) = EncapsulationHeader::parse(&bytes).unwrap();
        assert_eq!(header.command, Command::ListIdentity);
        assert_eq!(header.length, 3);
        assert_eq!(header.session, 9);
        assert_eq!(header.context, [8, 7, 6, 5, 4, 3, 2, 1]);
        assert_eq!(header.frame_size(), HEADER_SIZE + 3);
        assert_eq!(rest, &[1, 2, 3]);
    }

    #[test]
    fn test_parse_header_too_short() {
        let err = EncapsulationHeader::parse(&[0x65, 0x00, 0x04]).unwrap_err();
        assert_eq!(err, ProtocolError::Truncated { expected: HEADER_SIZE, actual: 3 });
    }

    #[test]
    fn test_response_size_needs_length_field() {
        let request = Encapsulation::new(Command::SendRRData, 1, RawPayload::default());
        let full = frame(Command::SendRRData, 1, 0, &[0; 10]);
        assert_eq!(request.response_size(&[]), HEADER_SIZE);
        assert_eq!(request.response_size(&full[..3]), HEADER_SIZE);
        assert_eq!(request.response_size(&full[..4]), HEADER_SIZE + 10);
        assert_eq!(request.response_size(&full), HEADER_SIZE + 10);
    }

    #[test]
    fn test_decode_returns_payload() {
        let request = Encapsulation::new(Command::SendRRData, 7, RawPayload(vec![1]));
        let reply = frame(Command::SendRRData, 7, 0, &[0xCA, 0xFE]);
        assert_eq!(request.decode(&reply).unwrap(), vec![0xCA, 0xFE]);
    }

    #[test]
    fn test_decode_rejects_wrong_frames() {
        let request = Encapsulation::new(Command::SendRRData, 7, RawPayload::default());

        let reply = frame(Command::SendUnitData, 7, 0, &[]);
        assert_eq!(
            request.decode(&reply),
            Err(ProtocolError::UnexpectedCommand {
                expected: Command::SendRRData,
                actual: Command::SendUnitData
            })
        );

        let reply = frame(Command::SendRRData, 7, 0x64, &[]);
        assert_eq!(
            request.decode(&reply),
            Err(ProtocolError::Status(EncapsulationStatus::InvalidSession))
        );

        let reply = frame(Command::SendRRData, 8, 0, &[]);
        assert_eq!(
            request.decode(&reply),
            Err(ProtocolError::SessionMismatch { expected: 7, actual: 8 })
        );

        let mut reply = frame(Command::SendRRData, 7, 0, &[1, 2]);
        reply.push(3);
        assert_eq!(
            request.decode(&reply),
            Err(ProtocolError::TrailingBytes { expected: 26, actual: 27 })
        );

        let reply = frame(Command::SendRRData, 7, 0, &[1, 2]);
        assert_eq!(
            request.decode(&reply[..25]),
            Err(ProtocolError::Truncated { expected: 26, actual: 25 })
        );

        let mut reply = frame(Command::SendRRData, 7, 0, &[]);
        reply[0] = 0x99;
        assert_eq!(request.decode(&reply), Err(ProtocolError::UnknownCommand(0x0099)));
    }

    #[test]
    fn test_unbound_request_accepts_any_session() {
        let request = Encapsulation::new(Command::ListIdentity, 0, ());
        let reply = frame(Command::ListIdentity, 42, 0, &[5, 5]);
        assert_eq!(request.decode(&reply), Ok(()));
    }

    #[test]
    fn test_rebind_session_keeps_other_fields() {
        let mut request =
            Encapsulation::new(Command::SendRRData, 0, RawPayload(vec![9, 9])).with_context([1; 8]);
        request.rebind_session(0x55);
        assert_eq!(request.session(), 0x55);
        assert_eq!(request.command(), Command::SendRRData);
        assert_eq!(request.context(), [1; 8]);
        assert_eq!(request.payload(), &RawPayload(vec![9, 9]));
    }
}
