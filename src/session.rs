//! Session registration handshake.
//!
//! A TCP client must send `RegisterSession` before any other request; the device answers
//! with the session handle that every later request carries. `UnRegisterSession` ends the
//! session, after which the device closes the link without replying.

use nom::IResult;
use nom::number::complete::le_u16;

use crate::buffer::FrameBuffer;
use crate::encapsulation::{
    Command, Encapsulation, EncapsulationHeader, HEADER_SIZE, frame_size, split_frame,
};
use crate::error::ProtocolError;
use crate::protocol::{Decoder, Encoder, Request, SessionId};

/// Encapsulation protocol version requested during registration.
pub const PROTOCOL_VERSION: u16 = 1;

/// Size of the `RegisterSession` payload: protocol version + option flags.
const REGISTER_PAYLOAD_SIZE: u16 = 4;

/// `RegisterSession` request. Decodes to the session handle allocated by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterSession {
    protocol_version: u16,
    options: u16,
}

impl RegisterSession {
    pub fn new() -> Self {
        Self { protocol_version: PROTOCOL_VERSION, options: 0 }
    }
}

impl Default for RegisterSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder for RegisterSession {
    fn encode(&self, buffer: &mut FrameBuffer) -> Result<(), ProtocolError> {
        EncapsulationHeader::new(Command::RegisterSession, REGISTER_PAYLOAD_SIZE, 0)
            .encode(buffer)?;
        buffer.put_u16(self.protocol_version)?;
        buffer.put_u16(self.options)
    }
}

fn register_payload(input: &[u8]) -> IResult<&[u8], (u16, u16)> {
    let (input, version) = le_u16(input)?;
    let (input, options) = le_u16(input)?;
    Ok((input, (version, options)))
}

impl Decoder for RegisterSession {
    type Response = SessionId;

    fn response_size(&self, received: &[u8]) -> usize {
        frame_size(received)
    }

    fn decode(&self, data: &[u8]) -> Result<SessionId, ProtocolError> {
        let (header, payload) = split_frame(data, Command::RegisterSession)?;
        let (rest, (version, _options)) = register_payload(payload).map_err(|_| {
            ProtocolError::Truncated {
                expected: HEADER_SIZE + usize::from(REGISTER_PAYLOAD_SIZE),
                actual: data.len(),
            }
        })?;
        if !rest.is_empty() {
            return Err(ProtocolError::Malformed("oversized register session reply"));
        }
        if version != self.protocol_version {
            return Err(ProtocolError::Malformed("protocol version mismatch in register reply"));
        }
        if header.session == 0 {
            return Err(ProtocolError::Malformed("device assigned session 0"));
        }
        Ok(header.session)
    }
}

impl Request for RegisterSession {}

/// Builds the `UnRegisterSession` request for `session`. The device sends no reply.
pub fn unregister_session(session: SessionId) -> Encapsulation<()> {
    Encapsulation::new(Command::UnRegisterSession, session, ())
}
