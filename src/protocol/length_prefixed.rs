//! Length-prefixed framing: a 4-byte big-endian payload length, then the payload.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{Protocol, ProtocolError};

/// Size of the length header in bytes.
pub const HEADER_LEN: usize = 4;

/// Frames opaque byte payloads behind a `u32` big-endian length header.
#[derive(Debug, Clone, Copy, Default)]
pub struct LengthPrefixed;

impl LengthPrefixed {
    pub fn new() -> Self {
        Self
    }
}

impl Protocol for LengthPrefixed {
    type Message = Bytes;

    fn decode(
        &self,
        src: &mut BytesMut,
        max_message_size: usize,
    ) -> Result<Option<Bytes>, ProtocolError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&src[..HEADER_LEN]);
        let size = u32::from_be_bytes(header) as usize;

        // Reject on the header alone so an oversized frame is never buffered.
        if size > max_message_size {
            return Err(ProtocolError::FrameTooLarge {
                size,
                max: max_message_size,
            });
        }

        if src.len() < HEADER_LEN + size {
            src.reserve(HEADER_LEN + size - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        Ok(Some(src.split_to(size).freeze()))
    }

    fn encode(&self, message: Bytes, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let size = u32::try_from(message.len()).map_err(|_| ProtocolError::FrameTooLarge {
            size: message.len(),
            max: u32::MAX as usize,
        })?;

        dst.reserve(HEADER_LEN + message.len());
        dst.put_u32(size);
        dst.extend_from_slice(&message);
        Ok(())
    }
}
