//! Newline-delimited UTF-8 text framing.

use bytes::{Buf, BytesMut};

use super::{Protocol, ProtocolError};

/// Frames `String` messages terminated by `\n`. A trailing `\r` is stripped.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineDelimited;

impl LineDelimited {
    pub fn new() -> Self {
        Self
    }
}

impl Protocol for LineDelimited {
    type Message = String;

    fn decode(
        &self,
        src: &mut BytesMut,
        max_message_size: usize,
    ) -> Result<Option<String>, ProtocolError> {
        let Some(newline) = src.iter().position(|b| *b == b'\n') else {
            if src.len() > max_message_size {
                return Err(ProtocolError::FrameTooLarge {
                    size: src.len(),
                    max: max_message_size,
                });
            }
            return Ok(None);
        };

        if newline > max_message_size {
            return Err(ProtocolError::FrameTooLarge {
                size: newline,
                max: max_message_size,
            });
        }

        let line = src.split_to(newline);
        src.advance(1);

        let mut text = String::from_utf8(line.to_vec())
            .map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        if text.ends_with('\r') {
            text.pop();
        }
        Ok(Some(text))
    }

    fn encode(&self, message: String, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        if message.contains('\n') {
            return Err(ProtocolError::Malformed(
                "line message contains a newline".to_string(),
            ));
        }
        dst.reserve(message.len() + 1);
        dst.extend_from_slice(message.as_bytes());
        dst.extend_from_slice(b"\n");
        Ok(())
    }
}
