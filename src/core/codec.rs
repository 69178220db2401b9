use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::config::MAX_PAYLOAD_SIZE;
use crate::core::message::{Header, Message, HEADER_SIZE};
use crate::error::{ProtocolError, Result};

/// Frames [`Message`] envelopes over a byte stream.
///
/// The header is inspected first so an oversized declared length is rejected
/// before any of its payload is buffered.
#[derive(Debug, Clone, Copy)]
pub struct MessageCodec {
    max_payload_size: usize,
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new(MAX_PAYLOAD_SIZE)
    }
}

impl MessageCodec {
    pub fn new(max_payload_size: usize) -> Self {
        Self { max_payload_size }
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let header = Header::parse(&src[..HEADER_SIZE])?;
        if header.payload_len as usize > self.max_payload_size {
            return Err(ProtocolError::OversizedPacket(header.payload_len as usize));
        }

        let frame_len = header.frame_len();
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let frame = src.split_to(frame_len);
        Message::from_bytes(&frame).map(Some)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        match self.decode(src)? {
            Some(msg) => Ok(Some(msg)),
            None if src.is_empty() => Ok(None),
            None => {
                let leftover = src.remaining();
                src.clear();
                Err(ProtocolError::MessageTooShort(leftover))
            }
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        if item.payload.len() > self.max_payload_size {
            return Err(ProtocolError::OversizedPacket(item.payload.len()));
        }

        let bytes = item.to_bytes()?;
        dst.extend_from_slice(&bytes);
        Ok(())
    }
}
