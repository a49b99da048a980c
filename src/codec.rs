//! Frame codec
//!
//! Every frame is a 4-byte big-endian payload length followed by that many
//! bytes of UTF-8 JSON. The length prefix is the only delimiter, so braces or
//! nested objects inside the payload never end a frame early.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::length_delimited::LengthDelimitedCodecError;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use crate::error::{AppError, DecodeError};
use crate::message::Message;

/// Default upper bound on a single frame's payload
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 64 * 1024;

/// Length-prefixed JSON codec producing `Message`s
#[derive(Debug)]
pub struct MessageCodec {
    frames: LengthDelimitedCodec,
    max_frame_length: usize,
}

impl MessageCodec {
    pub fn new(max_frame_length: usize) -> Self {
        let frames = LengthDelimitedCodec::builder()
            .length_field_length(4)
            .big_endian()
            .max_frame_length(max_frame_length)
            .new_codec();
        Self {
            frames,
            max_frame_length,
        }
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LENGTH)
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, AppError> {
        let frame = self.frames.decode(src).map_err(|e| {
            // The frames codec reports an oversized length prefix as InvalidData
            if e.get_ref().is_some_and(|inner| inner.is::<LengthDelimitedCodecError>()) {
                AppError::Decode(DecodeError::FrameTooLarge(self.max_frame_length))
            } else {
                AppError::Io(e)
            }
        })?;
        match frame {
            Some(frame) => Ok(Some(Message::decode(&frame)?)),
            None => Ok(None),
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = AppError;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> Result<(), AppError> {
        let payload = msg.encode()?;
        self.frames.encode(Bytes::from(payload), dst)?;
        Ok(())
    }
}
