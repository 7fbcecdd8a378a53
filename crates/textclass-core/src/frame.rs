//! Length-prefixed frame codec.
//!
//! Every message on the wire is a little-endian `u32` length followed by
//! that many payload bytes:
//!
//! ```text
//! +----------------+---------------------+
//! | length (4, LE) | payload (length)    |
//! +----------------+---------------------+
//! ```
//!
//! A length of zero carries no payload and marks the end of a streamed
//! upload. Lengths above the codec's maximum are rejected before any
//! payload byte is buffered.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::error::{Error, Result};

/// Size of the length header in bytes.
pub const HEADER_SIZE: usize = 4;

/// Default upper bound for a single frame payload.
pub const MAX_FRAME_SIZE: usize = 4096;

/// One decoded unit from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A payload frame, `0 < len <= max`.
    Data(Bytes),
    /// The zero-length sentinel that terminates a streamed payload.
    End,
}

impl Frame {
    /// Payload length as it appears in the header.
    pub fn len(&self) -> usize {
        match self {
            Self::Data(bytes) => bytes.len(),
            Self::End => 0,
        }
    }

    /// True for the sentinel frame.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::End)
    }
}

/// Codec for `[u32 LE length][payload]` frames.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    /// Create a codec with the default maximum frame size.
    pub fn new() -> Self {
        Self::with_max_frame_size(MAX_FRAME_SIZE)
    }

    /// Create a codec with a custom maximum frame size.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Maximum accepted payload length.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if src.len() < HEADER_SIZE {
            src.reserve(HEADER_SIZE - src.len());
            return Ok(None);
        }

        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(&src[..HEADER_SIZE]);
        let len = u32::from_le_bytes(header) as usize;

        if len == 0 {
            src.advance(HEADER_SIZE);
            return Ok(Some(Frame::End));
        }

        if len > self.max_frame_size {
            return Err(Error::FrameTooLarge {
                len,
                max: self.max_frame_size,
            });
        }

        let total = HEADER_SIZE + len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(HEADER_SIZE);
        Ok(Some(Frame::Data(src.split_to(len).freeze())))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                // Peer closed mid-frame: treated the same as a clean close.
                if !src.is_empty() {
                    debug!(remaining = src.len(), "discarding truncated frame at end of stream");
                    src.clear();
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, payload: Bytes, dst: &mut BytesMut) -> Result<()> {
        <Self as Encoder<&[u8]>>::encode(self, payload.as_ref(), dst)
    }
}

impl Encoder<&[u8]> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
        if payload.len() > self.max_frame_size {
            return Err(Error::FrameTooLarge {
                len: payload.len(),
                max: self.max_frame_size,
            });
        }

        dst.reserve(HEADER_SIZE + payload.len());
        dst.put_u32_le(payload.len() as u32);
        dst.extend_from_slice(payload);
        Ok(())
    }
}
