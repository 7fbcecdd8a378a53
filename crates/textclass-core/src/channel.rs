//! Framed channel over a byte stream.
//!
//! `FramedChannel` is used identically by the server and the client: it
//! sends one frame per call and receives one frame per call, blocking
//! the calling task until the frame is complete or the peer goes away.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tracing::warn;

use crate::error::{Error, Result};
use crate::frame::{Frame, FrameCodec, MAX_FRAME_SIZE};

/// A bidirectional channel speaking length-prefixed frames.
pub struct FramedChannel<S> {
    inner: Framed<S, FrameCodec>,
    closed: bool,
}

impl<S> FramedChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a stream with the default maximum frame size.
    pub fn new(stream: S) -> Self {
        Self::with_max_frame_size(stream, MAX_FRAME_SIZE)
    }

    /// Wrap a stream with a custom maximum frame size.
    pub fn with_max_frame_size(stream: S, max_frame_size: usize) -> Self {
        Self {
            inner: Framed::new(stream, FrameCodec::with_max_frame_size(max_frame_size)),
            closed: false,
        }
    }

    /// Maximum payload length this channel sends or accepts.
    pub fn max_frame_size(&self) -> usize {
        self.inner.codec().max_frame_size()
    }

    /// Whether the channel has observed the end of the connection.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Send one frame. An empty payload sends the end-of-stream sentinel.
    pub async fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.inner.send(payload).await
    }

    /// Receive one frame, distinguishing payload frames from the sentinel.
    ///
    /// Returns `Ok(None)` once the peer has closed the connection, including
    /// when it closed in the middle of a header or payload.
    ///
    /// # Errors
    ///
    /// Returns `Error::FrameTooLarge` if the header announces more than the
    /// maximum frame size, and `Error::Io` on transport failures. After
    /// either, the channel is closed.
    pub async fn receive_frame(&mut self) -> Result<Option<Frame>> {
        if self.closed {
            return Ok(None);
        }

        match self.inner.next().await {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(err)) => {
                self.closed = true;
                Err(err)
            }
            None => {
                self.closed = true;
                Ok(None)
            }
        }
    }

    /// Receive one payload.
    ///
    /// Returns `Ok(None)` when the peer closed the connection, when the
    /// zero-length sentinel arrives, or when the header announces an
    /// oversized frame. An oversized frame also closes the channel since
    /// the stream can no longer be resynchronised.
    pub async fn receive(&mut self) -> Result<Option<Bytes>> {
        match self.receive_frame().await {
            Ok(Some(Frame::Data(bytes))) => Ok(Some(bytes)),
            Ok(Some(Frame::End)) | Ok(None) => Ok(None),
            Err(Error::FrameTooLarge { len, max }) => {
                warn!(len, max, "rejecting oversized frame");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Consume the channel and return the underlying stream.
    pub fn into_inner(self) -> S {
        self.inner.into_inner()
    }
}
