//! Streaming frame decoder over an [`AsyncRead`].
//!
//! Bytes are accumulated in an internal buffer and decoded one frame at a
//! time.  A decode that runs out of bytes simply waits for more input; any
//! other decode error is returned and ends the stream.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::connection::ConnectionError;
use crate::protocol::codec::{decode_frame, FrameError};
use crate::protocol::messages::{CommandSpace, Frame};

/// Size of each socket read.
const READ_CHUNK: usize = 4096;

/// Reads consecutive [`Frame`]s from a byte stream.
pub struct FrameReader<R> {
    reader: R,
    space: CommandSpace,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R, space: CommandSpace) -> Self {
        Self {
            reader,
            space,
            buf: Vec::with_capacity(READ_CHUNK),
        }
    }

    /// Returns the next frame, or `None` once the peer has closed the stream
    /// on a frame boundary.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::Frame`] for an unknown code or malformed payload.
    /// - [`ConnectionError::Io`] for read failures, including end of stream
    ///   in the middle of a frame.
    ///
    /// Cancel-safe: bytes already read stay buffered for the next call.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>, ConnectionError> {
        // Smallest buffer length that can make progress.
        let mut want = 1;
        loop {
            if self.buf.len() >= want {
                match decode_frame(&self.buf, self.space) {
                    Ok((frame, consumed)) => {
                        self.buf.drain(..consumed);
                        return Ok(Some(frame));
                    }
                    Err(FrameError::InsufficientData { needed, .. }) => want = needed,
                    Err(e) => return Err(e.into()),
                }
            }

            let mut chunk = [0u8; READ_CHUNK];
            let n = self.reader.read(&mut chunk).await?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(ConnectionError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("stream ended inside a frame ({} bytes pending)", self.buf.len()),
                )));
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Number of bytes received but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}
