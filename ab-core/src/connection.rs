use ab_codec::{Codec, Error, Message};
use bytes::{Buf, BytesMut};
use core::fmt;
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::debug;

/// Why a peer link stopped yielding messages.
#[derive(Debug)]
pub enum ConnectionError {
    /// The remote closed with a partial frame still buffered.
    Reset,

    /// The length prefix can no longer be trusted; the stream is beyond
    /// resynchronization.
    Frame(Error),

    Io(io::Error),
}

impl std::error::Error for ConnectionError {}

impl fmt::Display for ConnectionError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConnectionError::Reset => "connection reset by peer".fmt(fmt),
            ConnectionError::Frame(e) => write!(fmt, "unrecoverable frame: {}", e),
            ConnectionError::Io(e) => e.fmt(fmt),
        }
    }
}

impl From<io::Error> for ConnectionError {
    fn from(e: io::Error) -> ConnectionError {
        ConnectionError::Io(e)
    }
}

/// A framed peer connection. The buffer accumulates raw bytes from the
/// socket; the codec carves authenticated frames off its front.
#[derive(Debug)]
pub struct Connection {
    stream: BufWriter<TcpStream>,
    buffer: BytesMut,
    codec: Codec,
}

impl Connection {
    pub fn new(socket: TcpStream, codec: Codec) -> Connection {
        Connection {
            stream: BufWriter::new(socket),
            buffer: BytesMut::with_capacity(16 * 1024),
            codec,
        }
    }

    /// Reads the next message. Returns `Ok(None)` on a clean end of stream.
    /// Frames that fail authentication or typing are skipped, keeping the
    /// connection; a poisoned length prefix ends it.
    pub async fn read_message(&mut self) -> Result<Option<Message>, ConnectionError> {
        loop {
            match self.codec.decode(&mut self.buffer) {
                Ok(message) => return Ok(Some(message)),
                Err(Error::Incomplete) => {}
                Err(e) if e.is_fatal() => return Err(ConnectionError::Frame(e)),
                Err(e) => {
                    debug!(error = %e, "dropping undecodable frame");
                    match Codec::decode_message_length(&self.buffer[..]) {
                        Ok(len) => self.buffer.advance(len),
                        Err(_) => return Err(ConnectionError::Frame(e)),
                    }
                    continue;
                }
            }

            // Not enough buffered data for a frame; pull more from the
            // socket. Zero bytes read means the remote is gone.
            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                return if self.buffer.is_empty() {
                    Ok(None)
                } else {
                    Err(ConnectionError::Reset)
                };
            }
        }
    }

    /// Writes a frame already packed by a codec.
    pub async fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.stream.write_all(frame).await?;
        self.stream.flush().await
    }
}
