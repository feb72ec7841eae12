use std::net::SocketAddr;
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::constants::MAX_FRAME_LENGTH;

use super::error::PeerError;
use super::message::{Handshake, Message, HANDSHAKE_LEN};

/// Opens a TCP connection with a deadline.
pub(crate) async fn connect(addr: SocketAddr, deadline: Duration) -> Result<TcpStream, PeerError> {
    timeout(deadline, TcpStream::connect(addr))
        .await
        .map_err(|_| PeerError::Timeout)?
        .map_err(PeerError::Io)
}

/// Writes our handshake under a deadline.
pub(crate) async fn send_handshake(
    stream: &mut TcpStream,
    handshake: &Handshake,
    deadline: Duration,
) -> Result<(), PeerError> {
    let data = handshake.encode();
    timeout(deadline, stream.write_all(&data))
        .await
        .map_err(|_| PeerError::Timeout)??;
    Ok(())
}

/// Reads the remote handshake under a deadline.
///
/// Reads exactly 68 bytes; anything the remote pipelines after its handshake
/// stays in the socket for the framed reader.
pub(crate) async fn read_handshake(
    stream: &mut TcpStream,
    deadline: Duration,
) -> Result<Handshake, PeerError> {
    let mut buf = [0u8; HANDSHAKE_LEN];
    timeout(deadline, stream.read_exact(&mut buf))
        .await
        .map_err(|_| PeerError::Timeout)??;
    Handshake::decode(&buf)
}

/// The write half of a framed peer connection.
pub struct FrameWriter {
    stream: OwnedWriteHalf,
    write_timeout: Duration,
}

impl FrameWriter {
    pub fn new(stream: OwnedWriteHalf, write_timeout: Duration) -> Self {
        Self {
            stream,
            write_timeout,
        }
    }

    /// Encodes and writes one message under the write deadline.
    pub async fn send(&mut self, message: &Message) -> Result<(), PeerError> {
        let data = message.encode();
        timeout(self.write_timeout, self.stream.write_all(&data))
            .await
            .map_err(|_| PeerError::Timeout)??;
        Ok(())
    }
}

/// The read half of a framed peer connection.
///
/// Accumulates socket reads into a buffer and yields one frame payload at a
/// time. The idle deadline re-arms at every read; a peer silent past it is
/// treated as gone.
pub struct FrameReader {
    stream: OwnedReadHalf,
    buf: BytesMut,
    idle_timeout: Duration,
}

impl FrameReader {
    pub fn new(stream: OwnedReadHalf, idle_timeout: Duration) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(32 * 1024),
            idle_timeout,
        }
    }

    async fn fill(&mut self) -> Result<(), PeerError> {
        let n = timeout(self.idle_timeout, self.stream.read_buf(&mut self.buf))
            .await
            .map_err(|_| PeerError::Timeout)??;
        if n == 0 {
            return Err(PeerError::ConnectionClosed);
        }
        Ok(())
    }

    /// Reads the next frame and returns its payload; empty for a keep-alive.
    pub async fn next_frame(&mut self) -> Result<Bytes, PeerError> {
        while self.buf.len() < 4 {
            self.fill().await?;
        }

        let length =
            u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
        if length > MAX_FRAME_LENGTH {
            return Err(PeerError::InvalidMessage("frame too large"));
        }

        while self.buf.len() < 4 + length {
            self.fill().await?;
        }

        let mut frame = self.buf.split_to(4 + length);
        frame.advance(4);
        Ok(frame.freeze())
    }
}

/// Spawns the poll loop: reads frames and pushes their payloads onto `tx`.
///
/// The channel closing (this task ending) is the session's "peer gone"
/// signal, whether from EOF, a protocol error, or idle expiry.
pub(crate) fn spawn_reader(
    mut reader: FrameReader,
    tx: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                frame = reader.next_frame() => match frame {
                    Ok(payload) => {
                        if tx.send(payload).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::trace!(error = %err, "frame reader stopped");
                        break;
                    }
                },
            }
        }
    })
}
