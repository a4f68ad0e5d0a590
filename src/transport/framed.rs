//! Length-prefixed framing.
//!
//! Turns an unordered byte stream into discrete frames: a 4-byte big-endian
//! signed length followed by exactly that many payload bytes. Writes are
//! buffered locally and hit the wire only on [`FramedTransport::flush`], as a
//! single header+payload write.
//!
//! Frame reads go through the [`ConnectionLock`], so concurrent logical
//! callers sharing one connection cannot interleave a header read from one
//! operation with the body read of another. Flushes are serialized the same
//! way. Composing one frame is a single-logical-sender contract: two tasks
//! appending to the write buffer concurrently will interleave their payloads
//! within that frame.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace};

use crate::config::TransportConfig;
use crate::error::{Error, ProtocolError, Result, TransportError};

use super::lock::ConnectionLock;

/// Framed transport over any async byte stream.
pub struct FramedTransport<S> {
    reader: ConnectionLock<FrameReader<ReadHalf<S>>>,
    write_half: ConnectionLock<WriteHalf<S>>,
    wbuf: std::sync::Mutex<BytesMut>,
    max_frame_size: usize,
}

struct FrameReader<R> {
    stream: R,
    max_frame_size: usize,
}

impl<S: AsyncRead + AsyncWrite> FramedTransport<S> {
    pub fn new(stream: S) -> Self {
        Self::with_config(stream, &TransportConfig::default())
    }

    pub fn with_config(stream: S, config: &TransportConfig) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: ConnectionLock::new(FrameReader {
                stream: read_half,
                max_frame_size: config.max_frame_size,
            }),
            write_half: ConnectionLock::new(write_half),
            wbuf: std::sync::Mutex::new(BytesMut::new()),
            max_frame_size: config.max_frame_size,
        }
    }
}

impl<S: AsyncRead + AsyncWrite> FramedTransport<S> {
    /// Append to the write buffer. No I/O happens until
    /// [`flush`](Self::flush).
    pub fn write(&self, bytes: &[u8]) {
        self.wbuf
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .extend_from_slice(bytes);
    }

    /// Bytes currently buffered for the next flush.
    pub fn pending(&self) -> usize {
        self.wbuf
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Emit the buffered bytes as one length-prefixed frame.
    ///
    /// The buffer is rotated out *before* the write is attempted: if the
    /// underlying write fails and the caller retries with fresh data, bytes
    /// already handed to a failed flush are not duplicated.
    pub async fn flush(&self) -> Result<()> {
        let frame = {
            let mut buf = self
                .wbuf
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            std::mem::take(&mut *buf)
        };

        let len = frame_len(frame.len(), self.max_frame_size)?;
        let mut message = BytesMut::with_capacity(4 + frame.len());
        message.put_i32(len);
        message.extend_from_slice(&frame);

        let mut stream = self.write_half.acquire().await;
        stream.write_all(&message).await?;
        stream.flush().await?;
        trace!(frame_len = len, "frame flushed");
        Ok(())
    }

    /// Read the next frame, suspending until it is this caller's turn on the
    /// connection. A clean close before the first header byte surfaces as
    /// [`TransportError::EndOfFile`]; EOF anywhere inside a frame is a fault.
    pub async fn read_frame(&self) -> Result<Bytes> {
        let mut reader = self.reader.acquire().await;
        reader.read_frame().await
    }
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    async fn read_frame(&mut self) -> Result<Bytes> {
        let mut header = [0u8; 4];
        read_full(&mut self.stream, &mut header, true).await?;
        let len = i32::from_be_bytes(header);
        if len < 0 {
            return Err(ProtocolError::NegativeSize(i64::from(len)).into());
        }
        let len = len as usize;
        if len > self.max_frame_size {
            return Err(ProtocolError::SizeLimit {
                length: len as u64,
                limit: self.max_frame_size as u64,
            }
            .into());
        }
        let mut payload = vec![0u8; len];
        read_full(&mut self.stream, &mut payload, false).await?;
        trace!(frame_len = len, "frame read");
        Ok(Bytes::from(payload))
    }
}

/// Fill `buf` completely. A zero-byte read on the very first attempt is a
/// clean close when `clean_eof` is set; running dry later always means the
/// peer dropped mid-frame.
async fn read_full<R: AsyncRead + Unpin>(
    stream: &mut R,
    buf: &mut [u8],
    clean_eof: bool,
) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..]).await?;
        if n == 0 {
            if clean_eof && filled == 0 {
                debug!("stream closed cleanly");
                return Err(TransportError::EndOfFile.into());
            }
            return Err(TransportError::Unknown(format!(
                "connection closed mid-frame ({filled} of {} bytes)",
                buf.len()
            ))
            .into());
        }
        filled += n;
    }
    Ok(())
}

fn frame_len(len: usize, max: usize) -> Result<i32> {
    if len > max {
        return Err(ProtocolError::SizeLimit {
            length: len as u64,
            limit: max as u64,
        }
        .into());
    }
    i32::try_from(len).map_err(|_| {
        ProtocolError::SizeLimit {
            length: len as u64,
            limit: i32::MAX as u64,
        }
        .into()
    })
}

/// `tokio_util` codec for hosting loops that prefer a `Framed` stream over
/// driving [`FramedTransport`] by hand.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            max_frame_size: TransportConfig::default().max_frame_size,
        }
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        if src.len() < 4 {
            return Ok(None);
        }
        let len = i32::from_be_bytes([src[0], src[1], src[2], src[3]]);
        if len < 0 {
            return Err(ProtocolError::NegativeSize(i64::from(len)).into());
        }
        let len = len as usize;
        if len > self.max_frame_size {
            return Err(ProtocolError::SizeLimit {
                length: len as u64,
                limit: self.max_frame_size as u64,
            }
            .into());
        }
        if src.len() < 4 + len {
            src.reserve(4 + len - src.len());
            return Ok(None);
        }
        src.advance(4);
        Ok(Some(src.split_to(len).freeze()))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        let len = frame_len(item.len(), self.max_frame_size)?;
        dst.reserve(4 + item.len());
        dst.put_i32(len);
        dst.extend_from_slice(&item);
        Ok(())
    }
}
