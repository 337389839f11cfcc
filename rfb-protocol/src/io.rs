//! Buffered byte streams for the RFB wire protocol.
//!
//! All multi-byte integers on the wire are big-endian. [`RfbInStream`] keeps
//! a read-ahead buffer so that the many small fixed-width reads performed by
//! the decoders do not each become a socket read; [`RfbOutStream`] batches a
//! whole client message and sends it on [`RfbOutStream::flush`].
//!
//! A short read always surfaces as [`std::io::ErrorKind::UnexpectedEof`].
//! Callers that need to tell "peer closed between messages" apart from
//! "peer closed mid-message" do so by where the error occurs, not by kind.
//!
//! ```no_run
//! use rfb_protocol::io::{RfbInStream, RfbOutStream};
//! use tokio::net::TcpStream;
//!
//! # async fn example() -> std::io::Result<()> {
//! let socket = TcpStream::connect("localhost:5900").await?;
//! let (reader, writer) = tokio::io::split(socket);
//!
//! let mut input = RfbInStream::new(reader);
//! let mut version = [0u8; 12];
//! input.read_bytes(&mut version).await?;
//!
//! let mut output = RfbOutStream::new(writer);
//! output.write_bytes(b"RFB 003.008\n");
//! output.flush().await?;
//! # Ok(())
//! # }
//! ```

pub mod inflate;

pub use inflate::InflateStream;

use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest chunk pulled into the read-ahead buffer by [`RfbInStream::skip`].
const SKIP_CHUNK: usize = 64 * 1024;

/// Buffered input stream for reading RFB protocol data.
pub struct RfbInStream<R> {
    reader: R,
    buffer: BytesMut,
}

impl<R: AsyncRead + Unpin> RfbInStream<R> {
    /// Create a new input stream with an 8 KiB read-ahead buffer.
    pub fn new(reader: R) -> Self {
        Self::with_capacity(reader, 8192)
    }

    /// Create a new input stream with the given initial buffer capacity.
    pub fn with_capacity(reader: R, capacity: usize) -> Self {
        Self {
            reader,
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Fill the buffer until at least `n` bytes are available.
    async fn ensure_bytes(&mut self, n: usize) -> io::Result<()> {
        while self.buffer.len() < n {
            let bytes_read = self.reader.read_buf(&mut self.buffer).await?;
            if bytes_read == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("expected {} bytes, got {}", n, self.buffer.len()),
                ));
            }
        }
        Ok(())
    }

    /// Read a single byte.
    pub async fn read_u8(&mut self) -> io::Result<u8> {
        self.ensure_bytes(1).await?;
        Ok(self.buffer.get_u8())
    }

    /// Read a big-endian `u16`.
    pub async fn read_u16(&mut self) -> io::Result<u16> {
        self.ensure_bytes(2).await?;
        Ok(self.buffer.get_u16())
    }

    /// Read a big-endian `u32`.
    pub async fn read_u32(&mut self) -> io::Result<u32> {
        self.ensure_bytes(4).await?;
        Ok(self.buffer.get_u32())
    }

    /// Read a big-endian `i32` (encoding identifiers are signed on the wire).
    pub async fn read_i32(&mut self) -> io::Result<i32> {
        self.ensure_bytes(4).await?;
        Ok(self.buffer.get_i32())
    }

    /// Read a big-endian `u64`.
    pub async fn read_u64(&mut self) -> io::Result<u64> {
        self.ensure_bytes(8).await?;
        Ok(self.buffer.get_u64())
    }

    /// Read exactly `buf.len()` bytes.
    pub async fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.ensure_bytes(buf.len()).await?;
        self.buffer.copy_to_slice(buf);
        Ok(())
    }

    /// Read a `u32` length followed by that many bytes, decoded lossily as UTF-8.
    ///
    /// Lengths above `max_len` are rejected with `InvalidData` before any
    /// allocation takes place.
    pub async fn read_string(&mut self, max_len: usize) -> io::Result<String> {
        let len = self.read_u32().await? as usize;
        if len > max_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("string length {len} exceeds limit {max_len}"),
            ));
        }
        let mut raw = vec![0u8; len];
        self.read_bytes(&mut raw).await?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    /// Discard `n` bytes.
    ///
    /// Large skips are consumed in bounded chunks so that discarding a big
    /// payload never grows the read-ahead buffer to the payload's size.
    pub async fn skip(&mut self, mut n: usize) -> io::Result<()> {
        while n > 0 {
            let step = n.min(SKIP_CHUNK);
            self.ensure_bytes(step).await?;
            self.buffer.advance(step);
            n -= step;
        }
        Ok(())
    }

    /// Number of bytes readable without touching the socket.
    pub fn available(&self) -> usize {
        self.buffer.len()
    }

    /// Get a mutable reference to the underlying reader.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Consume the stream and return the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Buffered output stream for writing RFB protocol data.
///
/// Nothing reaches the writer until [`flush`](Self::flush) is called.
pub struct RfbOutStream<W> {
    writer: W,
    buffer: BytesMut,
}

impl<W: AsyncWrite + Unpin> RfbOutStream<W> {
    /// Create a new output stream with an 8 KiB buffer.
    pub fn new(writer: W) -> Self {
        Self::with_capacity(writer, 8192)
    }

    /// Create a new output stream with the given initial buffer capacity.
    pub fn with_capacity(writer: W, capacity: usize) -> Self {
        Self {
            writer,
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.put_u8(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buffer.put_u16(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buffer.put_u32(value);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buffer.put_i32(value);
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buffer.put_u64(value);
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Send everything buffered so far and flush the writer.
    pub async fn flush(&mut self) -> io::Result<()> {
        if !self.buffer.is_empty() {
            self.writer.write_all(&self.buffer).await?;
            self.buffer.clear();
        }
        self.writer.flush().await
    }

    /// Number of bytes waiting for [`flush`](Self::flush).
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Shut down the write half. Buffered bytes are discarded.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.buffer.clear();
        self.writer.shutdown().await
    }

    /// Get a mutable reference to the underlying writer.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Consume the stream and return the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}
