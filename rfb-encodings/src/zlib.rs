//! Zlib encoding decoder - Raw pixel data behind a zlib stream.
//!
//! # Wire Format
//!
//! ```text
//! +------------------+
//! | length           |  4 bytes (u32 big-endian)
//! +------------------+
//! | zlib_data        |  'length' bytes
//! +------------------+
//! ```
//!
//! The inflated block is laid out exactly like a Raw rectangle. As with ZRLE,
//! all blocks of a connection form one zlib stream, so the decoder keeps its
//! [`InflateStream`] for as long as it lives.

use crate::raw::draw_raw_bytes;
use crate::{rect_of, DecodeContext, Decoder, Rectangle, RfbInStream, ENCODING_ZLIB, MAX_COMPRESSED_LENGTH};
use anyhow::{bail, Context, Result};
use rfb_protocol::io::InflateStream;
use tokio::io::AsyncRead;

pub struct ZlibDecoder {
    inflater: InflateStream,
}

impl Default for ZlibDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ZlibDecoder {
    pub fn new() -> Self {
        Self {
            inflater: InflateStream::new(),
        }
    }
}

impl Decoder for ZlibDecoder {
    fn encoding_type(&self) -> i32 {
        ENCODING_ZLIB
    }

    async fn decode<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        ctx: &mut DecodeContext<'_>,
    ) -> Result<()> {
        let compressed_len = stream
            .read_u32()
            .await
            .context("Zlib: failed to read compressed data length")?;
        if compressed_len > MAX_COMPRESSED_LENGTH {
            bail!(
                "Zlib: compressed length {} exceeds {} byte ceiling",
                compressed_len,
                MAX_COMPRESSED_LENGTH
            );
        }

        let area = rect_of(rect);
        let expected = (area.area() as usize)
            .checked_mul(ctx.format.bytes_per_pixel())
            .context("Zlib: rectangle size overflows")?;
        tracing::debug!(
            target: "rfb_encodings::framing",
            "Zlib: rect [{},{}+{}x{}] compressed_len={} expected={}",
            rect.x, rect.y, rect.width, rect.height,
            compressed_len,
            expected
        );

        let parts = ctx.scratch.parts();
        let compressed = crate::scratch::grow(parts.bytes, compressed_len as usize)?;
        stream
            .read_bytes(compressed)
            .await
            .context("Zlib: failed to read compressed data")?;

        parts.inflated.clear();
        if compressed_len > 0 {
            self.inflater
                .inflate_block(compressed, parts.inflated, expected)
                .context("Zlib: decompression failed")?;
        }
        if parts.inflated.len() != expected {
            bail!(
                "Zlib: inflated {} bytes, rectangle needs {}",
                parts.inflated.len(),
                expected
            );
        }

        if expected == 0 || !crate::accept_in(&mut *ctx.store, &area) {
            return Ok(());
        }
        draw_raw_bytes(parts.inflated, area, ctx.format, parts.pixels, &mut *ctx.store)?;
        ctx.store.update_region(&area);
        Ok(())
    }
}
