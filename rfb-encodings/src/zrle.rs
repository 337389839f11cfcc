//! ZRLE encoding decoder - Zlib-compressed RLE with 64x64 tiling.
//!
//! ZRLE (Zlib Run-Length Encoding, type 16) combines zlib compression with
//! run-length and palette coding. Rectangles are divided into 64x64 tiles
//! (smaller at the right and bottom edges), each with its own sub-encoding.
//!
//! # Wire Format
//!
//! ```text
//! +------------------+
//! | length           |  4 bytes (u32 big-endian) - length of zlib block
//! +------------------+
//! | zlib_data        |  'length' bytes of zlib-compressed tile data
//! +------------------+
//! ```
//!
//! After inflating, the data holds the tiles in raster order:
//!
//! ```text
//! +------------------+
//! | subencoding      |  1 byte: bit 7 = RLE flag, bits 0-6 = palette size
//! +------------------+
//! | [palette]        |  palette size * cpixel bytes
//! +------------------+
//! | [tile data]      |  depends on the subencoding
//! +------------------+
//! ```
//!
//! # Tile Modes
//!
//! 1. **Solid (palSize=1)**: the single palette entry fills the tile
//! 2. **Raw (palSize=0, RLE=0)**: cpixels in raster order
//! 3. **Plain RLE (palSize=0, RLE=1)**: `(cpixel, run length)` pairs
//! 4. **Packed Palette (palSize=2-16, RLE=0)**: 1/2/4-bit indices
//! 5. **Byte-indexed Palette (palSize=17-127, RLE=0)**: 8-bit indices
//! 6. **Palette RLE (palSize=2-127, RLE=1)**: index bytes, bit 7 set when a
//!    run length follows
//!
//! A cpixel is 3 bytes `[B, G, R]` in the truecolor model and a single
//! palette index in the 256-color model.
//!
//! # Run Lengths
//!
//! A run length is a sequence of bytes, each `255` adding 255 and continuing,
//! terminated by a byte below 255 that is added last. The run covers one more
//! pixel than the decoded sum:
//!
//! ```text
//!   [10]          -> 10  -> 11 pixels
//!   [255, 100]    -> 355 -> 356 pixels
//!   [255, 255, 0] -> 510 -> 511 pixels
//! ```
//!
//! # Packed Palette Bit Order
//!
//! Indices are packed MSB-first and every tile row starts on a byte boundary.
//!
//! # Zlib Stream
//!
//! All ZRLE blocks of a connection belong to one zlib stream: only the first
//! block carries a zlib header and later blocks reference the dictionary
//! built by earlier ones. The decoder therefore owns one [`InflateStream`]
//! for as long as it lives.

use crate::{
    rect_of, ColorFormat, DecodeContext, Decoder, Rectangle, RfbInStream, ENCODING_ZRLE,
    MAX_COMPRESSED_LENGTH,
};
use anyhow::{anyhow, bail, Context, Result};
use rfb_common::Rect;
use rfb_protocol::io::InflateStream;
use tokio::io::AsyncRead;

/// ZRLE tile size (64x64 pixels, smaller at rectangle edges).
const TILE_SIZE: u32 = 64;

/// Largest palette a tile can carry (bit 7 of the mode is the RLE flag).
const MAX_PALETTE_SIZE: usize = 127;

/// Decoder for ZRLE encoding.
pub struct ZrleDecoder {
    inflater: InflateStream,
}

impl Default for ZrleDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ZrleDecoder {
    pub fn new() -> Self {
        Self {
            inflater: InflateStream::new(),
        }
    }

    /// Number of compressed blocks inflated on this connection.
    pub fn blocks(&self) -> u64 {
        self.inflater.blocks()
    }
}

impl Decoder for ZrleDecoder {
    fn encoding_type(&self) -> i32 {
        ENCODING_ZRLE
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
            .context("ZRLE: failed to read compressed data length")?;
        if compressed_len > MAX_COMPRESSED_LENGTH {
            bail!(
                "ZRLE: compressed length {} exceeds {} byte ceiling",
                compressed_len,
                MAX_COMPRESSED_LENGTH
            );
        }

        tracing::debug!(
            target: "rfb_encodings::framing",
            "ZRLE: rect [{},{}+{}x{}] compressed_len={}, stream buffer has {} bytes",
            rect.x, rect.y, rect.width, rect.height,
            compressed_len,
            stream.available()
        );

        let area = rect_of(rect);
        let parts = ctx.scratch.parts();
        let compressed = crate::scratch::grow(parts.bytes, compressed_len as usize)?;
        stream
            .read_bytes(compressed)
            .await
            .context("ZRLE: failed to read compressed data")?;

        parts.inflated.clear();
        if compressed_len > 0 {
            let limit = inflate_limit(&area, ctx.format.cpixel_size());
            self.inflater
                .inflate_block(compressed, parts.inflated, limit)
                .context("ZRLE: zlib decompression failed")?;
        }
        if area.is_empty() {
            return Ok(());
        }

        let draw = crate::accept_in(&mut *ctx.store, &area);
        let mut cursor = DataCursor::new(parts.inflated);
        let mut palette = [0u32; MAX_PALETTE_SIZE];

        let mut ty = 0u32;
        while ty < area.height {
            let tile_h = TILE_SIZE.min(area.height - ty);
            let mut tx = 0u32;
            while tx < area.width {
                let tile_w = TILE_SIZE.min(area.width - tx);
                let tile = Rect::new(area.x + tx as i32, area.y + ty as i32, tile_w, tile_h);

                let pixels = crate::scratch::grow(parts.pixels, tile.area() as usize)?;
                decode_tile(&mut cursor, &tile, ctx.format, &mut palette, pixels)
                    .with_context(|| format!("ZRLE: tile at ({}, {})", tile.x, tile.y))?;
                if draw {
                    ctx.store.image_rect(&tile, pixels);
                }
                tx += TILE_SIZE;
            }
            ty += TILE_SIZE;
        }

        let remaining = cursor.remaining();
        if remaining > 0 {
            tracing::warn!(
                target: "rfb_encodings::framing",
                "ZRLE: {} trailing bytes after decoding rectangle",
                remaining
            );
            bail!("ZRLE: {} trailing bytes after decoding rectangle", remaining);
        }

        if draw {
            ctx.store.update_region(&area);
        }
        tracing::trace!(
            target: "rfb_encodings::framing",
            "ZRLE: decode complete, stream buffer has {} bytes",
            stream.available()
        );
        Ok(())
    }
}

/// Largest inflated size a well-formed rectangle can produce: every pixel
/// sent as its own run, plus a mode byte and a full palette for every tile.
fn inflate_limit(area: &Rect, cpixel: usize) -> usize {
    let cpixel = cpixel as u64;
    let tiles = u64::from(area.width.div_ceil(TILE_SIZE)) * u64::from(area.height.div_ceil(TILE_SIZE));
    let limit = area.area() * (cpixel + 1) + tiles * (1 + MAX_PALETTE_SIZE as u64 * cpixel) + 1024;
    usize::try_from(limit).unwrap_or(usize::MAX)
}

fn decode_tile(
    cursor: &mut DataCursor,
    tile: &Rect,
    format: &ColorFormat,
    palette: &mut [u32; MAX_PALETTE_SIZE],
    out: &mut [u32],
) -> Result<()> {
    let mode = cursor.read_u8().context("failed to read subencoding")?;
    let rle = mode & 0x80 != 0;
    let pal_size = (mode & 0x7F) as usize;

    for entry in palette.iter_mut().take(pal_size) {
        *entry = read_cpixel(cursor, format).context("failed to read palette")?;
    }

    match (rle, pal_size) {
        (_, 1) => out.fill(palette[0]),
        (false, 0) => {
            let cpixel = format.cpixel_size();
            let bytes = cursor
                .read_exact(out.len() * cpixel)
                .context("failed to read raw tile")?;
            format.decode_pixels(bytes, cpixel, out);
        }
        (false, _) => decode_packed(cursor, tile, &palette[..pal_size], out)?,
        (true, 0) => {
            let mut count = 0;
            while count < out.len() {
                let pixel = read_cpixel(cursor, format)?;
                let run = read_run_length(cursor)? + 1;
                check_run(run, out.len() - count)?;
                out[count..count + run].fill(pixel);
                count += run;
            }
        }
        (true, _) => {
            let mut count = 0;
            while count < out.len() {
                let code = cursor
                    .read_u8()
                    .context("failed to read palette RLE code")?;
                let index = (code & 0x7F) as usize;
                let run = if code & 0x80 != 0 {
                    read_run_length(cursor)? + 1
                } else {
                    1
                };
                if index >= pal_size {
                    bail!("palette RLE index {} out of range (pal_size {})", index, pal_size);
                }
                check_run(run, out.len() - count)?;
                out[count..count + run].fill(palette[index]);
                count += run;
            }
        }
    }
    Ok(())
}

/// Packed palette indices, 1/2/4/8 bits each, rows byte-aligned.
fn decode_packed(
    cursor: &mut DataCursor,
    tile: &Rect,
    palette: &[u32],
    out: &mut [u32],
) -> Result<()> {
    let bits: u32 = match palette.len() {
        2 => 1,
        3..=4 => 2,
        5..=16 => 4,
        _ => 8,
    };
    let mask = ((1u16 << bits) - 1) as u8;
    let width = tile.width as usize;

    for row in out.chunks_exact_mut(width) {
        let mut byte = 0u8;
        let mut nbits = 0u32;
        for dst in row.iter_mut() {
            if nbits == 0 {
                byte = cursor.read_u8().context("failed to read packed pixels")?;
                nbits = 8;
            }
            nbits -= bits;
            let index = ((byte >> nbits) & mask) as usize;
            *dst = *palette.get(index).ok_or_else(|| {
                anyhow!(
                    "packed palette index {} out of range (pal_size {})",
                    index,
                    palette.len()
                )
            })?;
        }
    }
    Ok(())
}

fn check_run(run: usize, remaining: usize) -> Result<()> {
    if run > remaining {
        bail!(
            "RLE run length {} exceeds remaining pixels {}",
            run,
            remaining
        );
    }
    Ok(())
}

/// Decode a run-length byte sequence: `255 * n + t` for `n` bytes of 255
/// followed by the terminator `t`.
fn read_run_length(cursor: &mut DataCursor) -> Result<usize> {
    let mut length = 0usize;
    loop {
        let byte = cursor.read_u8().context("failed to read RLE length byte")?;
        length = length
            .checked_add(byte as usize)
            .ok_or_else(|| anyhow!("RLE length overflow"))?;
        if byte != 255 {
            return Ok(length);
        }
    }
}

fn read_cpixel(cursor: &mut DataCursor, format: &ColorFormat) -> Result<u32> {
    let bytes = cursor
        .read_exact(format.cpixel_size())
        .context("failed to read pixel")?;
    Ok(format.decode_pixel(bytes))
}

/// Read position over an inflated block.
struct DataCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> DataCursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn read_u8(&mut self) -> Result<u8> {
        let val = *self
            .data
            .get(self.pos)
            .ok_or_else(|| anyhow!("cursor EOF: need 1 byte, have 0"))?;
        self.pos += 1;
        Ok(val)
    }

    fn read_exact(&mut self, count: usize) -> Result<&'a [u8]> {
        if count > self.remaining() {
            bail!(
                "cursor EOF: need {} bytes, have {}",
                count,
                self.remaining()
            );
        }
        let slice = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }
}
