//! Reusable decode buffers owned by the session worker.
//!
//! Buffers only ever grow: each request for `n` elements makes sure at least
//! `n` are available and hands out exactly that many. Growth goes through
//! `try_reserve`, so an oversized rectangle fails with
//! [`StoreError::ResourceExhausted`] instead of aborting the process.

use rfb_pixelbuffer::StoreError;

#[derive(Debug, Default)]
pub struct ScratchBuffers {
    bytes: Vec<u8>,
    inflated: Vec<u8>,
    pixels: Vec<u32>,
}

/// Views of every scratch buffer at once, for decoders that need more than
/// one.
pub struct ScratchParts<'a> {
    pub bytes: &'a mut Vec<u8>,
    pub inflated: &'a mut Vec<u8>,
    pub pixels: &'a mut Vec<u32>,
}

/// Make `buf` hold at least `len` elements and return the first `len`.
pub fn grow<T: Copy + Default>(buf: &mut Vec<T>, len: usize) -> Result<&mut [T], StoreError> {
    if buf.len() < len {
        buf.try_reserve(len - buf.len())
            .map_err(|_| StoreError::ResourceExhausted)?;
        buf.resize(len, T::default());
    }
    Ok(&mut buf[..len])
}

impl ScratchBuffers {
    /// Byte buffer of exactly `len` bytes (contents unspecified).
    pub fn bytes(&mut self, len: usize) -> Result<&mut [u8], StoreError> {
        grow(&mut self.bytes, len)
    }

    /// Pixel buffer of exactly `len` pixels (contents unspecified).
    pub fn pixels(&mut self, len: usize) -> Result<&mut [u32], StoreError> {
        grow(&mut self.pixels, len)
    }

    pub fn parts(&mut self) -> ScratchParts<'_> {
        ScratchParts {
            bytes: &mut self.bytes,
            inflated: &mut self.inflated,
            pixels: &mut self.pixels,
        }
    }

    /// Total elements currently held, for diagnostics.
    pub fn footprint(&self) -> (usize, usize, usize) {
        (self.bytes.len(), self.inflated.capacity(), self.pixels.len())
    }
}
