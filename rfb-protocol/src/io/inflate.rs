//! Persistent zlib inflate sub-stream.
//!
//! ZRLE and Zlib rectangles each carry a length-prefixed block of compressed
//! data, but the blocks of one encoding form a single zlib stream for the
//! life of the connection: only the very first block has a zlib header and
//! later blocks reference the dictionary built by earlier ones. An
//! [`InflateStream`] therefore owns one [`flate2::Decompress`] that is never
//! reset while the connection is alive.

use flate2::{Decompress, FlushDecompress, Status};
use std::io;

/// Size of the intermediate output chunk.
const CHUNK_SIZE: usize = 32 * 1024;

/// A long-lived zlib decompressor fed one compressed block at a time.
pub struct InflateStream {
    inflater: Decompress,
    chunk: Box<[u8]>,
    blocks: u64,
}

impl Default for InflateStream {
    fn default() -> Self {
        Self::new()
    }
}

impl InflateStream {
    pub fn new() -> Self {
        Self {
            inflater: Decompress::new(true),
            chunk: vec![0u8; CHUNK_SIZE].into_boxed_slice(),
            blocks: 0,
        }
    }

    /// Number of blocks inflated since creation.
    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    /// Inflate one complete compressed block, replacing the contents of `out`.
    ///
    /// All of `compressed` is consumed. The decompressed size may not exceed
    /// `limit`; a larger result is reported as `InvalidData` so that a hostile
    /// block cannot make the client allocate without bound. `out` keeps its
    /// capacity across calls and grows with `try_reserve`, so allocation
    /// failure surfaces as `OutOfMemory` rather than aborting.
    pub fn inflate_block(
        &mut self,
        compressed: &[u8],
        out: &mut Vec<u8>,
        limit: usize,
    ) -> io::Result<()> {
        out.clear();
        let mut in_pos = 0usize;

        loop {
            let before_in = self.inflater.total_in();
            let before_out = self.inflater.total_out();
            let status = self
                .inflater
                .decompress(&compressed[in_pos..], &mut self.chunk, FlushDecompress::Sync)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            let consumed = (self.inflater.total_in() - before_in) as usize;
            let produced = (self.inflater.total_out() - before_out) as usize;
            in_pos += consumed;

            if out.len() + produced > limit {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("inflated block exceeds {limit} bytes"),
                ));
            }
            out.try_reserve(produced)
                .map_err(|_| io::Error::from(io::ErrorKind::OutOfMemory))?;
            out.extend_from_slice(&self.chunk[..produced]);

            if status == Status::StreamEnd {
                break;
            }
            // With a sync flush, a chunk that is not filled up means the
            // inflater has nothing more to give for the input seen so far.
            if in_pos >= compressed.len() && produced < self.chunk.len() {
                break;
            }
            if consumed == 0 && produced == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "zlib stream made no progress",
                ));
            }
        }

        self.blocks += 1;
        tracing::trace!(
            target: "rfb_protocol::inflate",
            "inflated block {}: {} -> {} bytes",
            self.blocks,
            compressed.len(),
            out.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::{Compress, Compression, FlushCompress};
    use std::io::Write;

    #[test]
    fn test_single_block() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"hello hello hello").unwrap();
        let compressed = encoder.finish().unwrap();

        let mut stream = InflateStream::new();
        let mut out = Vec::new();
        stream.inflate_block(&compressed, &mut out, 1024).unwrap();
        assert_eq!(out, b"hello hello hello");
        assert_eq!(stream.blocks(), 1);
    }

    #[test]
    fn test_dictionary_persists_across_blocks() {
        // Two sync-flushed blocks of one zlib stream, the way servers send them.
        let mut compress = Compress::new(Compression::default(), true);
        let mut first = Vec::with_capacity(256);
        compress
            .compress_vec(b"abcdefgh-abcdefgh", &mut first, FlushCompress::Sync)
            .unwrap();
        let mut second = Vec::with_capacity(256);
        compress
            .compress_vec(b"abcdefgh-abcdefgh", &mut second, FlushCompress::Sync)
            .unwrap();

        let mut stream = InflateStream::new();
        let mut out = Vec::new();
        stream.inflate_block(&first, &mut out, 1024).unwrap();
        assert_eq!(out, b"abcdefgh-abcdefgh");
        stream.inflate_block(&second, &mut out, 1024).unwrap();
        assert_eq!(out, b"abcdefgh-abcdefgh");
        assert_eq!(stream.blocks(), 2);
    }

    #[test]
    fn test_limit_exceeded() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&[0u8; 4096]).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut stream = InflateStream::new();
        let mut out = Vec::new();
        let err = stream.inflate_block(&compressed, &mut out, 100).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_garbage_input() {
        let mut stream = InflateStream::new();
        let mut out = Vec::new();
        let err = stream
            .inflate_block(&[0xFF, 0xFF, 0xFF, 0xFF], &mut out, 1024)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
