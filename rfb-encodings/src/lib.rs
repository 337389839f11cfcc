//! Rectangle decoders for RFB framebuffer updates.
//!
//! Each decoder consumes exactly the bytes its encoding defines for one
//! rectangle and, when the rectangle is representable in the current
//! [`FramebufferStore`] window, writes the decoded pixels and signals a
//! redraw. Bytes are always consumed, even for rectangles whose pixels are
//! dropped, so the stream stays framed.
//!
//! # Key Concepts
//!
//! - **Async decoding**: decoders read from a tokio [`AsyncRead`]-backed
//!   [`RfbInStream`].
//! - **Decode context**: the active [`ColorFormat`], the destination store
//!   and the session's grow-only [`ScratchBuffers`] travel together in a
//!   [`DecodeContext`].
//! - **Closed dispatch**: [`DecoderSet`] owns one [`DecoderEntry`] per
//!   supported [`Encoding`]; pseudo-encodings and unknown ids are classified
//!   by [`RectKind`] and handled by the dispatch loop.
//!
//! # Example
//!
//! ```
//! use rfb_encodings::{DecodeContext, DecoderSet, Encoding, Rectangle, RfbInStream, ScratchBuffers};
//! use rfb_pixelbuffer::{ColorModel, FramebufferStore, FullStore, RedrawNotifier};
//!
//! # tokio_test_block_on(async {
//! let (notifier, _redraws) = RedrawNotifier::channel();
//! let mut store = FullStore::new(2, 1, notifier).unwrap();
//! let format = ColorModel::C24bit.select_format();
//! let mut scratch = ScratchBuffers::default();
//! let mut decoders = DecoderSet::new();
//!
//! let rect = Rectangle { x: 0, y: 0, width: 2, height: 1, encoding: 0 };
//! let bytes = vec![0x00, 0x00, 0xFF, 0x00, 0xFF, 0x00, 0x00, 0x00];
//! let mut stream = RfbInStream::new(std::io::Cursor::new(bytes));
//!
//! let mut ctx = DecodeContext { format: &format, store: &mut store, scratch: &mut scratch };
//! decoders.decode(Encoding::Raw, &mut stream, &rect, &mut ctx).await.unwrap();
//! assert_eq!(store.surface().lock().pixels(), &[0xFFFF_0000, 0xFF00_00FF]);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use anyhow::{Context, Result};
use rfb_common::Rect;
use tokio::io::AsyncRead;

pub use rfb_pixelbuffer::{ColorFormat, FramebufferStore};
pub use rfb_protocol::io::RfbInStream;
pub use rfb_protocol::messages::types::{
    Encoding, Rectangle, ENCODING_COPYRECT, ENCODING_CORRE, ENCODING_HEXTILE, ENCODING_RAW,
    ENCODING_RRE, ENCODING_ZLIB, ENCODING_ZRLE,
};

pub mod copyrect;
pub mod hextile;
pub mod pseudo;
pub mod raw;
pub mod rre;
pub mod scratch;
pub mod zlib;
pub mod zrle;

pub use copyrect::CopyRectDecoder;
pub use hextile::HextileDecoder;
pub use pseudo::RectKind;
pub use raw::RawDecoder;
pub use rre::{CoRreDecoder, RreDecoder};
pub use scratch::ScratchBuffers;
pub use zlib::ZlibDecoder;
pub use zrle::ZrleDecoder;

/// Upper bound on the compressed block announced by a ZRLE or Zlib
/// rectangle.
pub const MAX_COMPRESSED_LENGTH: u32 = 64 * 1024 * 1024;

/// Everything a decoder writes through for one rectangle.
pub struct DecodeContext<'a> {
    /// Pixel format fixed for the current update cycle.
    pub format: &'a ColorFormat,
    pub store: &'a mut dyn FramebufferStore,
    pub scratch: &'a mut ScratchBuffers,
}

impl DecodeContext<'_> {
    /// Whether `area` can be stored. A rejected area is handed to
    /// [`FramebufferStore::refetch`] so its resident part is fetched again.
    pub fn accept(&mut self, area: &Rect) -> bool {
        accept_in(&mut *self.store, area)
    }
}

/// Body of [`DecodeContext::accept`], borrowing only the store so callers
/// can hold the scratch buffers at the same time.
pub(crate) fn accept_in(store: &mut dyn FramebufferStore, area: &Rect) -> bool {
    if store.valid_draw(area) {
        return true;
    }
    store.refetch(area);
    false
}

/// A decoder for one rectangle encoding.
///
/// # Contract
///
/// Implementors must:
/// - Read exactly the bytes for the rectangle as defined by their encoding,
///   whether or not the rectangle is drawable
/// - Write pixels only when [`DecodeContext::accept`] accepts the
///   rectangle (or, for tiled encodings, the tile)
/// - Request a redraw through [`FramebufferStore::update_region`] after
///   drawing
/// - Fail with a clear error on malformed input; the stream cannot be
///   resynchronized afterwards
#[allow(async_fn_in_trait)]
pub trait Decoder {
    /// The RFB encoding id this decoder handles.
    fn encoding_type(&self) -> i32;

    /// Decode a single rectangle from `stream` into `ctx.store`.
    async fn decode<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        ctx: &mut DecodeContext<'_>,
    ) -> Result<()>;
}

/// One decoder of the closed set this client supports.
pub enum DecoderEntry {
    Raw(RawDecoder),
    CopyRect(CopyRectDecoder),
    Rre(RreDecoder),
    CoRre(CoRreDecoder),
    Hextile(HextileDecoder),
    Zlib(ZlibDecoder),
    Zrle(ZrleDecoder),
}

impl DecoderEntry {
    /// A fresh decoder for `encoding`.
    pub fn new(encoding: Encoding) -> Self {
        match encoding {
            Encoding::Raw => DecoderEntry::Raw(RawDecoder),
            Encoding::CopyRect => DecoderEntry::CopyRect(CopyRectDecoder),
            Encoding::Rre => DecoderEntry::Rre(RreDecoder),
            Encoding::CoRre => DecoderEntry::CoRre(CoRreDecoder),
            Encoding::Hextile => DecoderEntry::Hextile(HextileDecoder),
            Encoding::Zlib => DecoderEntry::Zlib(ZlibDecoder::new()),
            Encoding::Zrle => DecoderEntry::Zrle(ZrleDecoder::new()),
        }
    }
}

impl Decoder for DecoderEntry {
    fn encoding_type(&self) -> i32 {
        match self {
            DecoderEntry::Raw(d) => d.encoding_type(),
            DecoderEntry::CopyRect(d) => d.encoding_type(),
            DecoderEntry::Rre(d) => d.encoding_type(),
            DecoderEntry::CoRre(d) => d.encoding_type(),
            DecoderEntry::Hextile(d) => d.encoding_type(),
            DecoderEntry::Zlib(d) => d.encoding_type(),
            DecoderEntry::Zrle(d) => d.encoding_type(),
        }
    }

    async fn decode<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        ctx: &mut DecodeContext<'_>,
    ) -> Result<()> {
        match self {
            DecoderEntry::Raw(d) => d.decode(stream, rect, ctx).await,
            DecoderEntry::CopyRect(d) => d.decode(stream, rect, ctx).await,
            DecoderEntry::Rre(d) => d.decode(stream, rect, ctx).await,
            DecoderEntry::CoRre(d) => d.decode(stream, rect, ctx).await,
            DecoderEntry::Hextile(d) => d.decode(stream, rect, ctx).await,
            DecoderEntry::Zlib(d) => d.decode(stream, rect, ctx).await,
            DecoderEntry::Zrle(d) => d.decode(stream, rect, ctx).await,
        }
    }
}

/// The decoders of one connection. Stateful decoders (the two zlib-based
/// ones) keep their inflate streams for as long as the set lives.
pub struct DecoderSet {
    entries: Vec<DecoderEntry>,
}

impl DecoderSet {
    pub fn new() -> Self {
        let entries = [
            Encoding::Raw,
            Encoding::CopyRect,
            Encoding::Rre,
            Encoding::CoRre,
            Encoding::Hextile,
            Encoding::Zlib,
            Encoding::Zrle,
        ]
        .into_iter()
        .map(DecoderEntry::new)
        .collect();
        Self { entries }
    }

    fn slot(encoding: Encoding) -> usize {
        match encoding {
            Encoding::Raw => 0,
            Encoding::CopyRect => 1,
            Encoding::Rre => 2,
            Encoding::CoRre => 3,
            Encoding::Hextile => 4,
            Encoding::Zlib => 5,
            Encoding::Zrle => 6,
        }
    }

    /// The decoder for `encoding`.
    pub fn get_mut(&mut self, encoding: Encoding) -> &mut DecoderEntry {
        &mut self.entries[Self::slot(encoding)]
    }

    /// Decode one rectangle with the decoder for `encoding`.
    pub async fn decode<R: AsyncRead + Unpin>(
        &mut self,
        encoding: Encoding,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        ctx: &mut DecodeContext<'_>,
    ) -> Result<()> {
        self.get_mut(encoding)
            .decode(stream, rect, ctx)
            .await
            .with_context(|| {
                format!(
                    "{} rectangle [{},{} {}x{}]",
                    encoding, rect.x, rect.y, rect.width, rect.height
                )
            })
    }
}

impl Default for DecoderSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Widen a wire rectangle into framebuffer geometry.
pub fn rect_of(rect: &Rectangle) -> Rect {
    Rect::new(
        i32::from(rect.x),
        i32::from(rect.y),
        u32::from(rect.width),
        u32::from(rect.height),
    )
}

/// Read one pixel in the active format.
pub(crate) async fn read_pixel<R: AsyncRead + Unpin>(
    stream: &mut RfbInStream<R>,
    format: &ColorFormat,
) -> Result<u32> {
    let mut buf = [0u8; 4];
    let bpp = format.bytes_per_pixel();
    stream.read_bytes(&mut buf[..bpp]).await?;
    Ok(format.decode_pixel(&buf))
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_entries_report_their_encoding() {
        let mut set = DecoderSet::new();
        for encoding in Encoding::FALLBACK_ORDER
            .into_iter()
            .chain([Encoding::CopyRect])
        {
            assert_eq!(set.get_mut(encoding).encoding_type(), encoding.id());
        }
    }

    #[test]
    fn test_encoding_constants() {
        assert_eq!(ENCODING_RAW, 0);
        assert_eq!(ENCODING_COPYRECT, 1);
        assert_eq!(ENCODING_RRE, 2);
        assert_eq!(ENCODING_CORRE, 4);
        assert_eq!(ENCODING_HEXTILE, 5);
        assert_eq!(ENCODING_ZLIB, 6);
        assert_eq!(ENCODING_ZRLE, 16);
    }

    #[tokio::test]
    async fn test_set_adds_rectangle_context_to_errors() {
        let mut h = Harness::new(4, 4);
        let mut set = DecoderSet::new();
        let mut s = stream(vec![1, 2]);
        let err = set
            .decode(Encoding::Raw, &mut s, &rect(1, 2, 3, 4, ENCODING_RAW), &mut h.ctx())
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("RAW rectangle [1,2 3x4]"));
    }

    #[tokio::test]
    async fn test_read_pixel_indexed() {
        let format = ColorFormat::truecolor().with_palette({
            let mut p = [0u32; 256];
            p[9] = 0x123456;
            p
        });
        let mut s = stream(vec![9]);
        assert_eq!(read_pixel(&mut s, &format).await.unwrap(), 0xFF12_3456);
    }
}
