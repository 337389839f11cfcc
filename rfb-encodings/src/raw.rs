//! Raw encoding decoder - uncompressed pixel data.
//!
//! Raw encoding (type 0) transmits `width * height` pixels in the active
//! color model, row-major, with no compression.
//!
//! # Wire Format
//!
//! ```text
//! +-------------+
//! | Pixel data  |  width * height * bytes_per_pixel bytes
//! +-------------+
//! ```
//!
//! With the 256-color model each pixel is one palette index; with the
//! truecolor model each is four bytes `[B, G, R, x]`.

use crate::{
    rect_of, ColorFormat, DecodeContext, Decoder, FramebufferStore, Rectangle, RfbInStream,
    ENCODING_RAW,
};
use anyhow::{Context, Result};
use rfb_common::Rect;
use tokio::io::AsyncRead;

/// Decoder for raw (uncompressed) pixel data.
pub struct RawDecoder;

impl Decoder for RawDecoder {
    fn encoding_type(&self) -> i32 {
        ENCODING_RAW
    }

    async fn decode<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        ctx: &mut DecodeContext<'_>,
    ) -> Result<()> {
        let buffer_before = stream.available();
        tracing::trace!(
            target: "rfb_encodings::framing",
            "Raw decode start: rect=[{},{} {}x{}] buffer_before={}",
            rect.x, rect.y, rect.width, rect.height,
            buffer_before
        );

        let area = rect_of(rect);
        let draw = area.is_empty() || ctx.accept(&area);
        decode_raw_block(stream, area, draw, ctx)
            .await
            .context("Failed to read raw pixel data from stream")?;
        if draw && !area.is_empty() {
            ctx.store.update_region(&area);
        }

        tracing::trace!(
            target: "rfb_encodings::framing",
            "Raw decode end: buffer_after={}",
            stream.available()
        );
        Ok(())
    }
}

/// Consume a raw block covering `area` and, when `draw` is set, store it.
///
/// Shared by Raw rectangles, Hextile raw tiles and Zlib rectangles (the
/// latter after inflating).
pub(crate) async fn decode_raw_block<R: AsyncRead + Unpin>(
    stream: &mut RfbInStream<R>,
    area: Rect,
    draw: bool,
    ctx: &mut DecodeContext<'_>,
) -> Result<()> {
    let count = area.area() as usize;
    let bpp = ctx.format.bytes_per_pixel();
    let total = count
        .checked_mul(bpp)
        .context("raw block size overflows")?;
    if total == 0 {
        return Ok(());
    }
    if !draw {
        stream.skip(total).await?;
        return Ok(());
    }

    let parts = ctx.scratch.parts();
    let bytes = crate::scratch::grow(parts.bytes, total)?;
    stream.read_bytes(bytes).await?;
    let pixels = crate::scratch::grow(parts.pixels, count)?;
    ctx.format.decode_pixels(bytes, bpp, pixels);
    ctx.store.image_rect(&area, pixels);
    Ok(())
}

/// Store raw pixel bytes already held in memory.
pub(crate) fn draw_raw_bytes(
    bytes: &[u8],
    area: Rect,
    format: &ColorFormat,
    pixels: &mut Vec<u32>,
    store: &mut dyn FramebufferStore,
) -> Result<()> {
    let pixels = crate::scratch::grow(pixels, area.area() as usize)?;
    format.decode_pixels(bytes, format.bytes_per_pixel(), pixels);
    store.image_rect(&area, pixels);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    #[tokio::test]
    async fn test_raw_decoder_type() {
        assert_eq!(RawDecoder.encoding_type(), ENCODING_RAW);
    }

    #[tokio::test]
    async fn test_decode_empty_rectangle() {
        let mut h = Harness::new(10, 10);
        let mut s = stream(vec![]);
        RawDecoder
            .decode(&mut s, &rect(0, 0, 0, 5, ENCODING_RAW), &mut h.ctx())
            .await
            .unwrap();
        assert!(!h.redraws.try_changed());
    }

    #[tokio::test]
    async fn test_decode_truecolor_pixels() {
        let mut h = Harness::new(4, 4);
        let mut data = Vec::new();
        data.extend_from_slice(&px(0xFF0000));
        data.extend_from_slice(&px(0x00FF00));
        let mut s = stream(data);

        RawDecoder
            .decode(&mut s, &rect(1, 2, 2, 1, ENCODING_RAW), &mut h.ctx())
            .await
            .unwrap();

        assert_eq!(h.pixel(1, 2), 0xFFFF_0000);
        assert_eq!(h.pixel(2, 2), 0xFF00_FF00);
        assert_eq!(h.pixel(0, 0), BLACK);
        assert_eq!(h.redraws.take_dirty(), Some(Rect::new(1, 2, 2, 1)));
    }

    #[tokio::test]
    async fn test_palette_rectangle_scenario() {
        let mut palette = [0u32; 256];
        palette[1] = 0xFF0000;
        palette[2] = 0x00FF00;
        palette[3] = 0x0000FF;
        palette[4] = 0xFFFFFF;
        let format = ColorFormat::truecolor().with_palette(palette);
        let mut h = Harness::with_format(2, 2, format);

        let mut s = stream(vec![1, 2, 3, 4]);
        RawDecoder
            .decode(&mut s, &rect(0, 0, 2, 2, ENCODING_RAW), &mut h.ctx())
            .await
            .unwrap();

        assert_eq!(
            h.pixels(),
            vec![0xFFFF_0000, 0xFF00_FF00, 0xFF00_00FF, 0xFFFF_FFFF]
        );
    }

    #[tokio::test]
    async fn test_out_of_bounds_is_consumed_not_drawn() {
        let mut h = Harness::new(2, 2);
        let mut data = vec![0xAB; 3 * 3 * 4];
        data.push(0x42);
        let mut s = stream(data);

        RawDecoder
            .decode(&mut s, &rect(1, 1, 3, 3, ENCODING_RAW), &mut h.ctx())
            .await
            .unwrap();

        assert!(h.pixels().iter().all(|&p| p == BLACK));
        assert!(!h.redraws.try_changed());
        assert_eq!(s.read_u8().await.unwrap(), 0x42);
    }

    #[tokio::test]
    async fn test_decode_eof_error() {
        let mut h = Harness::new(4, 4);
        let mut s = stream(vec![0; 7]);
        let err = RawDecoder
            .decode(&mut s, &rect(0, 0, 2, 1, ENCODING_RAW), &mut h.ctx())
            .await
            .unwrap_err();
        let io = err.downcast_ref::<std::io::Error>().unwrap();
        assert_eq!(io.kind(), std::io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_roundtrip_through_color_format() {
        let mut h = Harness::new(3, 1);
        let colors = [0x102030, 0xABCDEF, 0x000001];
        let data: Vec<u8> = colors
            .iter()
            .flat_map(|&c| h.format.encode_pixel(c))
            .collect();
        let mut s = stream(data);

        RawDecoder
            .decode(&mut s, &rect(0, 0, 3, 1, ENCODING_RAW), &mut h.ctx())
            .await
            .unwrap();

        let decoded: Vec<u32> = h.pixels().iter().map(|p| p & 0x00FF_FFFF).collect();
        assert_eq!(decoded, colors);
    }

    #[tokio::test]
    async fn test_straddling_rect_is_consumed_and_refetched() {
        use crate::FramebufferStore;

        let mut h = Harness::windowed(1000, 800, (100, 50));
        let mut data = Vec::new();
        for _ in 0..20 * 20 {
            data.extend_from_slice(&px(0xFFFFFF));
        }
        data.push(0x42);
        let mut s = stream(data);

        RawDecoder
            .decode(&mut s, &rect(90, 40, 20, 20, ENCODING_RAW), &mut h.ctx())
            .await
            .unwrap();
        assert_eq!(s.read_u8().await.unwrap(), 0x42);

        let requests = h.store.sync_scroll();
        assert_eq!(requests.len(), 1);
        let r = &requests[0];
        assert_eq!((r.x, r.y, r.width, r.height), (90, 40, 10, 10));
        assert!(!r.incremental);
    }
}
