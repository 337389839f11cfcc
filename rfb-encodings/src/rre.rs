//! RRE and CoRRE decoders - background plus solid sub-rectangles.
//!
//! # Wire Format
//!
//! ```text
//! +------------------+
//! | num_subrects     |  4 bytes (u32)
//! +------------------+
//! | background_pixel |  bytes_per_pixel bytes
//! +------------------+
//! | Subrectangle 1   |
//! |   pixel          |  bytes_per_pixel bytes
//! |   x, y, w, h     |  2 bytes each (RRE) or 1 byte each (CoRRE)
//! +------------------+
//! | ...              |
//! +------------------+
//! ```
//!
//! The background fills the whole rectangle first, then each subrectangle is
//! painted over it. Subrectangle coordinates are relative to the rectangle.
//! CoRRE's 8-bit fields limit rectangles to 255x255.

use crate::{
    read_pixel, rect_of, DecodeContext, Decoder, Rectangle, RfbInStream, ENCODING_CORRE,
    ENCODING_RRE,
};
use anyhow::{Context, Result};
use rfb_common::Rect;
use tokio::io::AsyncRead;

/// Decoder for RRE (Rise-and-Run-length Encoding).
pub struct RreDecoder;

/// Decoder for CoRRE (compact RRE with 8-bit subrectangle geometry).
pub struct CoRreDecoder;

impl Decoder for RreDecoder {
    fn encoding_type(&self) -> i32 {
        ENCODING_RRE
    }

    async fn decode<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        ctx: &mut DecodeContext<'_>,
    ) -> Result<()> {
        decode_rre(stream, rect, ctx, false).await
    }
}

impl Decoder for CoRreDecoder {
    fn encoding_type(&self) -> i32 {
        ENCODING_CORRE
    }

    async fn decode<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        ctx: &mut DecodeContext<'_>,
    ) -> Result<()> {
        decode_rre(stream, rect, ctx, true).await
    }
}

/// Subrectangle `(x, y, w, h)`: 16-bit fields for RRE, 8-bit for CoRRE.
async fn read_geometry<R: AsyncRead + Unpin>(
    stream: &mut RfbInStream<R>,
    compact: bool,
) -> std::io::Result<(u32, u32, u32, u32)> {
    let mut fields = [0u32; 4];
    for field in &mut fields {
        *field = if compact {
            u32::from(stream.read_u8().await?)
        } else {
            u32::from(stream.read_u16().await?)
        };
    }
    Ok((fields[0], fields[1], fields[2], fields[3]))
}

async fn decode_rre<R: AsyncRead + Unpin>(
    stream: &mut RfbInStream<R>,
    rect: &Rectangle,
    ctx: &mut DecodeContext<'_>,
    compact: bool,
) -> Result<()> {
    let num_subrects = stream
        .read_u32()
        .await
        .context("Failed to read number of subrectangles")?;
    let background = read_pixel(stream, ctx.format)
        .await
        .context("Failed to read background pixel")?;

    let area = rect_of(rect);
    let draw = !area.is_empty() && ctx.accept(&area);
    tracing::trace!(
        target: "rfb_encodings::framing",
        "RRE decode: rect=[{},{} {}x{}] subrects={} compact={} draw={}",
        rect.x, rect.y, rect.width, rect.height, num_subrects, compact, draw
    );
    if draw {
        ctx.store.fill_rect(&area, background);
    }

    for i in 0..num_subrects {
        let color = read_pixel(stream, ctx.format)
            .await
            .with_context(|| format!("Failed to read pixel of subrectangle {i}"))?;
        let (x, y, w, h) = read_geometry(stream, compact)
            .await
            .with_context(|| format!("Failed to read geometry of subrectangle {i}"))?;

        if !draw {
            continue;
        }
        let sub = Rect::new(area.x + x as i32, area.y + y as i32, w, h);
        match area.intersect(&sub) {
            Some(clipped) => ctx.store.fill_rect(&clipped, color),
            None => tracing::debug!(?sub, "RRE subrectangle outside its rectangle"),
        }
    }

    if draw {
        ctx.store.update_region(&area);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    fn rre_body(bg: u32, subrects: &[(u32, u16, u16, u16, u16)]) -> Vec<u8> {
        let mut data = (subrects.len() as u32).to_be_bytes().to_vec();
        data.extend_from_slice(&px(bg));
        for &(color, x, y, w, h) in subrects {
            data.extend_from_slice(&px(color));
            for v in [x, y, w, h] {
                data.extend_from_slice(&v.to_be_bytes());
            }
        }
        data
    }

    fn corre_body(bg: u32, subrects: &[(u32, u8, u8, u8, u8)]) -> Vec<u8> {
        let mut data = (subrects.len() as u32).to_be_bytes().to_vec();
        data.extend_from_slice(&px(bg));
        for &(color, x, y, w, h) in subrects {
            data.extend_from_slice(&px(color));
            data.extend_from_slice(&[x, y, w, h]);
        }
        data
    }

    #[tokio::test]
    async fn test_decoder_types() {
        assert_eq!(RreDecoder.encoding_type(), ENCODING_RRE);
        assert_eq!(CoRreDecoder.encoding_type(), ENCODING_CORRE);
    }

    #[tokio::test]
    async fn test_background_only() {
        let mut h = Harness::new(4, 4);
        let mut s = stream(rre_body(0x0000FF, &[]));
        RreDecoder
            .decode(&mut s, &rect(1, 1, 2, 2, ENCODING_RRE), &mut h.ctx())
            .await
            .unwrap();
        assert_eq!(h.pixel(1, 1), 0xFF00_00FF);
        assert_eq!(h.pixel(2, 2), 0xFF00_00FF);
        assert_eq!(h.pixel(3, 3), BLACK);
    }

    #[tokio::test]
    async fn test_subrectangles_are_relative() {
        let mut h = Harness::new(10, 10);
        let body = rre_body(0x000000, &[(0xFF0000, 1, 1, 2, 2), (0x00FF00, 0, 3, 1, 1)]);
        let mut s = stream(body);
        RreDecoder
            .decode(&mut s, &rect(2, 2, 4, 4, ENCODING_RRE), &mut h.ctx())
            .await
            .unwrap();

        assert_eq!(h.pixel(3, 3), 0xFFFF_0000);
        assert_eq!(h.pixel(4, 4), 0xFFFF_0000);
        assert_eq!(h.pixel(5, 5), BLACK);
        assert_eq!(h.pixel(2, 5), 0xFF00_FF00);
    }

    #[tokio::test]
    async fn test_corre_subrect_is_pixel_plus_four_bytes() {
        let mut h = Harness::new(8, 8);
        let mut body = corre_body(0xFFFFFF, &[(0x00FF00, 0, 0, 1, 1), (0x0000FF, 3, 3, 1, 1)]);
        body.push(0x5A);
        assert_eq!(body.len(), 4 + 4 + 2 * (4 + 4) + 1);
        let mut s = stream(body);

        CoRreDecoder
            .decode(&mut s, &rect(0, 0, 4, 4, ENCODING_CORRE), &mut h.ctx())
            .await
            .unwrap();

        assert_eq!(h.pixel(0, 0), 0xFF00_FF00);
        assert_eq!(h.pixel(3, 3), 0xFF00_00FF);
        assert_eq!(h.pixel(1, 1), WHITE);
        assert_eq!(s.read_u8().await.unwrap(), 0x5A);
    }

    #[tokio::test]
    async fn test_subrect_escaping_rectangle_is_clipped() {
        let mut h = Harness::new(8, 8);
        let mut s = stream(rre_body(0x000000, &[(0xFFFFFF, 1, 1, 10, 10)]));
        RreDecoder
            .decode(&mut s, &rect(0, 0, 3, 3, ENCODING_RRE), &mut h.ctx())
            .await
            .unwrap();
        assert_eq!(h.pixel(2, 2), WHITE);
        assert_eq!(h.pixel(3, 3), BLACK);
    }

    #[tokio::test]
    async fn test_invalid_rectangle_consumed_without_drawing() {
        let mut h = Harness::new(4, 4);
        h.fill(WHITE);
        let mut body = rre_body(0x000000, &[(0x123456, 0, 0, 1, 1)]);
        body.push(0x77);
        let mut s = stream(body);

        RreDecoder
            .decode(&mut s, &rect(3, 3, 5, 5, ENCODING_RRE), &mut h.ctx())
            .await
            .unwrap();
        assert!(h.pixels().iter().all(|&p| p == WHITE));
        assert_eq!(s.read_u8().await.unwrap(), 0x77);
    }

    #[tokio::test]
    async fn test_eof_reading_subrect() {
        let mut h = Harness::new(4, 4);
        let mut body = rre_body(0, &[(0, 0, 0, 1, 1)]);
        body.truncate(body.len() - 3);
        let mut s = stream(body);
        let err = RreDecoder
            .decode(&mut s, &rect(0, 0, 4, 4, ENCODING_RRE), &mut h.ctx())
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("subrectangle 0"));
    }

    #[tokio::test]
    async fn test_palette_format_uses_one_byte_pixels() {
        let format = rfb_pixelbuffer::ColorModel::C256.select_format();
        let mut h = Harness::with_format(2, 2, format);
        // count=1, bg index 0x07 (red), subrect index 0xC0 (blue) at (1,1) 1x1
        let mut s = stream(vec![0, 0, 0, 1, 0x07, 0xC0, 0, 1, 0, 1, 0, 1, 0, 1]);
        RreDecoder
            .decode(&mut s, &rect(0, 0, 2, 2, ENCODING_RRE), &mut h.ctx())
            .await
            .unwrap();
        assert_eq!(h.pixels(), vec![0xFFFF_0000, 0xFFFF_0000, 0xFFFF_0000, 0xFF00_00FF]);
    }
}
