//! CopyRect encoding decoder - copy a block from elsewhere in the framebuffer.
//!
//! # Wire Format
//!
//! ```text
//! +----------+----------+
//! | src_x    | src_y    |  2 bytes each (u16, network byte order)
//! +----------+----------+
//! ```
//!
//! The rectangle header gives the **destination**; the two fields give the
//! top-left corner of the equally sized **source** block. Source and
//! destination may overlap.

use crate::{rect_of, DecodeContext, Decoder, Rectangle, RfbInStream, ENCODING_COPYRECT};
use anyhow::{Context, Result};
use rfb_common::Point;
use tokio::io::AsyncRead;

pub struct CopyRectDecoder;

impl Decoder for CopyRectDecoder {
    fn encoding_type(&self) -> i32 {
        ENCODING_COPYRECT
    }

    async fn decode<R: AsyncRead + Unpin>(
        &mut self,
        stream: &mut RfbInStream<R>,
        rect: &Rectangle,
        ctx: &mut DecodeContext<'_>,
    ) -> Result<()> {
        let src_x = stream
            .read_u16()
            .await
            .context("Failed to read CopyRect src_x")?;
        let src_y = stream
            .read_u16()
            .await
            .context("Failed to read CopyRect src_y")?;

        let dst = rect_of(rect);
        if dst.is_empty() || !ctx.accept(&dst) {
            return Ok(());
        }

        let src = Point::new(i32::from(src_x), i32::from(src_y));
        ctx.store.copy_rect(src, &dst);
        ctx.store.update_region(&dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use crate::FramebufferStore;
    use rfb_common::Rect;

    fn numbered(h: &mut Harness) {
        let (w, ht) = h.store.framebuffer_size();
        let block: Vec<u32> = (0..u32::from(w) * u32::from(ht)).collect();
        let window = h.store.window();
        h.store.image_rect(&window, &block);
    }

    #[tokio::test]
    async fn test_copyrect_decoder_type() {
        assert_eq!(CopyRectDecoder.encoding_type(), ENCODING_COPYRECT);
    }

    #[tokio::test]
    async fn test_empty_rectangle_still_reads_source() {
        let mut h = Harness::new(4, 4);
        let mut s = stream(vec![0, 1, 0, 2, 0x99]);
        CopyRectDecoder
            .decode(&mut s, &rect(0, 0, 0, 0, ENCODING_COPYRECT), &mut h.ctx())
            .await
            .unwrap();
        assert_eq!(s.read_u8().await.unwrap(), 0x99);
    }

    #[tokio::test]
    async fn test_copies_source_to_destination() {
        let mut h = Harness::new(4, 4);
        numbered(&mut h);
        // Source (0,0) 2x2 -> destination (2,2).
        let mut s = stream(vec![0, 0, 0, 0]);
        CopyRectDecoder
            .decode(&mut s, &rect(2, 2, 2, 2, ENCODING_COPYRECT), &mut h.ctx())
            .await
            .unwrap();

        assert_eq!(h.pixel(2, 2), 0);
        assert_eq!(h.pixel(3, 2), 1);
        assert_eq!(h.pixel(2, 3), 4);
        assert_eq!(h.pixel(3, 3), 5);
        // Source untouched.
        assert_eq!(h.pixel(1, 1), 5);
        assert_eq!(h.redraws.take_dirty(), Some(Rect::new(2, 2, 2, 2)));
    }

    #[tokio::test]
    async fn test_identical_source_is_noop() {
        let mut h = Harness::new(8, 8);
        numbered(&mut h);
        let before = h.pixels();

        let mut s = stream(vec![0, 3, 0, 1]);
        CopyRectDecoder
            .decode(&mut s, &rect(3, 1, 4, 4, ENCODING_COPYRECT), &mut h.ctx())
            .await
            .unwrap();
        assert_eq!(h.pixels(), before);
    }

    #[tokio::test]
    async fn test_overlapping_upward_copy() {
        let mut h = Harness::new(3, 3);
        numbered(&mut h);
        // Rows 1..3 move up by one.
        let mut s = stream(vec![0, 0, 0, 1]);
        CopyRectDecoder
            .decode(&mut s, &rect(0, 0, 3, 2, ENCODING_COPYRECT), &mut h.ctx())
            .await
            .unwrap();
        assert_eq!(h.pixels(), vec![3, 4, 5, 6, 7, 8, 6, 7, 8]);
    }

    #[tokio::test]
    async fn test_destination_out_of_bounds_is_ignored() {
        let mut h = Harness::new(4, 4);
        numbered(&mut h);
        let before = h.pixels();
        let mut s = stream(vec![0, 0, 0, 0]);
        CopyRectDecoder
            .decode(&mut s, &rect(3, 3, 2, 2, ENCODING_COPYRECT), &mut h.ctx())
            .await
            .unwrap();
        assert_eq!(h.pixels(), before);
        assert!(!h.redraws.try_changed());
    }

    #[tokio::test]
    async fn test_eof_error() {
        let mut h = Harness::new(4, 4);
        let mut s = stream(vec![0, 1, 0]);
        assert!(CopyRectDecoder
            .decode(&mut s, &rect(0, 0, 1, 1, ENCODING_COPYRECT), &mut h.ctx())
            .await
            .is_err());
    }
}
