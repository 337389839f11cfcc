//! Classification of rectangle headers and payload skipping for rectangles
//! that carry no pixels for the framebuffer.
//!
//! Pixel encodings go to a [`Decoder`](crate::Decoder). Pseudo-encodings
//! are handled by the dispatch loop: `LastRect` ends the update early,
//! `DesktopSize` resizes the framebuffer, and the cursor pseudo-encodings
//! carry shape data that this client reads and drops. Anything else is an
//! encoding the client never asked for; its payload is assumed to be Raw
//! sized so that the stream stays framed.

use crate::{Encoding, Rectangle, RfbInStream};
use rfb_protocol::messages::types::{
    PSEUDO_ENCODING_DESKTOP_SIZE, PSEUDO_ENCODING_LAST_RECT, PSEUDO_ENCODING_POINTER_POS,
    PSEUDO_ENCODING_RICH_CURSOR, PSEUDO_ENCODING_X_CURSOR,
};
use std::io;
use tokio::io::AsyncRead;

/// What a rectangle header's encoding id asks the dispatch loop to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RectKind {
    Pixels(Encoding),
    LastRect,
    DesktopSize,
    /// Cursor shape or position, payload skipped.
    Cursor(i32),
    Unknown(i32),
}

impl RectKind {
    pub fn of(encoding: i32) -> Self {
        if let Some(known) = Encoding::from_id(encoding) {
            return RectKind::Pixels(known);
        }
        match encoding {
            PSEUDO_ENCODING_LAST_RECT => RectKind::LastRect,
            PSEUDO_ENCODING_DESKTOP_SIZE => RectKind::DesktopSize,
            PSEUDO_ENCODING_POINTER_POS
            | PSEUDO_ENCODING_X_CURSOR
            | PSEUDO_ENCODING_RICH_CURSOR => RectKind::Cursor(encoding),
            other => RectKind::Unknown(other),
        }
    }
}

/// Bytes following a cursor pseudo-rectangle header.
pub fn cursor_payload_len(rect: &Rectangle, bytes_per_pixel: usize) -> usize {
    let w = usize::from(rect.width);
    let h = usize::from(rect.height);
    let mask = w.div_ceil(8) * h;
    match rect.encoding {
        PSEUDO_ENCODING_X_CURSOR if w * h > 0 => 6 + 2 * mask,
        PSEUDO_ENCODING_RICH_CURSOR => w * h * bytes_per_pixel + mask,
        _ => 0,
    }
}

/// Bytes assumed to follow a rectangle in an unrecognized encoding.
pub fn unknown_payload_len(rect: &Rectangle, bytes_per_pixel: usize) -> usize {
    usize::from(rect.width) * usize::from(rect.height) * bytes_per_pixel
}

/// Consume the payload of a cursor pseudo-rectangle.
pub async fn skip_cursor<R: AsyncRead + Unpin>(
    stream: &mut RfbInStream<R>,
    rect: &Rectangle,
    bytes_per_pixel: usize,
) -> io::Result<()> {
    let len = cursor_payload_len(rect, bytes_per_pixel);
    tracing::trace!(
        target: "rfb_encodings::framing",
        "skipping cursor pseudo-rectangle {}: {}x{} ({} bytes)",
        rect.encoding, rect.width, rect.height, len
    );
    stream.skip(len).await
}

/// Consume the payload of a rectangle in an encoding this client does not
/// decode.
pub async fn skip_unknown<R: AsyncRead + Unpin>(
    stream: &mut RfbInStream<R>,
    rect: &Rectangle,
    bytes_per_pixel: usize,
) -> io::Result<()> {
    let len = unknown_payload_len(rect, bytes_per_pixel);
    tracing::warn!(
        "unsupported rectangle encoding {} at [{},{} {}x{}], skipping {} bytes",
        rect.encoding, rect.x, rect.y, rect.width, rect.height, len
    );
    stream.skip(len).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{rect, stream};
    use rfb_protocol::messages::types::ENCODING_TIGHT;

    #[test]
    fn test_classification() {
        assert_eq!(RectKind::of(0), RectKind::Pixels(Encoding::Raw));
        assert_eq!(RectKind::of(16), RectKind::Pixels(Encoding::Zrle));
        assert_eq!(RectKind::of(-224), RectKind::LastRect);
        assert_eq!(RectKind::of(-223), RectKind::DesktopSize);
        assert_eq!(RectKind::of(-232), RectKind::Cursor(-232));
        assert_eq!(RectKind::of(-239), RectKind::Cursor(-239));
        assert_eq!(RectKind::of(ENCODING_TIGHT), RectKind::Unknown(7));
        assert_eq!(RectKind::of(-1000), RectKind::Unknown(-1000));
    }

    #[test]
    fn test_cursor_payload_lengths() {
        // 10x3 cursor: mask rows are 2 bytes wide.
        let x = rect(0, 0, 10, 3, PSEUDO_ENCODING_X_CURSOR);
        assert_eq!(cursor_payload_len(&x, 4), 6 + 2 * 6);
        let rich = rect(0, 0, 10, 3, PSEUDO_ENCODING_RICH_CURSOR);
        assert_eq!(cursor_payload_len(&rich, 4), 120 + 6);
        assert_eq!(cursor_payload_len(&rich, 1), 30 + 6);

        let empty = rect(0, 0, 0, 0, PSEUDO_ENCODING_X_CURSOR);
        assert_eq!(cursor_payload_len(&empty, 4), 0);
        let pos = rect(5, 5, 0, 0, PSEUDO_ENCODING_POINTER_POS);
        assert_eq!(cursor_payload_len(&pos, 4), 0);
    }

    #[tokio::test]
    async fn test_skip_unknown_keeps_stream_framed() {
        let mut data = vec![0xAA; 2 * 2 * 4];
        data.push(0x42);
        let mut s = stream(data);
        skip_unknown(&mut s, &rect(0, 0, 2, 2, ENCODING_TIGHT), 4)
            .await
            .unwrap();
        assert_eq!(s.read_u8().await.unwrap(), 0x42);
    }

    #[tokio::test]
    async fn test_skip_rich_cursor() {
        let mut data = vec![0; 4 + 2];
        data.push(0x42);
        let mut s = stream(data);
        skip_cursor(&mut s, &rect(0, 0, 2, 2, PSEUDO_ENCODING_RICH_CURSOR), 1)
            .await
            .unwrap();
        assert_eq!(s.read_u8().await.unwrap(), 0x42);
    }
}
