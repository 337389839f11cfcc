//! Protocol message helpers for sending client messages.
//!
//! Thin wrappers over `rfb_protocol::messages` that feed the wire trace and
//! flush after each message. Errors are returned as `std::io::Error` so the
//! session can classify them by kind.

use crate::protocol_trace;
use rfb_protocol::io::RfbOutStream;
use rfb_protocol::messages::{
    self as msg, ClientMessage, FramebufferUpdateRequest, PixelFormat,
};
use std::io;
use tokio::io::AsyncWrite;

fn trace_fields(message: &ClientMessage) -> (&'static str, String) {
    match message {
        ClientMessage::SetPixelFormat(m) => (
            "SetPixelFormat",
            format!(
                "bpp={} depth={} true_color={}",
                m.pixel_format.bits_per_pixel, m.pixel_format.depth, m.pixel_format.true_color
            ),
        ),
        ClientMessage::SetEncodings(m) => ("SetEncodings", format!("{:?}", m.encodings)),
        ClientMessage::FramebufferUpdateRequest(m) => (
            "FramebufferUpdateRequest",
            format!(
                "inc={} rect=({},{} {}x{})",
                m.incremental, m.x, m.y, m.width, m.height
            ),
        ),
        ClientMessage::KeyEvent(m) => ("KeyEvent", format!("down={} key=0x{:X}", m.down, m.key)),
        ClientMessage::PointerEvent(m) => (
            "PointerEvent",
            format!("buttons=0x{:02X} pos=({}, {})", m.button_mask, m.x, m.y),
        ),
        ClientMessage::ClientCutText(m) => ("ClientCutText", format!("len={}", m.text.len())),
    }
}

/// Write one client message and flush.
pub async fn send<W: AsyncWrite + Unpin>(
    outstream: &mut RfbOutStream<W>,
    message: &ClientMessage,
) -> io::Result<()> {
    if protocol_trace::enabled() {
        let (name, fields) = trace_fields(message);
        protocol_trace::out_msg(name, || fields);
    }
    message.write_to(outstream);
    outstream.flush().await
}

pub async fn write_set_pixel_format<W: AsyncWrite + Unpin>(
    outstream: &mut RfbOutStream<W>,
    pixel_format: PixelFormat,
) -> io::Result<()> {
    tracing::debug!(
        "Wrote SetPixelFormat (bpp={}, depth={})",
        pixel_format.bits_per_pixel,
        pixel_format.depth
    );
    send(
        outstream,
        &ClientMessage::SetPixelFormat(msg::SetPixelFormat { pixel_format }),
    )
    .await
}

pub async fn write_set_encodings<W: AsyncWrite + Unpin>(
    outstream: &mut RfbOutStream<W>,
    encodings: Vec<i32>,
) -> io::Result<()> {
    tracing::debug!("Wrote SetEncodings: {:?}", encodings);
    send(
        outstream,
        &ClientMessage::SetEncodings(msg::SetEncodings { encodings }),
    )
    .await
}

/// Write a batch of update requests with a single flush at the end.
pub async fn write_update_requests<W: AsyncWrite + Unpin>(
    outstream: &mut RfbOutStream<W>,
    requests: &[FramebufferUpdateRequest],
) -> io::Result<()> {
    if requests.is_empty() {
        return Ok(());
    }
    for request in requests {
        let message = ClientMessage::FramebufferUpdateRequest(*request);
        if protocol_trace::enabled() {
            let (name, fields) = trace_fields(&message);
            protocol_trace::out_msg(name, || fields);
        }
        message.write_to(outstream);
    }
    outstream.flush().await
}
