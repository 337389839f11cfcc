//! Client-to-server RFB messages.
//!
//! These are only ever written by this client, so each type provides
//! `write_to` and nothing else. Writing only buffers the bytes; the caller
//! flushes the [`RfbOutStream`] once the message is complete.

use super::types::{
    PixelFormat, MSG_CLIENT_CUT_TEXT, MSG_FRAMEBUFFER_UPDATE_REQUEST, MSG_KEY_EVENT,
    MSG_POINTER_EVENT, MSG_SET_ENCODINGS, MSG_SET_PIXEL_FORMAT,
};
use crate::io::RfbOutStream;
use tokio::io::AsyncWrite;

/// ClientInit message.
///
/// # Wire Format
///
/// - 1 byte: shared flag (0 = exclusive, 1 = shared)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientInit {
    pub shared: bool,
}

impl ClientInit {
    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(u8::from(self.shared));
    }
}

/// SetPixelFormat message.
///
/// # Wire Format
///
/// - 1 byte: message type (0)
/// - 3 bytes: padding
/// - 16 bytes: PixelFormat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetPixelFormat {
    pub pixel_format: PixelFormat,
}

impl SetPixelFormat {
    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(MSG_SET_PIXEL_FORMAT);
        stream.write_bytes(&[0, 0, 0]);
        self.pixel_format.write_to(stream);
    }
}

/// SetEncodings message.
///
/// # Wire Format
///
/// - 1 byte: message type (2)
/// - 1 byte: padding
/// - 2 bytes: number of encodings
/// - N * 4 bytes: encoding types (signed i32 each), most preferred first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetEncodings {
    pub encodings: Vec<i32>,
}

impl SetEncodings {
    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(MSG_SET_ENCODINGS);
        stream.write_u8(0);
        stream.write_u16(self.encodings.len() as u16);
        for encoding in &self.encodings {
            stream.write_i32(*encoding);
        }
    }
}

/// FramebufferUpdateRequest message.
///
/// # Wire Format
///
/// - 1 byte: message type (3)
/// - 1 byte: incremental (0 = full update, 1 = incremental)
/// - 2 bytes each: x, y, width, height
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferUpdateRequest {
    pub incremental: bool,
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl FramebufferUpdateRequest {
    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(MSG_FRAMEBUFFER_UPDATE_REQUEST);
        stream.write_u8(u8::from(self.incremental));
        stream.write_u16(self.x);
        stream.write_u16(self.y);
        stream.write_u16(self.width);
        stream.write_u16(self.height);
    }
}

/// KeyEvent message.
///
/// # Wire Format
///
/// - 1 byte: message type (4)
/// - 1 byte: down flag
/// - 2 bytes: padding
/// - 4 bytes: X11 keysym
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub down: bool,
    pub key: u32,
}

impl KeyEvent {
    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(MSG_KEY_EVENT);
        stream.write_u8(u8::from(self.down));
        stream.write_bytes(&[0, 0]);
        stream.write_u32(self.key);
    }
}

/// PointerEvent message.
///
/// # Wire Format
///
/// - 1 byte: message type (5)
/// - 1 byte: button mask (bit 0 = button 1, ...)
/// - 2 bytes: x position
/// - 2 bytes: y position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerEvent {
    pub button_mask: u8,
    pub x: u16,
    pub y: u16,
}

impl PointerEvent {
    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(MSG_POINTER_EVENT);
        stream.write_u8(self.button_mask);
        stream.write_u16(self.x);
        stream.write_u16(self.y);
    }
}

/// ClientCutText message.
///
/// # Wire Format
///
/// - 1 byte: message type (6)
/// - 3 bytes: padding
/// - 4 bytes: text length
/// - N bytes: Latin-1 text; characters outside Latin-1 are sent as `?`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCutText {
    pub text: String,
}

impl ClientCutText {
    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        let latin1: Vec<u8> = self
            .text
            .chars()
            .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
            .collect();
        stream.write_u8(MSG_CLIENT_CUT_TEXT);
        stream.write_bytes(&[0, 0, 0]);
        stream.write_u32(latin1.len() as u32);
        stream.write_bytes(&latin1);
    }
}

/// All client-to-server messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    SetPixelFormat(SetPixelFormat),
    SetEncodings(SetEncodings),
    FramebufferUpdateRequest(FramebufferUpdateRequest),
    KeyEvent(KeyEvent),
    PointerEvent(PointerEvent),
    ClientCutText(ClientCutText),
}

impl ClientMessage {
    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        match self {
            ClientMessage::SetPixelFormat(msg) => msg.write_to(stream),
            ClientMessage::SetEncodings(msg) => msg.write_to(stream),
            ClientMessage::FramebufferUpdateRequest(msg) => msg.write_to(stream),
            ClientMessage::KeyEvent(msg) => msg.write_to(stream),
            ClientMessage::PointerEvent(msg) => msg.write_to(stream),
            ClientMessage::ClientCutText(msg) => msg.write_to(stream),
        }
    }
}
