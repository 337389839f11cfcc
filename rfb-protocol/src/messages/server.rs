//! Server-to-client RFB messages.
//!
//! The message-type byte is read by the caller (the dispatch loop needs to
//! tell a clean close at a message boundary apart from a truncated message),
//! so every `read_from` here starts at the first byte after the type.

use super::types::{
    PixelFormat, MSG_BELL, MSG_FRAMEBUFFER_UPDATE, MSG_SERVER_CUT_TEXT,
    MSG_SET_COLOUR_MAP_ENTRIES, MSG_TEXT_CHAT,
};
use crate::io::{RfbInStream, RfbOutStream};
use tokio::io::{AsyncRead, AsyncWrite};

/// Upper bound on the desktop name accepted in ServerInit.
pub const MAX_NAME_LENGTH: usize = 64 * 1024;

/// ServerInit message - initial server parameters.
///
/// # Wire Format
///
/// - 2 bytes: framebuffer width
/// - 2 bytes: framebuffer height
/// - 16 bytes: PixelFormat
/// - 4 bytes: name length
/// - N bytes: name string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInit {
    pub framebuffer_width: u16,
    pub framebuffer_height: u16,
    pub pixel_format: PixelFormat,
    pub name: String,
}

impl ServerInit {
    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        let framebuffer_width = stream.read_u16().await?;
        let framebuffer_height = stream.read_u16().await?;
        let pixel_format = PixelFormat::read_from(stream).await?;
        let name = stream.read_string(MAX_NAME_LENGTH).await?;

        Ok(Self {
            framebuffer_width,
            framebuffer_height,
            pixel_format,
            name,
        })
    }

    /// Write ServerInit; used by scripted test servers.
    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u16(self.framebuffer_width);
        stream.write_u16(self.framebuffer_height);
        self.pixel_format.write_to(stream);
        stream.write_u32(self.name.len() as u32);
        stream.write_bytes(self.name.as_bytes());
    }
}

/// FramebufferUpdate header.
///
/// # Wire Format
///
/// - 1 byte: padding
/// - 2 bytes: number of rectangles (`0xFFFF` when the server terminates
///   the update with a LastRect rectangle instead)
///
/// The rectangles themselves are read one at a time by the dispatch loop,
/// because each body must be consumed by its decoder before the next header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferUpdate {
    pub num_rectangles: u16,
}

impl FramebufferUpdate {
    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        stream.skip(1).await?;
        Ok(Self {
            num_rectangles: stream.read_u16().await?,
        })
    }
}

/// ServerCutText message. The text body is consumed and dropped.
///
/// # Wire Format
///
/// - 3 bytes: padding
/// - 4 bytes: text length
/// - N bytes: text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerCutText {
    pub length: u32,
}

impl ServerCutText {
    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        stream.skip(3).await?;
        let length = stream.read_u32().await?;
        stream.skip(length as usize).await?;
        Ok(Self { length })
    }
}

/// UltraVNC TextChat message. Chat text is consumed and dropped.
///
/// # Wire Format
///
/// - 3 bytes: padding
/// - 4 bytes: length, or one of the control codes below (no body follows)
/// - N bytes: chat text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextChat {
    Open,
    Close,
    Finished,
    Message { length: u32 },
}

impl TextChat {
    pub const CHAT_OPEN: u32 = 0xFFFF_FFFF;
    pub const CHAT_CLOSE: u32 = 0xFFFF_FFFE;
    pub const CHAT_FINISHED: u32 = 0xFFFF_FFFD;

    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        stream.skip(3).await?;
        match stream.read_u32().await? {
            Self::CHAT_OPEN => Ok(TextChat::Open),
            Self::CHAT_CLOSE => Ok(TextChat::Close),
            Self::CHAT_FINISHED => Ok(TextChat::Finished),
            length => {
                stream.skip(length as usize).await?;
                Ok(TextChat::Message { length })
            }
        }
    }
}

/// A server message after its type byte has been read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMessage {
    /// Header only; rectangles follow on the stream.
    FramebufferUpdate(FramebufferUpdate),
    /// Recognised but unsupported; its body is left unread.
    SetColorMapEntries,
    Bell,
    ServerCutText(ServerCutText),
    TextChat(TextChat),
}

impl ServerMessage {
    /// Read the body of a message whose type byte was `msg_type`.
    ///
    /// Unknown types yield `InvalidData`.
    pub async fn read_body<R: AsyncRead + Unpin>(
        msg_type: u8,
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        match msg_type {
            MSG_FRAMEBUFFER_UPDATE => Ok(ServerMessage::FramebufferUpdate(
                FramebufferUpdate::read_from(stream).await?,
            )),
            MSG_SET_COLOUR_MAP_ENTRIES => Ok(ServerMessage::SetColorMapEntries),
            MSG_BELL => Ok(ServerMessage::Bell),
            MSG_SERVER_CUT_TEXT => Ok(ServerMessage::ServerCutText(
                ServerCutText::read_from(stream).await?,
            )),
            MSG_TEXT_CHAT => Ok(ServerMessage::TextChat(TextChat::read_from(stream).await?)),
            other => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unknown server message type: {other}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_server_init() {
        let mut data = vec![0x07, 0x80, 0x04, 0x38];
        data.extend_from_slice(&[32, 24, 0, 1, 0, 255, 0, 255, 0, 255, 16, 8, 0, 0, 0, 0]);
        data.extend_from_slice(&[0, 0, 0, 4]);
        data.extend_from_slice(b"desk");
        let mut stream = RfbInStream::new(Cursor::new(data));

        let init = ServerInit::read_from(&mut stream).await.unwrap();
        assert_eq!(init.framebuffer_width, 1920);
        assert_eq!(init.framebuffer_height, 1080);
        assert_eq!(init.pixel_format.bits_per_pixel, 32);
        assert_eq!(init.name, "desk");
    }

    #[tokio::test]
    async fn test_framebuffer_update_header() {
        let mut stream = RfbInStream::new(Cursor::new(vec![0, 0xFF, 0xFF]));
        let msg = ServerMessage::read_body(MSG_FRAMEBUFFER_UPDATE, &mut stream)
            .await
            .unwrap();
        assert_eq!(
            msg,
            ServerMessage::FramebufferUpdate(FramebufferUpdate {
                num_rectangles: 0xFFFF
            })
        );
    }

    #[tokio::test]
    async fn test_cut_text_is_consumed() {
        let mut data = vec![0, 0, 0, 0, 0, 0, 3];
        data.extend_from_slice(b"abc");
        data.push(MSG_BELL);
        let mut stream = RfbInStream::new(Cursor::new(data));

        let msg = ServerMessage::read_body(MSG_SERVER_CUT_TEXT, &mut stream)
            .await
            .unwrap();
        assert_eq!(msg, ServerMessage::ServerCutText(ServerCutText { length: 3 }));
        assert_eq!(stream.read_u8().await.unwrap(), MSG_BELL);
    }

    #[tokio::test]
    async fn test_text_chat_control_codes_have_no_body() {
        let data = vec![0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFE, MSG_BELL];
        let mut stream = RfbInStream::new(Cursor::new(data));

        let msg = ServerMessage::read_body(MSG_TEXT_CHAT, &mut stream)
            .await
            .unwrap();
        assert_eq!(msg, ServerMessage::TextChat(TextChat::Close));
        assert_eq!(stream.read_u8().await.unwrap(), MSG_BELL);
    }

    #[tokio::test]
    async fn test_text_chat_message_is_consumed() {
        let mut data = vec![0, 0, 0, 0, 0, 0, 2];
        data.extend_from_slice(b"hi");
        data.push(MSG_BELL);
        let mut stream = RfbInStream::new(Cursor::new(data));

        let msg = ServerMessage::read_body(MSG_TEXT_CHAT, &mut stream)
            .await
            .unwrap();
        assert_eq!(msg, ServerMessage::TextChat(TextChat::Message { length: 2 }));
        assert_eq!(stream.read_u8().await.unwrap(), MSG_BELL);
    }

    #[tokio::test]
    async fn test_unknown_message_type() {
        let mut stream = RfbInStream::new(Cursor::new(Vec::<u8>::new()));
        let err = ServerMessage::read_body(99, &mut stream).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
