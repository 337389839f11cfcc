//! Application-facing message types for communication between the client and application.

use crate::errors::ErrorKind;
use rfb_pixelbuffer::ColorModel;
use rfb_protocol::messages::Encoding;
use std::borrow::Cow;

/// Events sent from the session worker to the application.
///
/// Every session ends with exactly one terminal event, either
/// [`ServerEvent::Error`] or [`ServerEvent::ConnectionClosed`], after which
/// no further events are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Session reached normal protocol operation.
    Connected {
        /// Framebuffer width in pixels.
        width: u16,
        /// Framebuffer height in pixels.
        height: u16,
        /// Desktop name announced by the server.
        name: String,
    },

    /// The server changed the desktop size.
    DesktopResized {
        /// New width in pixels.
        width: u16,
        /// New height in pixels.
        height: u16,
    },

    /// Server sent a bell notification.
    Bell,

    /// The session failed. Terminal.
    Error {
        kind: ErrorKind,
        message: Cow<'static, str>,
    },

    /// The session ended normally: closed locally or by the server between
    /// messages. Terminal.
    ConnectionClosed,
}

impl ServerEvent {
    /// True for the events that end a session.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServerEvent::Error { .. } | ServerEvent::ConnectionClosed)
    }
}

/// Commands sent from the application to the session worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// Request an update of the resident window.
    RequestUpdate {
        /// If true, only changed regions are sent.
        incremental: bool,
    },

    /// Change the encoding asked for first. Takes effect with the next
    /// SetEncodings, which is only sent if the list actually changed.
    SetPreferredEncoding(Encoding),

    /// Switch pixel format. Applied after the current update completes.
    SetColorModel(ColorModel),

    /// Move the windowed viewport's origin (no-op for a full store).
    ScrollTo { x: i32, y: i32 },

    /// Send pointer (mouse) event.
    Pointer {
        x: u16,
        y: u16,
        /// Button mask (bit 0 = left, bit 1 = middle, bit 2 = right).
        buttons: u8,
    },

    /// Send keyboard event.
    Key {
        /// X11 keysym value.
        key: u32,
        /// True if key was pressed, false if released.
        down: bool,
    },

    /// Send clipboard text to the server.
    ClientCutText { text: String },
}
