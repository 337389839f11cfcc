//! Core RFB wire types and protocol constants.
//!
//! - [`PixelFormat`] - the 16-byte pixel format block
//! - [`Rectangle`] - a FramebufferUpdate rectangle header
//! - [`Encoding`] - the closed set of encodings this client understands
//! - numeric constants for encodings, pseudo-encodings, security types and
//!   message types

use crate::io::{RfbInStream, RfbOutStream};
use tokio::io::{AsyncRead, AsyncWrite};

/// RFB pixel format specification.
///
/// # Wire Format
///
/// PixelFormat is 16 bytes on the wire:
/// - 1 byte: bits_per_pixel
/// - 1 byte: depth
/// - 1 byte: big_endian flag (any non-zero value means true)
/// - 1 byte: true_color flag (any non-zero value means true)
/// - 2 bytes: red_max
/// - 2 bytes: green_max
/// - 2 bytes: blue_max
/// - 1 byte: red_shift
/// - 1 byte: green_shift
/// - 1 byte: blue_shift
/// - 3 bytes: padding
///
/// # Examples
///
/// ```
/// use rfb_protocol::messages::types::PixelFormat;
///
/// let pf = PixelFormat {
///     bits_per_pixel: 32,
///     depth: 24,
///     big_endian: false,
///     true_color: true,
///     red_max: 255,
///     green_max: 255,
///     blue_max: 255,
///     red_shift: 16,
///     green_shift: 8,
///     blue_shift: 0,
/// };
///
/// assert_eq!(pf.bytes_per_pixel(), 4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    pub bits_per_pixel: u8,
    pub depth: u8,
    pub big_endian: bool,
    pub true_color: bool,
    pub red_max: u16,
    pub green_max: u16,
    pub blue_max: u16,
    pub red_shift: u8,
    pub green_shift: u8,
    pub blue_shift: u8,
}

impl PixelFormat {
    /// Bytes occupied by one pixel on the wire.
    pub fn bytes_per_pixel(&self) -> u8 {
        self.bits_per_pixel.div_ceil(8)
    }

    /// Read a PixelFormat. Padding bytes are ignored.
    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        let bits_per_pixel = stream.read_u8().await?;
        let depth = stream.read_u8().await?;
        let big_endian = stream.read_u8().await? != 0;
        let true_color = stream.read_u8().await? != 0;
        let red_max = stream.read_u16().await?;
        let green_max = stream.read_u16().await?;
        let blue_max = stream.read_u16().await?;
        let red_shift = stream.read_u8().await?;
        let green_shift = stream.read_u8().await?;
        let blue_shift = stream.read_u8().await?;
        stream.skip(3).await?;

        Ok(Self {
            bits_per_pixel,
            depth,
            big_endian,
            true_color,
            red_max,
            green_max,
            blue_max,
            red_shift,
            green_shift,
            blue_shift,
        })
    }

    /// Write this PixelFormat.
    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u8(self.bits_per_pixel);
        stream.write_u8(self.depth);
        stream.write_u8(u8::from(self.big_endian));
        stream.write_u8(u8::from(self.true_color));
        stream.write_u16(self.red_max);
        stream.write_u16(self.green_max);
        stream.write_u16(self.blue_max);
        stream.write_u8(self.red_shift);
        stream.write_u8(self.green_shift);
        stream.write_u8(self.blue_shift);
        stream.write_bytes(&[0, 0, 0]);
    }
}

/// Rectangle header for framebuffer updates.
///
/// # Wire Format
///
/// Rectangle header is 12 bytes:
/// - 2 bytes: x position
/// - 2 bytes: y position
/// - 2 bytes: width
/// - 2 bytes: height
/// - 4 bytes: encoding type (signed i32)
///
/// The encoding-specific body follows and is consumed by the matching decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rectangle {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    pub encoding: i32,
}

impl Rectangle {
    /// Read a Rectangle header.
    pub async fn read_from<R: AsyncRead + Unpin>(
        stream: &mut RfbInStream<R>,
    ) -> std::io::Result<Self> {
        Ok(Self {
            x: stream.read_u16().await?,
            y: stream.read_u16().await?,
            width: stream.read_u16().await?,
            height: stream.read_u16().await?,
            encoding: stream.read_i32().await?,
        })
    }

    /// Write a Rectangle header.
    pub fn write_to<W: AsyncWrite + Unpin>(&self, stream: &mut RfbOutStream<W>) {
        stream.write_u16(self.x);
        stream.write_u16(self.y);
        stream.write_u16(self.width);
        stream.write_u16(self.height);
        stream.write_i32(self.encoding);
    }

    /// Number of pixels covered.
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

//
// Encoding type constants
//

pub const ENCODING_RAW: i32 = 0;
pub const ENCODING_COPYRECT: i32 = 1;
pub const ENCODING_RRE: i32 = 2;
pub const ENCODING_CORRE: i32 = 4;
pub const ENCODING_HEXTILE: i32 = 5;
pub const ENCODING_ZLIB: i32 = 6;
/// Tight is recognised in labels only; it is never advertised or decoded.
pub const ENCODING_TIGHT: i32 = 7;
pub const ENCODING_ZRLE: i32 = 16;

//
// Pseudo-encodings
//

/// Terminates a FramebufferUpdate before its declared rectangle count.
pub const PSEUDO_ENCODING_LAST_RECT: i32 = -224;
/// Server-driven framebuffer resize; width/height carry the new size.
pub const PSEUDO_ENCODING_DESKTOP_SIZE: i32 = -223;
/// Cursor position update, no payload.
pub const PSEUDO_ENCODING_POINTER_POS: i32 = -232;
/// Two-colour X cursor shape.
pub const PSEUDO_ENCODING_X_CURSOR: i32 = -240;
/// Full-colour cursor shape with bitmask.
pub const PSEUDO_ENCODING_RICH_CURSOR: i32 = -239;
/// `COMPRESS_LEVEL_0 + n` advertises zlib level `n` (0-9).
pub const PSEUDO_ENCODING_COMPRESS_LEVEL_0: i32 = -256;
/// `QUALITY_LEVEL_0 + n` advertises JPEG quality `n` (0-9).
pub const PSEUDO_ENCODING_QUALITY_LEVEL_0: i32 = -32;

/// Rectangle encodings with a decoder in this client.
///
/// ```
/// use rfb_protocol::messages::types::Encoding;
///
/// assert_eq!(Encoding::from_id(16), Some(Encoding::Zrle));
/// assert_eq!(Encoding::Zrle.id(), 16);
/// assert_eq!(Encoding::from_id(7), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    Raw,
    CopyRect,
    Rre,
    CoRre,
    Hextile,
    Zlib,
    Zrle,
}

impl Encoding {
    /// All decodable encodings, in the client's fallback preference order.
    pub const FALLBACK_ORDER: [Encoding; 6] = [
        Encoding::Zrle,
        Encoding::Hextile,
        Encoding::Zlib,
        Encoding::CoRre,
        Encoding::Rre,
        Encoding::Raw,
    ];

    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            ENCODING_RAW => Some(Encoding::Raw),
            ENCODING_COPYRECT => Some(Encoding::CopyRect),
            ENCODING_RRE => Some(Encoding::Rre),
            ENCODING_CORRE => Some(Encoding::CoRre),
            ENCODING_HEXTILE => Some(Encoding::Hextile),
            ENCODING_ZLIB => Some(Encoding::Zlib),
            ENCODING_ZRLE => Some(Encoding::Zrle),
            _ => None,
        }
    }

    pub fn id(self) -> i32 {
        match self {
            Encoding::Raw => ENCODING_RAW,
            Encoding::CopyRect => ENCODING_COPYRECT,
            Encoding::Rre => ENCODING_RRE,
            Encoding::CoRre => ENCODING_CORRE,
            Encoding::Hextile => ENCODING_HEXTILE,
            Encoding::Zlib => ENCODING_ZLIB,
            Encoding::Zrle => ENCODING_ZRLE,
        }
    }

    /// Human-readable name shown to users.
    pub fn label(self) -> &'static str {
        match self {
            Encoding::Raw => "RAW",
            Encoding::CopyRect => "COPYRECT",
            Encoding::Rre => "RRE",
            Encoding::CoRre => "CoRRE",
            Encoding::Hextile => "HEXTILE",
            Encoding::Zlib => "ZLIB",
            Encoding::Zrle => "ZRLE",
        }
    }
}

impl std::str::FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(Encoding::Raw),
            "copyrect" => Ok(Encoding::CopyRect),
            "rre" => Ok(Encoding::Rre),
            "corre" => Ok(Encoding::CoRre),
            "hextile" => Ok(Encoding::Hextile),
            "zlib" => Ok(Encoding::Zlib),
            "zrle" => Ok(Encoding::Zrle),
            other => Err(format!("unknown encoding '{other}'")),
        }
    }
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

//
// Security type constants
//

pub const SECURITY_TYPE_INVALID: u8 = 0;
pub const SECURITY_TYPE_NONE: u8 = 1;
pub const SECURITY_TYPE_VNC_AUTH: u8 = 2;
pub const SECURITY_TYPE_TIGHT: u8 = 16;
/// UltraVNC MS-Logon II: Diffie-Hellman key agreement with username and password.
pub const SECURITY_TYPE_ULTRA_MS_LOGON_II: u8 = 113;
/// UltraVNC 3.4 pre-3.7 framing of the MS-Logon scheme (sent as a u32).
pub const SECURITY_TYPE_ULTRA34: u32 = 0xFFFF_FFFA;

//
// Message type constants
//

pub const MSG_FRAMEBUFFER_UPDATE: u8 = 0;
pub const MSG_SET_COLOUR_MAP_ENTRIES: u8 = 1;
pub const MSG_BELL: u8 = 2;
pub const MSG_SERVER_CUT_TEXT: u8 = 3;
/// UltraVNC text chat.
pub const MSG_TEXT_CHAT: u8 = 11;

pub const MSG_SET_PIXEL_FORMAT: u8 = 0;
pub const MSG_SET_ENCODINGS: u8 = 2;
pub const MSG_FRAMEBUFFER_UPDATE_REQUEST: u8 = 3;
pub const MSG_KEY_EVENT: u8 = 4;
pub const MSG_POINTER_EVENT: u8 = 5;
pub const MSG_CLIENT_CUT_TEXT: u8 = 6;
