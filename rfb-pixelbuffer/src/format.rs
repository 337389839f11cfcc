//! Color models the client can ask the server for, and the pixel decoding
//! that goes with each.
//!
//! Only two models are supported:
//!
//! - [`ColorModel::C24bit`]: 32 bits per pixel, depth 24, little-endian,
//!   red/green/blue shifts 16/8/0. The three significant bytes arrive as
//!   `[B, G, R]` in the first three bytes of the pixel slot; the fourth byte
//!   (when present) is ignored and alpha is synthesized as opaque.
//! - [`ColorModel::C256`]: 8 bits per pixel in BGR233 layout. Every pixel byte
//!   is looked up in a 256-entry table of packed `0x00RRGGBB` values.
//!
//! Decoded pixels are always `0xAARRGGBB` with `AA = 0xFF`.
//!
//! # Example
//!
//! ```
//! use rfb_pixelbuffer::ColorModel;
//!
//! let format = ColorModel::C24bit.select_format();
//! assert_eq!(format.bytes_per_pixel(), 4);
//! assert_eq!(format.decode_pixel(&[0xCC, 0xBB, 0xAA, 0x00]), 0xFFAA_BBCC);
//!
//! let indexed = ColorModel::C256.select_format();
//! assert_eq!(indexed.bytes_per_pixel(), 1);
//! assert_eq!(indexed.decode_pixel(&[0x07]), 0xFFFF_0000);
//! ```

use rfb_protocol::messages::PixelFormat;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Alpha bits forced onto every decoded pixel.
pub const OPAQUE: u32 = 0xFF00_0000;

/// A 256-entry table of packed `0x00RRGGBB` colors.
pub type Palette = [u32; 256];

/// Pixel format the client requests with SetPixelFormat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorModel {
    #[default]
    #[serde(rename = "24bit")]
    C24bit,
    #[serde(rename = "256")]
    C256,
}

impl ColorModel {
    /// Label shown to users.
    pub fn label(self) -> &'static str {
        match self {
            ColorModel::C24bit => "24-bit color (4 bpp)",
            ColorModel::C256 => "256 colors (1 bpp)",
        }
    }

    /// Wire pixel format sent to the server for this model.
    pub fn pixel_format(self) -> PixelFormat {
        match self {
            ColorModel::C24bit => PixelFormat {
                bits_per_pixel: 32,
                depth: 24,
                big_endian: false,
                true_color: true,
                red_max: 255,
                green_max: 255,
                blue_max: 255,
                red_shift: 16,
                green_shift: 8,
                blue_shift: 0,
            },
            ColorModel::C256 => PixelFormat {
                bits_per_pixel: 8,
                depth: 8,
                big_endian: false,
                true_color: true,
                red_max: 7,
                green_max: 7,
                blue_max: 3,
                red_shift: 0,
                green_shift: 3,
                blue_shift: 6,
            },
        }
    }

    /// Decoding parameters for this model.
    pub fn select_format(self) -> ColorFormat {
        match self {
            ColorModel::C24bit => ColorFormat::truecolor(),
            ColorModel::C256 => ColorFormat::indexed(Arc::new(bgr233_palette())),
        }
    }
}

impl std::str::FromStr for ColorModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "24bit" | "24" | "c24bit" | "truecolor" => Ok(ColorModel::C24bit),
            "256" | "8bit" | "c256" | "palette" => Ok(ColorModel::C256),
            other => Err(format!("unknown color model '{other}'")),
        }
    }
}

impl std::fmt::Display for ColorModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// The palette matching [`ColorModel::C256`]'s BGR233 pixel layout.
///
/// Index bits are `bbgggrrr`; each channel is scaled to the full 0..=255
/// range.
pub fn bgr233_palette() -> Palette {
    let mut palette = [0u32; 256];
    for (i, entry) in palette.iter_mut().enumerate() {
        let i = i as u32;
        let r = (i & 0x07) * 255 / 7;
        let g = ((i >> 3) & 0x07) * 255 / 7;
        let b = ((i >> 6) & 0x03) * 255 / 3;
        *entry = (r << 16) | (g << 8) | b;
    }
    palette
}

/// Bytes-per-pixel and lookup table of the active color model.
///
/// Cloning is cheap; the palette is shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorFormat {
    bytes_per_pixel: usize,
    palette: Option<Arc<Palette>>,
}

impl ColorFormat {
    /// 4-byte truecolor pixels.
    pub fn truecolor() -> Self {
        Self {
            bytes_per_pixel: 4,
            palette: None,
        }
    }

    /// 1-byte pixels looked up in `palette`.
    pub fn indexed(palette: Arc<Palette>) -> Self {
        Self {
            bytes_per_pixel: 1,
            palette: Some(palette),
        }
    }

    /// Replace the lookup table, switching to 1-byte pixels.
    pub fn with_palette(self, palette: Palette) -> Self {
        Self::indexed(Arc::new(palette))
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.bytes_per_pixel
    }

    pub fn is_indexed(&self) -> bool {
        self.palette.is_some()
    }

    pub fn palette(&self) -> Option<&Palette> {
        self.palette.as_deref()
    }

    /// Size of a compressed pixel in ZRLE: three bytes for truecolor, one for
    /// indexed.
    pub fn cpixel_size(&self) -> usize {
        if self.palette.is_some() {
            1
        } else {
            3
        }
    }

    /// Decode one pixel into `0xFFRRGGBB`.
    ///
    /// `bytes` must hold at least one byte for indexed formats and at least
    /// three for truecolor; extra bytes are ignored, which lets the same call
    /// handle full pixels and ZRLE's 3-byte compressed pixels.
    #[inline]
    pub fn decode_pixel(&self, bytes: &[u8]) -> u32 {
        match &self.palette {
            Some(palette) => OPAQUE | palette[bytes[0] as usize],
            None => {
                OPAQUE | (u32::from(bytes[2]) << 16) | (u32::from(bytes[1]) << 8) | u32::from(bytes[0])
            }
        }
    }

    /// Decode a packed run of pixels of `pixel_size` bytes each into `out`.
    ///
    /// Decodes `min(out.len(), bytes.len() / pixel_size)` pixels.
    pub fn decode_pixels(&self, bytes: &[u8], pixel_size: usize, out: &mut [u32]) {
        for (dst, src) in out.iter_mut().zip(bytes.chunks_exact(pixel_size)) {
            *dst = self.decode_pixel(src);
        }
    }

    /// Encode a decoded pixel back into wire bytes.
    ///
    /// Truecolor yields `[B, G, R, 0]`. Indexed formats yield the first
    /// palette index holding exactly that color, or index 0 when the color is
    /// not in the table.
    pub fn encode_pixel(&self, argb: u32) -> Vec<u8> {
        let rgb = argb & 0x00FF_FFFF;
        match &self.palette {
            Some(palette) => {
                let index = palette.iter().position(|&c| c == rgb).unwrap_or(0);
                vec![index as u8]
            }
            None => vec![rgb as u8, (rgb >> 8) as u8, (rgb >> 16) as u8, 0],
        }
    }
}

impl Default for ColorFormat {
    fn default() -> Self {
        Self::truecolor()
    }
}
