//! Hextile encoding decoder - 16x16 tiles with per-tile sub-encodings.
//!
//! # Wire Format
//!
//! For each 16x16 tile in the rectangle (smaller at the right and bottom
//! edges), in raster order:
//!
//! ```text
//! +------------------+
//! | tile_type        |  1 byte (bit flags)
//! +------------------+
//! | [raw_pixels]     |  tile_w * tile_h * bpp bytes (if RAW bit set)
//! +------------------+
//! | [background]     |  bpp bytes (if BACKGROUND_SPECIFIED)
//! +------------------+
//! | [foreground]     |  bpp bytes (if FOREGROUND_SPECIFIED)
//! +------------------+
//! | [num_subrects]   |  1 byte (if ANY_SUBRECTS)
//! +------------------+
//! | [subrects...]    |  For each subrect:
//! |   [pixel]        |    bpp bytes (if SUBRECTS_COLOURED)
//! |   xy             |    1 byte: x=(xy>>4), y=(xy&0xF)
//! |   wh             |    1 byte: w=((wh>>4)+1), h=((wh&0xF)+1)
//! +------------------+
//! ```
//!
//! # State Persistence
//!
//! Background and foreground colors persist from tile to tile **within one
//! rectangle** and start out black at the beginning of every rectangle.
//! A raw tile ignores all other flags and leaves both colors unchanged.

use crate::raw::decode_raw_block;
use crate::{read_pixel, rect_of, DecodeContext, Decoder, Rectangle, RfbInStream, ENCODING_HEXTILE};
use anyhow::{Context, Result};
use rfb_common::Rect;
use tokio::io::AsyncRead;

const TILE_RAW: u8 = 1 << 0;
const TILE_BACKGROUND_SPECIFIED: u8 = 1 << 1;
const TILE_FOREGROUND_SPECIFIED: u8 = 1 << 2;
const TILE_ANY_SUBRECTS: u8 = 1 << 3;
const TILE_SUBRECTS_COLOURED: u8 = 1 << 4;

/// Hextile tile size (tiles at rectangle edges may be smaller).
const TILE_SIZE: u32 = 16;

/// Color both tile colors start from in each rectangle.
const DEFAULT_COLOR: u32 = 0xFF00_0000;

pub struct HextileDecoder;

impl Decoder for HextileDecoder {
    fn encoding_type(&self) -> i32 {
        ENCODING_HEXTILE
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
            "Hextile decode start: rect=[{},{} {}x{}] buffer_before={}",
            rect.x, rect.y, rect.width, rect.height,
            buffer_before
        );

        let area = rect_of(rect);
        if area.is_empty() {
            return Ok(());
        }

        let mut background = DEFAULT_COLOR;
        let mut foreground = DEFAULT_COLOR;
        // Tiles that were consumed but not stored, fetched again as one area.
        let mut missed: Option<Rect> = None;

        let mut ty = 0u32;
        while ty < area.height {
            let tile_h = TILE_SIZE.min(area.height - ty);
            let mut row_drawn = false;

            let mut tx = 0u32;
            while tx < area.width {
                let tile_w = TILE_SIZE.min(area.width - tx);
                let tile = Rect::new(area.x + tx as i32, area.y + ty as i32, tile_w, tile_h);
                let draw = ctx.store.valid_draw(&tile);
                if draw {
                    row_drawn = true;
                } else {
                    missed = Some(missed.map_or(tile, |m| m.union(&tile)));
                }

                decode_tile(stream, tile, draw, ctx, &mut background, &mut foreground)
                    .await
                    .with_context(|| {
                        format!(
                            "Hextile tile at ({}, {}) in rect at ({}, {})",
                            tx, ty, rect.x, rect.y
                        )
                    })?;
                tx += TILE_SIZE;
            }

            if row_drawn {
                let row = Rect::new(area.x, area.y + ty as i32, area.width, tile_h);
                ctx.store.update_region(&row);
            }
            ty += TILE_SIZE;
        }

        if let Some(missed) = missed {
            ctx.store.refetch(&missed);
        }

        let buffer_after = stream.available();
        tracing::trace!(
            target: "rfb_encodings::framing",
            "Hextile decode end: bytes_consumed={}, buffer_after={}",
            buffer_before.saturating_sub(buffer_after),
            buffer_after
        );
        Ok(())
    }
}

async fn decode_tile<R: AsyncRead + Unpin>(
    stream: &mut RfbInStream<R>,
    tile: Rect,
    draw: bool,
    ctx: &mut DecodeContext<'_>,
    background: &mut u32,
    foreground: &mut u32,
) -> Result<()> {
    let tile_type = stream
        .read_u8()
        .await
        .context("Failed to read tile type")?;

    if tile_type & TILE_RAW != 0 {
        return decode_raw_block(stream, tile, draw, ctx)
            .await
            .context("Failed to read raw tile");
    }

    if tile_type & TILE_BACKGROUND_SPECIFIED != 0 {
        *background = read_pixel(stream, ctx.format)
            .await
            .context("Failed to read background")?;
    }
    if tile_type & TILE_FOREGROUND_SPECIFIED != 0 {
        *foreground = read_pixel(stream, ctx.format)
            .await
            .context("Failed to read foreground")?;
    }
    if draw {
        ctx.store.fill_rect(&tile, *background);
    }
    if tile_type & TILE_ANY_SUBRECTS == 0 {
        return Ok(());
    }

    let num_subrects = stream
        .read_u8()
        .await
        .context("Failed to read subrect count")?;
    let coloured = tile_type & TILE_SUBRECTS_COLOURED != 0;

    for i in 0..num_subrects {
        let color = if coloured {
            read_pixel(stream, ctx.format)
                .await
                .with_context(|| format!("Failed to read color of subrect {i}"))?
        } else {
            *foreground
        };
        let xy = stream
            .read_u8()
            .await
            .with_context(|| format!("Failed to read XY of subrect {i}"))?;
        let wh = stream
            .read_u8()
            .await
            .with_context(|| format!("Failed to read WH of subrect {i}"))?;

        let (x, y) = (u32::from(xy >> 4), u32::from(xy & 0x0F));
        let (w, h) = (u32::from(wh >> 4) + 1, u32::from(wh & 0x0F) + 1);
        if !draw {
            continue;
        }
        let sub = Rect::new(tile.x + x as i32, tile.y + y as i32, w, h);
        match tile.intersect(&sub) {
            Some(clipped) => ctx.store.fill_rect(&clipped, color),
            None => tracing::debug!(?sub, ?tile, "Hextile subrect outside its tile"),
        }
    }
    Ok(())
}
