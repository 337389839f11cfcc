//! The pixel storage shared between the decode worker and the presentation
//! layer.
//!
//! A [`Surface`] covers a rectangle of the remote desktop, starting at
//! [`Surface::origin`]. Pixels are `0xAARRGGBB`, row-major, with the stride
//! equal to the width. All drawing methods take rectangles in remote
//! coordinates and clip them to the surface.

use crate::store::StoreError;
use parking_lot::Mutex;
use rfb_common::{Point, Rect};
use std::sync::Arc;

/// Color of freshly allocated pixels.
pub const BLACK: u32 = 0xFF00_0000;

/// Handle to the surface a store draws into.
///
/// Readers lock it only to copy or inspect pixels; a reader may observe a
/// rectangle that is only partially written.
pub type FramebufferHandle = Arc<Mutex<Surface>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    width: u32,
    height: u32,
    origin: Point,
    pixels: Vec<u32>,
}

impl Surface {
    /// Allocate a black surface of `width` x `height` pixels at `origin`.
    ///
    /// Fails with [`StoreError::ResourceExhausted`] instead of aborting when
    /// the allocation cannot be satisfied.
    pub fn allocate(width: u32, height: u32, origin: Point) -> Result<Self, StoreError> {
        let len = (width as usize)
            .checked_mul(height as usize)
            .ok_or(StoreError::ResourceExhausted)?;
        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(len)
            .map_err(|_| StoreError::ResourceExhausted)?;
        pixels.resize(len, BLACK);
        Ok(Self {
            width,
            height,
            origin,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Remote coordinates of the top-left pixel.
    pub fn origin(&self) -> Point {
        self.origin
    }

    pub(crate) fn set_origin(&mut self, origin: Point) {
        self.origin = origin;
    }

    /// Covered area in remote coordinates.
    pub fn bounds(&self) -> Rect {
        Rect::new(self.origin.x, self.origin.y, self.width, self.height)
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// Row-major index of remote pixel `(x, y)`, if the surface covers it.
    pub fn index(&self, x: i32, y: i32) -> Option<usize> {
        if !self.bounds().contains_point(x, y) {
            return None;
        }
        let lx = (x - self.origin.x) as usize;
        let ly = (y - self.origin.y) as usize;
        Some(ly * self.width as usize + lx)
    }

    /// Pixel at remote `(x, y)`.
    pub fn pixel(&self, x: i32, y: i32) -> Option<u32> {
        self.index(x, y).map(|i| self.pixels[i])
    }

    /// Copy of the pixels inside `rect`, row-major. Parts of `rect` outside
    /// the surface are left out.
    pub fn snapshot(&self, rect: &Rect) -> Vec<u32> {
        let Some(clip) = self.bounds().intersect(rect) else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity(clip.area() as usize);
        for y in clip.y..clip.bottom() {
            if let Some(start) = self.index(clip.x, y) {
                out.extend_from_slice(&self.pixels[start..start + clip.width as usize]);
            }
        }
        out
    }

    /// Fill `rect` with `color`.
    pub fn fill(&mut self, rect: &Rect, color: u32) {
        let Some(clip) = self.bounds().intersect(rect) else {
            return;
        };
        let width = clip.width as usize;
        for y in clip.y..clip.bottom() {
            if let Some(start) = self.index(clip.x, y) {
                self.pixels[start..start + width].fill(color);
            }
        }
    }

    /// Write `pixels`, a tightly packed `rect.width` x `rect.height` block,
    /// into `rect`.
    pub fn blit(&mut self, rect: &Rect, pixels: &[u32]) {
        let Some(clip) = self.bounds().intersect(rect) else {
            return;
        };
        let src_stride = rect.width as usize;
        let width = clip.width as usize;
        let dx = (clip.x - rect.x) as usize;
        for y in clip.y..clip.bottom() {
            let src = (y - rect.y) as usize * src_stride + dx;
            let Some(row) = pixels.get(src..src + width) else {
                return;
            };
            if let Some(dst) = self.index(clip.x, y) {
                self.pixels[dst..dst + width].copy_from_slice(row);
            }
        }
    }

    /// Copy the block at `src` to `dst` (same size as `dst`) within the
    /// surface. Both blocks must lie inside the surface; returns `false`
    /// without touching any pixel otherwise.
    pub fn copy_within(&mut self, src: Point, dst: &Rect) -> bool {
        let src_rect = Rect::new(src.x, src.y, dst.width, dst.height);
        let bounds = self.bounds();
        if !bounds.contains_rect(&src_rect) || !bounds.contains_rect(dst) {
            return false;
        }
        if src_rect == *dst || dst.is_empty() {
            return true;
        }

        let width = dst.width as usize;
        let stride = self.width as usize;
        let src_base = (src.y - self.origin.y) as usize * stride + (src.x - self.origin.x) as usize;
        let dst_base = (dst.y - self.origin.y) as usize * stride + (dst.x - self.origin.x) as usize;

        // Copying downwards must walk rows bottom-up so overlapping source
        // rows are read before they are overwritten.
        if src.y < dst.y {
            for row in (0..dst.height as usize).rev() {
                let s = src_base + row * stride;
                self.pixels.copy_within(s..s + width, dst_base + row * stride);
            }
        } else {
            for row in 0..dst.height as usize {
                let s = src_base + row * stride;
                self.pixels.copy_within(s..s + width, dst_base + row * stride);
            }
        }
        true
    }

    /// Move the covered area by `(dx, dy)` in remote coordinates, keeping the
    /// pixels that stay visible. Newly exposed pixels keep stale contents
    /// until they are redrawn.
    pub fn shift(&mut self, dx: i32, dy: i32) {
        let w = self.width as i32;
        let h = self.height as i32;
        self.origin = Point::new(self.origin.x + dx, self.origin.y + dy);
        if dx.abs() >= w || dy.abs() >= h {
            return;
        }

        let stride = self.width as usize;
        let len = (w - dx.abs()) as usize;
        let src_col = dx.max(0) as usize;
        let dst_col = (-dx).max(0) as usize;
        let mut move_row = |dst_row: i32| {
            let src_row = (dst_row + dy) as usize;
            let s = src_row * stride + src_col;
            self.pixels
                .copy_within(s..s + len, dst_row as usize * stride + dst_col);
        };

        if dy >= 0 {
            for row in 0..h - dy {
                move_row(row);
            }
        } else {
            for row in (-dy..h).rev() {
                move_row(row);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(width: u32, height: u32) -> Surface {
        let mut surface = Surface::allocate(width, height, Point::default()).unwrap();
        for (i, p) in surface.pixels.iter_mut().enumerate() {
            *p = i as u32;
        }
        surface
    }

    #[test]
    fn test_allocate_is_black() {
        let surface = Surface::allocate(4, 3, Point::new(10, 20)).unwrap();
        assert_eq!(surface.pixels().len(), 12);
        assert!(surface.pixels().iter().all(|&p| p == BLACK));
        assert_eq!(surface.bounds(), Rect::new(10, 20, 4, 3));
    }

    #[test]
    fn test_allocate_overflow_is_resource_exhausted() {
        let err = Surface::allocate(u32::MAX, u32::MAX, Point::default()).unwrap_err();
        assert!(matches!(err, StoreError::ResourceExhausted));
    }

    #[test]
    fn test_index_uses_origin() {
        let surface = Surface::allocate(4, 4, Point::new(100, 50)).unwrap();
        assert_eq!(surface.index(100, 50), Some(0));
        assert_eq!(surface.index(103, 51), Some(7));
        assert_eq!(surface.index(99, 50), None);
        assert_eq!(surface.index(104, 50), None);
    }

    #[test]
    fn test_fill_clips() {
        let mut surface = Surface::allocate(4, 4, Point::default()).unwrap();
        surface.fill(&Rect::new(2, 2, 10, 10), 7);
        assert_eq!(surface.pixel(3, 3), Some(7));
        assert_eq!(surface.pixel(1, 3), Some(BLACK));
        assert_eq!(surface.pixels().iter().filter(|&&p| p == 7).count(), 4);
    }

    #[test]
    fn test_blit_clips_using_source_stride() {
        let mut surface = Surface::allocate(3, 3, Point::default()).unwrap();
        let block: Vec<u32> = (0..8).collect();
        // 4x2 block at (1,1): only its first two columns fit.
        surface.blit(&Rect::new(1, 1, 4, 2), &block);
        assert_eq!(surface.pixel(1, 1), Some(0));
        assert_eq!(surface.pixel(2, 1), Some(1));
        assert_eq!(surface.pixel(1, 2), Some(4));
        assert_eq!(surface.pixel(2, 2), Some(5));
    }

    #[test]
    fn test_copy_within_identical_is_noop() {
        let mut surface = numbered(8, 8);
        let before = surface.clone();
        assert!(surface.copy_within(Point::new(2, 2), &Rect::new(2, 2, 4, 4)));
        assert_eq!(surface, before);
    }

    #[test]
    fn test_copy_within_overlapping_down() {
        let mut surface = numbered(4, 4);
        let expected = surface.snapshot(&Rect::new(0, 0, 4, 2));
        assert!(surface.copy_within(Point::new(0, 0), &Rect::new(0, 1, 4, 2)));
        assert_eq!(surface.snapshot(&Rect::new(0, 1, 4, 2)), expected);
    }

    #[test]
    fn test_copy_within_overlapping_right() {
        let mut surface = numbered(4, 1);
        assert!(surface.copy_within(Point::new(0, 0), &Rect::new(1, 0, 3, 1)));
        assert_eq!(surface.pixels(), &[0, 0, 1, 2]);
    }

    #[test]
    fn test_copy_within_rejects_outside_source() {
        let mut surface = numbered(4, 4);
        let before = surface.clone();
        assert!(!surface.copy_within(Point::new(3, 3), &Rect::new(0, 0, 2, 2)));
        assert_eq!(surface, before);
    }

    #[test]
    fn test_shift_keeps_overlap() {
        let mut surface = numbered(4, 4);
        // Old pixel at local (1,1) is value 5; after moving the window by
        // (1,1) it sits at the new local (0,0).
        surface.shift(1, 1);
        assert_eq!(surface.origin(), Point::new(1, 1));
        assert_eq!(surface.pixel(1, 1), Some(5));
        assert_eq!(surface.pixel(3, 3), Some(15));
    }

    #[test]
    fn test_shift_backwards() {
        let mut surface = numbered(4, 4);
        surface.set_origin(Point::new(2, 2));
        surface.shift(-2, -1);
        assert_eq!(surface.origin(), Point::new(0, 1));
        // Old (2,2) = value 0 is now at local (2,1).
        assert_eq!(surface.pixel(2, 2), Some(0));
        assert_eq!(surface.pixel(3, 4), Some(9));
    }
}
