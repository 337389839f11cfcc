//! Store that keeps only the visible viewport of a large remote desktop.
//!
//! The surface covers the viewport at its current position. Scrolling is
//! two-step: [`scroll_to`](FramebufferStore::scroll_to) records the wanted
//! origin, and [`sync_scroll`](FramebufferStore::sync_scroll), which the
//! session runs before reading each server message, moves the surface,
//! keeps the pixels that remain visible and asks the server for the strips
//! that became visible.

use crate::store::{request_for, FramebufferStore, RedrawNotifier, StoreError};
use crate::surface::{FramebufferHandle, Surface};
use parking_lot::Mutex;
use rfb_common::{Point, Rect};
use rfb_protocol::messages::FramebufferUpdateRequest;
use std::sync::Arc;

pub struct WindowedStore {
    width: u16,
    height: u16,
    viewport: (u16, u16),
    window: Rect,
    target: Point,
    /// Regions that could not be drawn locally and must be re-requested.
    pending: Vec<Rect>,
    surface: FramebufferHandle,
    notifier: RedrawNotifier,
}

impl WindowedStore {
    pub fn new(
        width: u16,
        height: u16,
        viewport: (u16, u16),
        notifier: RedrawNotifier,
    ) -> Result<Self, StoreError> {
        let window = Rect::new(
            0,
            0,
            u32::from(viewport.0.min(width)),
            u32::from(viewport.1.min(height)),
        );
        let surface = Surface::allocate(window.width, window.height, Point::default())?;
        Ok(Self {
            width,
            height,
            viewport,
            window,
            target: Point::default(),
            pending: Vec::new(),
            surface: Arc::new(Mutex::new(surface)),
            notifier,
        })
    }

    /// Clamp a wanted origin so the window stays inside the desktop.
    fn clamp_origin(&self, x: i32, y: i32) -> Point {
        let max_x = i32::from(self.width) - self.window.width as i32;
        let max_y = i32::from(self.height) - self.window.height as i32;
        Point::new(x.clamp(0, max_x.max(0)), y.clamp(0, max_y.max(0)))
    }

    /// Strips of `new` that were not covered by the window before it moved by
    /// `(dx, dy)`.
    fn exposed(new: &Rect, dx: i32, dy: i32) -> Vec<Rect> {
        if dx.unsigned_abs() >= new.width || dy.unsigned_abs() >= new.height {
            return vec![*new];
        }
        let mut strips = Vec::with_capacity(2);
        if dx > 0 {
            strips.push(Rect::new(new.right() - dx, new.y, dx as u32, new.height));
        } else if dx < 0 {
            strips.push(Rect::new(new.x, new.y, (-dx) as u32, new.height));
        }
        if dy > 0 {
            strips.push(Rect::new(new.x, new.bottom() - dy, new.width, dy as u32));
        } else if dy < 0 {
            strips.push(Rect::new(new.x, new.y, new.width, (-dy) as u32));
        }
        strips
    }
}

impl FramebufferStore for WindowedStore {
    fn strategy(&self) -> &'static str {
        "windowed"
    }

    fn framebuffer_size(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    fn window(&self) -> Rect {
        self.window
    }

    fn refetch(&mut self, rect: &Rect) {
        if let Some(visible) = self.window.intersect(rect) {
            tracing::debug!(?rect, ?visible, "rectangle straddles window, re-requesting");
            self.pending.push(visible);
        }
    }

    fn offset(&self, x: i32, y: i32) -> Option<usize> {
        self.surface.lock().index(x, y)
    }

    fn fill_rect(&mut self, rect: &Rect, color: u32) {
        self.surface.lock().fill(rect, color);
    }

    fn image_rect(&mut self, rect: &Rect, pixels: &[u32]) {
        self.surface.lock().blit(rect, pixels);
    }

    fn copy_rect(&mut self, src: Point, dst: &Rect) {
        let Some(visible) = self.window.intersect(dst) else {
            return;
        };
        if !self.surface.lock().copy_within(src, dst) {
            // Source is not resident; fetch the destination instead.
            tracing::debug!(?src, ?dst, "copy source outside window, re-requesting");
            self.pending.push(visible);
        }
    }

    fn update_region(&mut self, rect: &Rect) {
        if let Some(visible) = self.window.intersect(rect) {
            self.notifier.notify(visible);
        }
    }

    fn full_update_request(&self, incremental: bool) -> FramebufferUpdateRequest {
        request_for(&self.window, incremental)
    }

    fn sync_scroll(&mut self) -> Vec<FramebufferUpdateRequest> {
        let mut regions = std::mem::take(&mut self.pending);

        let origin = self.window.origin();
        if self.target != origin {
            let dx = self.target.x - origin.x;
            let dy = self.target.y - origin.y;
            let moved = Rect::new(self.target.x, self.target.y, self.window.width, self.window.height);

            self.surface.lock().shift(dx, dy);
            self.window = moved;
            regions.extend(Self::exposed(&moved, dx, dy));
            self.notifier.notify(moved);
            tracing::debug!(x = moved.x, y = moved.y, dx, dy, "viewport moved");
        }

        regions
            .iter()
            .filter(|r| !r.is_empty())
            .map(|r| request_for(r, false))
            .collect()
    }

    fn scroll_to(&mut self, x: i32, y: i32) {
        self.target = self.clamp_origin(x, y);
    }

    fn resize(&mut self, width: u16, height: u16) -> Result<(), StoreError> {
        self.width = width;
        self.height = height;
        let size = (
            u32::from(self.viewport.0.min(width)),
            u32::from(self.viewport.1.min(height)),
        );
        self.window.width = size.0;
        self.window.height = size.1;
        let origin = self.clamp_origin(self.window.x, self.window.y);

        let fresh = Surface::allocate(size.0, size.1, origin)?;
        *self.surface.lock() = fresh;
        self.window = Rect::new(origin.x, origin.y, size.0, size.1);
        self.target = origin;
        self.pending.clear();
        self.notifier.notify(self.window);
        Ok(())
    }

    fn surface(&self) -> FramebufferHandle {
        Arc::clone(&self.surface)
    }
}
