//! Store that keeps the whole remote desktop resident.

use crate::store::{request_for, FramebufferStore, RedrawNotifier, StoreError};
use crate::surface::{FramebufferHandle, Surface};
use parking_lot::Mutex;
use rfb_common::{Point, Rect};
use rfb_protocol::messages::FramebufferUpdateRequest;
use std::sync::Arc;

/// Full-buffer strategy: one surface the size of the remote desktop.
/// Scrolling is a no-op.
pub struct FullStore {
    width: u16,
    height: u16,
    surface: FramebufferHandle,
    notifier: RedrawNotifier,
}

impl FullStore {
    pub fn new(width: u16, height: u16, notifier: RedrawNotifier) -> Result<Self, StoreError> {
        let surface = Surface::allocate(u32::from(width), u32::from(height), Point::default())?;
        Ok(Self {
            width,
            height,
            surface: Arc::new(Mutex::new(surface)),
            notifier,
        })
    }
}

impl FramebufferStore for FullStore {
    fn strategy(&self) -> &'static str {
        "full"
    }

    fn framebuffer_size(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    fn window(&self) -> Rect {
        Rect::new(0, 0, u32::from(self.width), u32::from(self.height))
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
        if !self.surface.lock().copy_within(src, dst) {
            tracing::debug!(?src, ?dst, "copy outside framebuffer ignored");
        }
    }

    fn update_region(&mut self, rect: &Rect) {
        self.notifier.notify(*rect);
    }

    fn full_update_request(&self, incremental: bool) -> FramebufferUpdateRequest {
        request_for(&self.window(), incremental)
    }

    fn sync_scroll(&mut self) -> Vec<FramebufferUpdateRequest> {
        Vec::new()
    }

    fn scroll_to(&mut self, _x: i32, _y: i32) {}

    fn resize(&mut self, width: u16, height: u16) -> Result<(), StoreError> {
        if (width, height) == (self.width, self.height) {
            return Ok(());
        }
        let fresh = Surface::allocate(u32::from(width), u32::from(height), Point::default())?;
        *self.surface.lock() = fresh;
        self.width = width;
        self.height = height;
        self.notifier.notify(self.window());
        Ok(())
    }

    fn surface(&self) -> FramebufferHandle {
        Arc::clone(&self.surface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::BLACK;

    fn store(width: u16, height: u16) -> (FullStore, crate::RedrawReceiver) {
        let (notifier, rx) = RedrawNotifier::channel();
        (FullStore::new(width, height, notifier).unwrap(), rx)
    }

    #[test]
    fn test_valid_draw() {
        let (store, _rx) = store(100, 50);
        assert!(store.valid_draw(&Rect::new(0, 0, 100, 50)));
        assert!(store.valid_draw(&Rect::new(99, 49, 1, 1)));
        assert!(!store.valid_draw(&Rect::new(99, 49, 2, 1)));
        assert!(!store.valid_draw(&Rect::new(0, 50, 1, 1)));
    }

    #[test]
    fn test_offset_is_row_major() {
        let (store, _rx) = store(10, 10);
        assert_eq!(store.offset(0, 0), Some(0));
        assert_eq!(store.offset(3, 2), Some(23));
        assert_eq!(store.offset(10, 0), None);
    }

    #[test]
    fn test_fill_and_image() {
        let (mut store, _rx) = store(4, 4);
        store.fill_rect(&Rect::new(0, 0, 4, 4), 0xFF11_2233);
        store.image_rect(&Rect::new(1, 1, 2, 1), &[1, 2]);

        let surface = store.surface();
        let surface = surface.lock();
        assert_eq!(surface.pixel(0, 0), Some(0xFF11_2233));
        assert_eq!(surface.pixel(1, 1), Some(1));
        assert_eq!(surface.pixel(2, 1), Some(2));
    }

    #[test]
    fn test_copy_rect_identical_is_noop() {
        let (mut store, _rx) = store(8, 8);
        let block: Vec<u32> = (0..64).collect();
        store.image_rect(&Rect::new(0, 0, 8, 8), &block);
        let before = store.surface().lock().clone();

        store.copy_rect(Point::new(1, 2), &Rect::new(1, 2, 5, 5));
        assert_eq!(*store.surface().lock(), before);
    }

    #[test]
    fn test_copy_rect_moves_block() {
        let (mut store, _rx) = store(8, 8);
        store.fill_rect(&Rect::new(0, 0, 2, 2), 9);
        store.copy_rect(Point::new(0, 0), &Rect::new(6, 6, 2, 2));
        let surface = store.surface();
        let surface = surface.lock();
        assert_eq!(surface.pixel(7, 7), Some(9));
        assert_eq!(surface.pixel(5, 5), Some(BLACK));
    }

    #[test]
    fn test_update_region_notifies() {
        let (mut store, rx) = store(8, 8);
        store.update_region(&Rect::new(1, 1, 2, 2));
        assert!(rx.try_changed());
        assert_eq!(rx.take_dirty(), Some(Rect::new(1, 1, 2, 2)));
    }

    #[test]
    fn test_requests_cover_desktop() {
        let (mut store, _rx) = store(640, 480);
        let req = store.full_update_request(true);
        assert!(req.incremental);
        assert_eq!((req.x, req.y, req.width, req.height), (0, 0, 640, 480));

        store.scroll_to(100, 100);
        assert!(store.sync_scroll().is_empty());
        assert_eq!(store.window(), Rect::new(0, 0, 640, 480));
    }

    #[test]
    fn test_resize_reallocates_shared_surface() {
        let (mut store, rx) = store(4, 4);
        let handle = store.surface();
        store.resize(8, 2).unwrap();

        assert_eq!(store.framebuffer_size(), (8, 2));
        assert_eq!(handle.lock().pixels().len(), 16);
        assert_eq!(rx.take_dirty(), Some(Rect::new(0, 0, 8, 2)));
    }
}
