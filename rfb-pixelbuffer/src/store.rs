//! The framebuffer store abstraction decoders draw through.
//!
//! A store owns the pixel [`Surface`](crate::Surface) for one session and
//! decides which part of the remote desktop is resident:
//!
//! - [`FullStore`](crate::FullStore) keeps the whole desktop.
//! - [`WindowedStore`](crate::WindowedStore) keeps only the viewport and
//!   re-requests newly exposed areas when the viewport scrolls.
//!
//! [`select_store`] picks one of the two once per session from the desktop
//! size and a memory budget.

use crate::full::FullStore;
use crate::surface::FramebufferHandle;
use crate::windowed::WindowedStore;
use parking_lot::Mutex;
use rfb_common::{Point, Rect};
use rfb_protocol::messages::FramebufferUpdateRequest;
use std::sync::Arc;

/// Bytes of memory budget the store needs per remote pixel before the whole
/// desktop is kept resident.
pub const CAPACITY_MULTIPLIER: u64 = 7;

/// Errors raised by framebuffer stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A pixel buffer could not be allocated. Carries no heap data so it can
    /// be raised and reported while memory is exhausted.
    #[error("out of memory allocating framebuffer")]
    ResourceExhausted,
}

/// Destination of decoded pixels.
///
/// All rectangles are in remote desktop coordinates. Write methods silently
/// drop pixels that fall outside [`window`](Self::window); decoders are
/// expected to consult [`valid_draw`](Self::valid_draw) first so they can
/// skip decoding work for rectangles that will not be stored, and to report
/// such rectangles through [`refetch`](Self::refetch).
pub trait FramebufferStore: Send {
    /// Short strategy name for logs.
    fn strategy(&self) -> &'static str;

    /// Declared size of the remote desktop.
    fn framebuffer_size(&self) -> (u16, u16);

    /// Area of the remote desktop currently held in memory.
    fn window(&self) -> Rect;

    /// True iff `rect` is fully representable in the current window.
    fn valid_draw(&self, rect: &Rect) -> bool {
        self.window().contains_rect(rect)
    }

    /// Note that `rect` was consumed from the stream without being stored.
    /// Stores that hold only part of the desktop fetch the resident part of
    /// it again on the next [`sync_scroll`](Self::sync_scroll).
    fn refetch(&mut self, _rect: &Rect) {}

    /// Row-major index of remote pixel `(x, y)` in the surface, or `None`
    /// when the window does not cover it.
    fn offset(&self, x: i32, y: i32) -> Option<usize>;

    /// Fill `rect` with a single color.
    fn fill_rect(&mut self, rect: &Rect, color: u32);

    /// Store a tightly packed `rect.width` x `rect.height` block of pixels.
    fn image_rect(&mut self, rect: &Rect, pixels: &[u32]);

    /// Copy the block whose top-left corner is `src` to `dst`.
    fn copy_rect(&mut self, src: Point, dst: &Rect);

    /// Mark `rect` for redraw.
    fn update_region(&mut self, rect: &Rect);

    /// The update request that covers everything this store holds.
    fn full_update_request(&self, incremental: bool) -> FramebufferUpdateRequest;

    /// Apply any pending viewport move and return the requests needed to
    /// refill what it exposed. Called before each server message is read.
    fn sync_scroll(&mut self) -> Vec<FramebufferUpdateRequest>;

    /// Ask for the viewport to start at `(x, y)`. Takes effect on the next
    /// [`sync_scroll`](Self::sync_scroll).
    fn scroll_to(&mut self, x: i32, y: i32);

    /// Adopt a new remote desktop size, reallocating as needed.
    fn resize(&mut self, width: u16, height: u16) -> Result<(), StoreError>;

    /// Shared handle to the pixels.
    fn surface(&self) -> FramebufferHandle;
}

/// Producer half of the redraw signal.
///
/// Dirty rectangles are merged into one bounding box, and at most one wakeup
/// is ever queued: a burst of updates before the consumer runs collapses
/// into a single pending signal.
#[derive(Debug, Clone)]
pub struct RedrawNotifier {
    dirty: Arc<Mutex<Option<Rect>>>,
    tx: flume::Sender<()>,
}

/// Consumer half of the redraw signal.
#[derive(Debug, Clone)]
pub struct RedrawReceiver {
    dirty: Arc<Mutex<Option<Rect>>>,
    rx: flume::Receiver<()>,
}

impl RedrawNotifier {
    /// Create a connected notifier/receiver pair.
    pub fn channel() -> (RedrawNotifier, RedrawReceiver) {
        let dirty = Arc::new(Mutex::new(None));
        let (tx, rx) = flume::bounded(1);
        (
            RedrawNotifier {
                dirty: Arc::clone(&dirty),
                tx,
            },
            RedrawReceiver { dirty, rx },
        )
    }

    /// Record `rect` as dirty and wake the consumer if it is not already
    /// woken.
    pub fn notify(&self, rect: Rect) {
        if rect.is_empty() {
            return;
        }
        {
            let mut dirty = self.dirty.lock();
            *dirty = Some(match *dirty {
                Some(existing) => existing.union(&rect),
                None => rect,
            });
        }
        // A full channel means a wakeup is already pending.
        let _ = self.tx.try_send(());
    }
}

impl RedrawReceiver {
    /// Take the accumulated dirty area, leaving none.
    pub fn take_dirty(&self) -> Option<Rect> {
        self.dirty.lock().take()
    }

    /// Wait for the next redraw signal. Returns `false` once the session has
    /// dropped its notifier and no signal is pending.
    pub async fn changed(&self) -> bool {
        self.rx.recv_async().await.is_ok()
    }

    /// Consume a pending redraw signal without waiting.
    pub fn try_changed(&self) -> bool {
        self.rx.try_recv().is_ok()
    }

    /// The underlying wakeup channel, for use with `select!`-style code.
    pub fn signal(&self) -> &flume::Receiver<()> {
        &self.rx
    }
}

/// True when a `width` x `height` desktop fits in `budget` bytes.
pub fn fits_budget(width: u16, height: u16, budget: u64) -> bool {
    u64::from(width) * u64::from(height) * CAPACITY_MULTIPLIER <= budget
}

/// Choose and allocate the store for a `width` x `height` desktop.
///
/// The full-buffer strategy is used when the desktop fits the memory budget;
/// otherwise a windowed store sized to `viewport` (clamped to the desktop)
/// is used.
pub fn select_store(
    width: u16,
    height: u16,
    viewport: (u16, u16),
    budget: u64,
    notifier: RedrawNotifier,
) -> Result<Box<dyn FramebufferStore>, StoreError> {
    if fits_budget(width, height, budget) {
        tracing::debug!(width, height, budget, "using full framebuffer store");
        Ok(Box::new(FullStore::new(width, height, notifier)?))
    } else {
        tracing::info!(
            width,
            height,
            budget,
            viewport_width = viewport.0,
            viewport_height = viewport.1,
            "desktop exceeds memory budget, using windowed store"
        );
        Ok(Box::new(WindowedStore::new(
            width, height, viewport, notifier,
        )?))
    }
}

/// Update request for a remote-coordinate rectangle. Rectangles are clamped
/// to the 16-bit wire range.
pub(crate) fn request_for(rect: &Rect, incremental: bool) -> FramebufferUpdateRequest {
    let clamp = |v: i64| v.clamp(0, i64::from(u16::MAX)) as u16;
    FramebufferUpdateRequest {
        incremental,
        x: clamp(i64::from(rect.x)),
        y: clamp(i64::from(rect.y)),
        width: clamp(i64::from(rect.width)),
        height: clamp(i64::from(rect.height)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_threshold() {
        assert!(fits_budget(100, 100, 70_000));
        assert!(!fits_budget(100, 100, 69_999));
        assert!(fits_budget(0, 0, 0));
    }

    #[test]
    fn test_select_full_within_budget() {
        let (notifier, _rx) = RedrawNotifier::channel();
        let store = select_store(64, 48, (32, 32), 64 * 48 * 7, notifier).unwrap();
        assert_eq!(store.strategy(), "full");
        assert_eq!(store.window(), Rect::new(0, 0, 64, 48));
    }

    #[test]
    fn test_select_windowed_over_budget() {
        let (notifier, _rx) = RedrawNotifier::channel();
        let store = select_store(64, 48, (32, 16), 1024, notifier).unwrap();
        assert_eq!(store.strategy(), "windowed");
        assert_eq!(store.window(), Rect::new(0, 0, 32, 16));
        assert_eq!(store.framebuffer_size(), (64, 48));
    }

    #[test]
    fn test_select_windowed_clamps_viewport() {
        let (notifier, _rx) = RedrawNotifier::channel();
        let store = select_store(20, 10, (800, 600), 0, notifier).unwrap();
        assert_eq!(store.window(), Rect::new(0, 0, 20, 10));
    }

    #[test]
    fn test_notifier_coalesces() {
        let (notifier, rx) = RedrawNotifier::channel();
        notifier.notify(Rect::new(0, 0, 2, 2));
        notifier.notify(Rect::new(10, 10, 2, 2));
        notifier.notify(Rect::new(4, 4, 0, 5));

        assert!(rx.try_changed());
        assert!(!rx.try_changed());
        assert_eq!(rx.take_dirty(), Some(Rect::new(0, 0, 12, 12)));
        assert_eq!(rx.take_dirty(), None);
    }

    #[tokio::test]
    async fn test_receiver_sees_disconnect() {
        let (notifier, rx) = RedrawNotifier::channel();
        notifier.notify(Rect::new(0, 0, 1, 1));
        drop(notifier);
        assert!(rx.changed().await);
        assert!(!rx.changed().await);
    }

    #[test]
    fn test_request_for_clamps() {
        let req = request_for(&Rect::new(-5, 10, 100_000, 20), false);
        assert_eq!((req.x, req.y, req.width, req.height), (0, 10, u16::MAX, 20));
        assert!(!req.incremental);
    }
}
