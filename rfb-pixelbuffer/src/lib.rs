//! Pixel storage for the RFB client.
//!
//! This crate sits between the decoders and the presentation layer:
//!
//! - [`format`] - the two supported color models and pixel decoding
//! - [`surface`] - the shared pixel surface the presentation layer reads
//! - [`store`] - the [`FramebufferStore`] trait, strategy selection and the
//!   coalescing [`RedrawNotifier`]
//! - [`full`] / [`windowed`] - the two store strategies
//!
//! # Example
//!
//! ```
//! use rfb_common::Rect;
//! use rfb_pixelbuffer::{select_store, RedrawNotifier};
//!
//! let (notifier, redraws) = RedrawNotifier::channel();
//! let mut store = select_store(320, 240, (320, 240), 16 << 20, notifier).unwrap();
//!
//! let rect = Rect::new(0, 0, 16, 16);
//! assert!(store.valid_draw(&rect));
//! store.fill_rect(&rect, 0xFFFF_0000);
//! store.update_region(&rect);
//!
//! assert!(redraws.try_changed());
//! assert_eq!(redraws.take_dirty(), Some(rect));
//! ```

pub mod format;
pub mod full;
pub mod store;
pub mod surface;
pub mod windowed;

pub use format::{bgr233_palette, ColorFormat, ColorModel, Palette};
pub use full::FullStore;
pub use store::{
    fits_budget, select_store, FramebufferStore, RedrawNotifier, RedrawReceiver, StoreError,
    CAPACITY_MULTIPLIER,
};
pub use surface::{FramebufferHandle, Surface};
pub use windowed::WindowedStore;
