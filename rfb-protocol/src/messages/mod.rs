//! RFB protocol messages.
//!
//! - **Core types** ([`types`]) - PixelFormat, Rectangle, encoding and message constants
//! - **Server messages** ([`server`]) - parsed by the dispatch loop
//! - **Client messages** ([`client`]) - serialized onto the outbound stream
//!
//! All multi-byte fields are big-endian. Message bodies the client does not
//! act on (clipboard text, chat text) are still consumed in full so that the
//! stream stays framed.
//!
//! ```
//! use rfb_protocol::messages::client::ClientInit;
//!
//! let client_init = ClientInit { shared: true };
//! assert!(client_init.shared);
//! ```

pub mod client;
pub mod server;
pub mod types;

pub use types::{Encoding, PixelFormat, Rectangle};

pub use server::{FramebufferUpdate, ServerCutText, ServerInit, ServerMessage, TextChat};

pub use client::{
    ClientCutText, ClientInit, ClientMessage, FramebufferUpdateRequest, KeyEvent, PointerEvent,
    SetEncodings, SetPixelFormat,
};
