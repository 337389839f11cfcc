//! RFB (Remote Framebuffer) protocol layer for the VNC client.
//!
//! This crate holds everything that touches the wire but knows nothing about
//! pixels: buffered streams, the persistent inflate sub-stream, session
//! negotiation and authentication, and the message types.
//!
//! # Modules
//!
//! - [`io`] - Buffered I/O streams (RfbInStream, RfbOutStream) and [`io::InflateStream`]
//! - [`handshake`] - Version, security and initialization exchange
//! - [`auth`] - VNC and MS-Logon II authentication
//! - [`messages`] - Client and server message types
//!
//! # Examples
//!
//! ```no_run
//! use rfb_protocol::handshake::{self, Credentials};
//! use rfb_protocol::{RfbInStream, RfbOutStream};
//! use tokio::net::TcpStream;
//!
//! # async fn example() -> std::io::Result<()> {
//! let socket = TcpStream::connect("localhost:5900").await?;
//! let (reader, writer) = tokio::io::split(socket);
//! let mut input = RfbInStream::new(reader);
//! let mut output = RfbOutStream::new(writer);
//!
//! let version = handshake::negotiate_version(&mut input, &mut output).await?;
//! let security =
//!     handshake::negotiate_security(&mut input, &mut output, version, &Credentials::default())
//!         .await?;
//! handshake::send_client_init(&mut output, true).await?;
//! let init = handshake::recv_server_init(&mut input, security.tight).await?;
//! println!("{} is {}x{}", init.name, init.framebuffer_width, init.framebuffer_height);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod handshake;
pub mod io;
pub mod messages;

pub use handshake::{Credentials, NegotiatedVersion};
pub use io::{InflateStream, RfbInStream, RfbOutStream};
pub use messages::{ClientMessage, ServerMessage};
