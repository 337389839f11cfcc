//! High-level async VNC client library.
//!
//! This crate drives one RFB session on top of the low-level `rfb-protocol`,
//! `rfb-pixelbuffer` and `rfb-encodings` crates: it runs the handshake,
//! spawns the session worker that dispatches server messages into the
//! framebuffer store, and exposes a handle for reading the framebuffer and
//! issuing control commands.
//!
//! # Features
//!
//! - **Async I/O**: one tokio task per session; the handshake and the
//!   dispatch loop never block a runtime thread
//! - **Security types**: None, VNC password, MS-Logon II, and Tight wrapping
//!   None/VNC
//! - **Encodings**: Raw, CopyRect, RRE, CoRRE, Hextile, Zlib and ZRLE, plus
//!   the LastRect, DesktopSize and cursor pseudo-encodings
//! - **Two color models**: 24-bit truecolor and 256-color BGR233
//! - **Memory budget**: desktops too large for the budget are kept as a
//!   scrollable window instead of in full
//! - **Configuration management**: TOML files and a fluent builder
//!
//! # Quick Start
//!
//! ```no_run
//! use rfb_client::{ClientBuilder, Config, ServerEvent};
//! use anyhow::Result;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::builder()
//!         .host("localhost")
//!         .port(5900)
//!         .password("secret")
//!         .build()?;
//!
//!     let client = ClientBuilder::new(config).build().await?;
//!     println!("Connected to '{}'", client.desktop_name());
//!
//!     while let Ok(event) = client.events().recv_async().await {
//!         match event {
//!             ServerEvent::Connected { width, height, .. } => {
//!                 println!("Desktop is {width}x{height}");
//!             }
//!             ServerEvent::Error { kind, message } => {
//!                 eprintln!("{kind}: {message}");
//!                 break;
//!             }
//!             ServerEvent::ConnectionClosed => break,
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Handshake**: runs inside [`ClientBuilder::build`] /
//!   [`Client::connect_with`]; failures are returned directly.
//! - **Session worker**: a spawned task owning the streams, the store and
//!   the decoders. It reports through [`ServerEvent`]s and ends every session
//!   with exactly one terminal event.
//! - **Redraws**: decoders mark dirty areas through a coalescing channel.
//!   The application waits on [`ClientHandle::redraws`] and then pulls the
//!   current pixels from [`ClientHandle::framebuffer`].
//!
//! # Safety
//!
//! This crate is `#![forbid(unsafe_code)]` and uses only safe Rust.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

// Public modules
pub mod config;
pub mod errors;
pub mod messages;
pub mod session;
pub mod transport;

// Private implementation modules
mod connection;
mod encodings;
mod event_loop;
mod protocol;
mod protocol_trace;

// Optional CLI support
#[cfg(feature = "cli")]
pub mod args;

// Re-exports
pub use config::Config;
pub use errors::{ErrorKind, RfbClientError};
pub use messages::{ClientCommand, ServerEvent};
pub use rfb_pixelbuffer::{ColorModel, FramebufferHandle, RedrawReceiver};
pub use rfb_protocol::messages::Encoding;
pub use session::SessionState;

use encodings::EncodingPreferences;
use event_loop::{Session, SessionLinks};
use parking_lot::Mutex;
use rfb_common::Rect;
use rfb_pixelbuffer::{select_store, RedrawNotifier};
use rfb_protocol::io::{RfbInStream, RfbOutStream};
use session::{SessionInfo, Shared};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;

/// Builder for creating a VNC client.
///
/// # Examples
///
/// ```no_run
/// use rfb_client::{Config, ClientBuilder};
/// # use anyhow::Result;
///
/// # async fn example() -> Result<()> {
/// let config = Config::builder()
///     .host("localhost")
///     .port(5900)
///     .build()?;
///
/// let client = ClientBuilder::new(config).build().await?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    config: Config,
}

impl ClientBuilder {
    /// Creates a new client builder with the given configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Connects over TCP, runs the handshake and starts the session worker.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration is invalid
    /// - Connection to the server fails or times out
    /// - The RFB handshake fails
    /// - Authentication fails
    pub async fn build(self) -> Result<ClientHandle, RfbClientError> {
        self.config.validate()?;
        let stream = transport::connect_tcp(
            &self.config.connection.host,
            self.config.connection.port,
            self.config.timeout(),
        )
        .await?;
        Client::connect_with(stream, self.config).await
    }
}

/// Entry point for sessions over streams other than a direct TCP connection.
pub struct Client;

impl Client {
    /// Run the handshake over `stream` and start the session worker.
    ///
    /// `stream` can be any connected byte stream: a proxied socket, a
    /// tunnel, or an in-memory duplex in tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the handshake or
    /// authentication fails, or the framebuffer cannot be allocated.
    pub async fn connect_with<S>(stream: S, config: Config) -> Result<ClientHandle, RfbClientError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        config.validate()?;
        let (reader, writer) = tokio::io::split(stream);
        let mut input = RfbInStream::new(reader);
        let mut output = RfbOutStream::new(writer);

        let info = Arc::new(Mutex::new(SessionInfo::new(&config)));
        let init = connection::establish(&mut input, &mut output, &config, &info).await?;

        let (notifier, redraws) = RedrawNotifier::channel();
        let store = select_store(
            init.framebuffer_width,
            init.framebuffer_height,
            config.viewport(),
            config.memory.budget_bytes,
            notifier,
        )
        .map_err(|_| RfbClientError::ResourceExhausted)?;
        let surface = store.surface();

        let (cmd_tx, cmd_rx) = flume::unbounded();
        let (event_tx, event_rx) = flume::unbounded();
        let shared = Arc::new(Shared::new());

        let session = Session::new(
            input,
            output,
            store,
            config.display.color_model,
            EncodingPreferences::from(&config.encodings),
            SessionLinks {
                info: Arc::clone(&info),
                events: event_tx,
                commands: cmd_rx,
                shared: Arc::clone(&shared),
            },
        );
        let join_handle = tokio::spawn(session.run());

        Ok(ClientHandle {
            commands: cmd_tx,
            events: event_rx,
            redraws,
            surface,
            info,
            shared,
            join_handle: Some(join_handle),
        })
    }
}

/// Handle for interacting with a running VNC session.
///
/// Dropping the handle closes the session.
pub struct ClientHandle {
    commands: flume::Sender<ClientCommand>,
    events: flume::Receiver<ServerEvent>,
    redraws: RedrawReceiver,
    surface: FramebufferHandle,
    info: Arc<Mutex<SessionInfo>>,
    shared: Arc<Shared>,
    join_handle: Option<JoinHandle<()>>,
}

impl ClientHandle {
    /// Session events. The last event of every session is either
    /// [`ServerEvent::Error`] or [`ServerEvent::ConnectionClosed`].
    #[must_use]
    pub fn events(&self) -> &flume::Receiver<ServerEvent> {
        &self.events
    }

    /// Coalesced redraw signal. Wait on it, then read
    /// [`framebuffer`](Self::framebuffer).
    #[must_use]
    pub fn redraws(&self) -> &RedrawReceiver {
        &self.redraws
    }

    /// Take the area changed since the last call, if any.
    #[must_use]
    pub fn take_dirty(&self) -> Option<Rect> {
        self.redraws.take_dirty()
    }

    /// The shared pixel surface. Its origin is the remote coordinate of its
    /// top-left pixel (non-zero only for a scrolled windowed store).
    #[must_use]
    pub fn framebuffer(&self) -> FramebufferHandle {
        Arc::clone(&self.surface)
    }

    /// Desktop name announced in ServerInit.
    #[must_use]
    pub fn desktop_name(&self) -> String {
        self.info.lock().desktop_name.clone()
    }

    /// Remote framebuffer size as `(width, height)`.
    #[must_use]
    pub fn framebuffer_size(&self) -> (u16, u16) {
        let info = self.info.lock();
        (info.width, info.height)
    }

    /// Label of the encoding currently asked for first.
    #[must_use]
    pub fn encoding_label(&self) -> &'static str {
        self.info.lock().encoding_label
    }

    /// Label of the color model in use.
    #[must_use]
    pub fn color_model_label(&self) -> &'static str {
        self.info.lock().color_model_label
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.info.lock().state
    }

    /// Sends a command to the session worker.
    ///
    /// # Errors
    ///
    /// Returns [`RfbClientError::ConnectionClosed`] once the worker has
    /// stopped.
    pub fn send(&self, cmd: ClientCommand) -> Result<(), RfbClientError> {
        self.commands
            .send(cmd)
            .map_err(|_| RfbClientError::ConnectionClosed)
    }

    /// Request an update of the resident area.
    pub fn request_update(&self, incremental: bool) -> Result<(), RfbClientError> {
        self.send(ClientCommand::RequestUpdate { incremental })
    }

    /// Change the encoding asked for first.
    pub fn set_preferred_encoding(&self, encoding: Encoding) -> Result<(), RfbClientError> {
        self.send(ClientCommand::SetPreferredEncoding(encoding))
    }

    /// Switch color model after the current update completes.
    pub fn set_color_model(&self, model: ColorModel) -> Result<(), RfbClientError> {
        self.send(ClientCommand::SetColorModel(model))
    }

    /// Move the viewport origin of a windowed store.
    pub fn scroll_to(&self, x: i32, y: i32) -> Result<(), RfbClientError> {
        self.send(ClientCommand::ScrollTo { x, y })
    }

    /// Send a pointer event in remote coordinates.
    pub fn send_pointer(&self, x: u16, y: u16, buttons: u8) -> Result<(), RfbClientError> {
        self.send(ClientCommand::Pointer { x, y, buttons })
    }

    /// Send a key press or release (X11 keysym).
    pub fn send_key(&self, key: u32, down: bool) -> Result<(), RfbClientError> {
        self.send(ClientCommand::Key { key, down })
    }

    /// Send clipboard text.
    pub fn send_cut_text(&self, text: impl Into<String>) -> Result<(), RfbClientError> {
        self.send(ClientCommand::ClientCutText { text: text.into() })
    }

    /// Ask the worker to stop. The worker closes the stream and sends
    /// [`ServerEvent::ConnectionClosed`] unless it already ended.
    pub fn close(&self) {
        self.shared.cancel();
    }

    /// Wait for the session worker to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker panicked.
    pub async fn join(mut self) -> Result<(), RfbClientError> {
        match self.join_handle.take() {
            Some(handle) => handle
                .await
                .map_err(|e| RfbClientError::Internal(format!("Session task failed: {e}"))),
            None => Ok(()),
        }
    }
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        self.shared.cancel();
    }
}
