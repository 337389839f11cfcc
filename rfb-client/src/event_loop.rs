//! The session worker: one task that owns the streams, the framebuffer store
//! and the decoders, dispatches server messages and applies client commands.
//!
//! The worker alternates between waiting for the next server message type
//! byte and for application commands. Whatever ends the loop, the worker
//! marks the session closed, drops both stream halves and sends exactly one
//! terminal [`ServerEvent`].

use crate::{
    encodings::{EncodingNegotiator, EncodingPreferences},
    errors::RfbClientError,
    messages::{ClientCommand, ServerEvent},
    protocol, protocol_trace,
    session::{SessionInfo, SessionState, Shared},
};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use rfb_encodings::pseudo::{skip_cursor, skip_unknown};
use rfb_encodings::{DecodeContext, DecoderSet, RectKind, ScratchBuffers};
use rfb_pixelbuffer::{ColorFormat, ColorModel, FramebufferStore};
use rfb_protocol::io::{RfbInStream, RfbOutStream};
use rfb_protocol::messages::{
    ClientMessage, Encoding, KeyEvent, PointerEvent, Rectangle, ServerMessage,
};
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

/// Everything the worker owns for one connection.
pub(crate) struct Session<R, W> {
    input: RfbInStream<R>,
    output: RfbOutStream<W>,
    store: Box<dyn FramebufferStore>,
    decoders: DecoderSet,
    scratch: ScratchBuffers,
    /// Format used to decode the current update.
    format: ColorFormat,
    color_model: ColorModel,
    /// Requested model, applied once the current update completes.
    pending_model: Option<ColorModel>,
    /// The next update request must be non-incremental.
    full_refresh: bool,
    prefs: EncodingPreferences,
    negotiator: EncodingNegotiator,
    info: Arc<Mutex<SessionInfo>>,
    events: flume::Sender<ServerEvent>,
    commands: flume::Receiver<ClientCommand>,
    shared: Arc<Shared>,
}

/// Channels and shared state handed to a new session.
pub(crate) struct SessionLinks {
    pub info: Arc<Mutex<SessionInfo>>,
    pub events: flume::Sender<ServerEvent>,
    pub commands: flume::Receiver<ClientCommand>,
    pub shared: Arc<Shared>,
}

impl<R, W> Session<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(
        input: RfbInStream<R>,
        output: RfbOutStream<W>,
        store: Box<dyn FramebufferStore>,
        color_model: ColorModel,
        prefs: EncodingPreferences,
        links: SessionLinks,
    ) -> Self {
        Self {
            input,
            output,
            store,
            decoders: DecoderSet::new(),
            scratch: ScratchBuffers::default(),
            format: color_model.select_format(),
            color_model,
            pending_model: None,
            full_refresh: false,
            prefs,
            negotiator: EncodingNegotiator::default(),
            info: links.info,
            events: links.events,
            commands: links.commands,
            shared: links.shared,
        }
    }

    /// Run the session to completion.
    pub async fn run(mut self) {
        let result = self.dispatch().await;

        let terminal = match result {
            Ok(()) => {
                tracing::info!("Session closed");
                ServerEvent::ConnectionClosed
            }
            Err(err) => failure_event(&err),
        };

        let events = self.events.clone();
        let info = Arc::clone(&self.info);
        // Dropping the session closes both stream halves.
        drop(self);
        info.lock().state = SessionState::Closed;
        let _ = events.send(terminal);
    }

    async fn dispatch(&mut self) -> Result<()> {
        let (width, height) = self.store.framebuffer_size();
        let name = {
            let mut info = self.info.lock();
            info.state = SessionState::NormalProtocol;
            info.desktop_name.clone()
        };
        let _ = self.events.send(ServerEvent::Connected {
            width,
            height,
            name,
        });
        self.start().await?;

        let shared = Arc::clone(&self.shared);
        loop {
            if !shared.maintain() {
                return Ok(());
            }
            let requests = self.store.sync_scroll();
            protocol::write_update_requests(&mut self.output, &requests)
                .await
                .context("Failed to request scrolled-in area")?;
            self.send_encodings_if_changed().await?;

            tokio::select! {
                biased;

                () = shared.cancelled() => return Ok(()),

                command = self.commands.recv_async() => match command {
                    Ok(command) => self.handle_command(command).await?,
                    Err(_) => {
                        tracing::debug!("Command channel closed");
                        return Ok(());
                    }
                },

                msg_type = self.input.read_u8() => match msg_type {
                    Ok(msg_type) => {
                        tokio::select! {
                            biased;
                            () = shared.cancelled() => return Ok(()),
                            handled = self.handle_message(msg_type) => handled?,
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                        tracing::info!("Server closed the connection");
                        return Ok(());
                    }
                    Err(e) => return Err(e).context("Failed to read message type"),
                },
            }
        }
    }

    /// Initial pixel format, encodings and full update request.
    async fn start(&mut self) -> Result<()> {
        protocol::write_set_pixel_format(&mut self.output, self.color_model.pixel_format())
            .await
            .context("Failed to send SetPixelFormat")?;
        self.send_encodings_if_changed().await?;
        self.request_update(false).await
    }

    async fn send_encodings_if_changed(&mut self) -> Result<()> {
        if let Some(encodings) = self.negotiator.next(&self.prefs) {
            protocol::write_set_encodings(&mut self.output, encodings)
                .await
                .context("Failed to send SetEncodings")?;
        }
        Ok(())
    }

    async fn request_update(&mut self, incremental: bool) -> Result<()> {
        let request = self.store.full_update_request(incremental);
        protocol::write_update_requests(&mut self.output, &[request])
            .await
            .context("Failed to send FramebufferUpdateRequest")
    }

    async fn handle_message(&mut self, msg_type: u8) -> Result<()> {
        let message = ServerMessage::read_body(msg_type, &mut self.input)
            .await
            .with_context(|| format!("Failed to read server message type {msg_type}"))?;

        match message {
            ServerMessage::FramebufferUpdate(header) => {
                protocol_trace::in_msg("FramebufferUpdate", || {
                    format!("rects={}", header.num_rectangles)
                });
                self.handle_framebuffer_update(header.num_rectangles).await?;
                self.finish_update().await?;
            }
            ServerMessage::SetColorMapEntries => {
                return Err(RfbClientError::UnsupportedMessage(
                    "SetColourMapEntries".to_string(),
                )
                .into());
            }
            ServerMessage::Bell => {
                protocol_trace::in_msg("Bell", String::new);
                let _ = self.events.send(ServerEvent::Bell);
            }
            ServerMessage::ServerCutText(cut) => {
                tracing::debug!("Discarded {} bytes of server cut text", cut.length);
            }
            ServerMessage::TextChat(chat) => {
                tracing::debug!("Discarded text chat message: {:?}", chat);
            }
        }
        Ok(())
    }

    async fn handle_framebuffer_update(&mut self, num_rectangles: u16) -> Result<()> {
        for _ in 0..num_rectangles {
            let rect = Rectangle::read_from(&mut self.input)
                .await
                .context("Failed to read rectangle header")?;
            let bpp = self.format.bytes_per_pixel();

            match RectKind::of(rect.encoding) {
                RectKind::LastRect => break,
                RectKind::DesktopSize => self.resize(rect.width, rect.height)?,
                RectKind::Cursor(_) => skip_cursor(&mut self.input, &rect, bpp)
                    .await
                    .context("Failed to skip cursor data")?,
                RectKind::Unknown(_) => skip_unknown(&mut self.input, &rect, bpp)
                    .await
                    .context("Failed to skip unsupported rectangle")?,
                RectKind::Pixels(encoding) => {
                    let mut ctx = DecodeContext {
                        format: &self.format,
                        store: self.store.as_mut(),
                        scratch: &mut self.scratch,
                    };
                    self.decoders
                        .decode(encoding, &mut self.input, &rect, &mut ctx)
                        .await?;
                }
            }
        }
        Ok(())
    }

    fn resize(&mut self, width: u16, height: u16) -> Result<()> {
        tracing::info!("Desktop resized to {}x{}", width, height);
        self.store
            .resize(width, height)
            .context("Failed to resize framebuffer")?;
        {
            let mut info = self.info.lock();
            info.width = width;
            info.height = height;
        }
        let _ = self.events.send(ServerEvent::DesktopResized { width, height });
        self.full_refresh = true;
        Ok(())
    }

    /// Apply a pending pixel format change, then ask for the next update.
    async fn finish_update(&mut self) -> Result<()> {
        if let Some(model) = self.pending_model.take() {
            protocol::write_set_pixel_format(&mut self.output, model.pixel_format())
                .await
                .context("Failed to send SetPixelFormat")?;
            self.format = model.select_format();
            self.color_model = model;
            self.info.lock().color_model_label = model.label();
            tracing::info!("Switched to {}", model.label());
            self.full_refresh = true;
        }
        let incremental = !std::mem::take(&mut self.full_refresh);
        self.request_update(incremental).await
    }

    async fn handle_command(&mut self, command: ClientCommand) -> Result<()> {
        match command {
            ClientCommand::RequestUpdate { incremental } => {
                self.request_update(incremental).await?;
            }
            ClientCommand::SetPreferredEncoding(Encoding::CopyRect) => {
                tracing::warn!("CopyRect cannot be the preferred encoding, ignoring");
            }
            ClientCommand::SetPreferredEncoding(encoding) => {
                self.prefs.preferred = encoding;
                self.info.lock().encoding_label = encoding.label();
            }
            ClientCommand::SetColorModel(model) => {
                self.pending_model = (model != self.color_model).then_some(model);
            }
            ClientCommand::ScrollTo { x, y } => self.store.scroll_to(x, y),
            ClientCommand::Pointer { x, y, buttons } => {
                let event = PointerEvent {
                    button_mask: buttons,
                    x,
                    y,
                };
                protocol::send(&mut self.output, &ClientMessage::PointerEvent(event))
                    .await
                    .context("Failed to send PointerEvent")?;
            }
            ClientCommand::Key { key, down } => {
                protocol::send(&mut self.output, &ClientMessage::KeyEvent(KeyEvent { down, key }))
                    .await
                    .context("Failed to send KeyEvent")?;
            }
            ClientCommand::ClientCutText { text } => {
                let message = ClientMessage::ClientCutText(rfb_protocol::messages::ClientCutText {
                    text,
                });
                protocol::send(&mut self.output, &message)
                    .await
                    .context("Failed to send ClientCutText")?;
            }
        }
        Ok(())
    }
}

/// Log a session failure and build its terminal event. Out-of-memory
/// failures are logged with a fixed message so nothing is formatted.
fn failure_event(err: &anyhow::Error) -> ServerEvent {
    let error = RfbClientError::from_session(err);
    if matches!(error, RfbClientError::ResourceExhausted) {
        tracing::error!("Session failed (resource exhausted): out of memory");
    } else {
        tracing::error!("Session failed ({}): {:#}", error.kind(), err);
    }
    ServerEvent::Error {
        kind: error.kind(),
        message: error.event_message(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use rfb_pixelbuffer::StoreError;
    use std::borrow::Cow;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn logged(err: &anyhow::Error) -> (ServerEvent, String) {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let event = tracing::subscriber::with_default(subscriber, || failure_event(err));
        let text = String::from_utf8_lossy(&captured.0.lock()).into_owned();
        (event, text)
    }

    #[test]
    fn test_out_of_memory_is_logged_without_error_chain() {
        let err = anyhow::Error::new(StoreError::ResourceExhausted)
            .context("HEXTILE rectangle [0,0 64x64]");
        let (event, text) = logged(&err);

        assert!(matches!(
            event,
            ServerEvent::Error {
                kind: ErrorKind::ResourceExhausted,
                message: Cow::Borrowed("out of memory"),
            }
        ));
        assert!(text.contains("out of memory"));
        assert!(!text.contains("HEXTILE"));
    }

    #[test]
    fn test_other_failures_log_full_chain() {
        let err = anyhow::anyhow!("bad subencoding 0x99").context("ZRLE rectangle [1,2 3x4]");
        let (event, text) = logged(&err);

        assert!(matches!(
            event,
            ServerEvent::Error {
                kind: ErrorKind::Protocol,
                ..
            }
        ));
        assert!(text.contains("ZRLE rectangle [1,2 3x4]: bad subencoding 0x99"));
    }
}
