//! Error types for the RFB client.
//!
//! Lower layers report failures as `std::io::Error` (whose kind carries the
//! category), [`StoreError`] or plain `anyhow` context chains. [`classify`]
//! turns any of these into one of the five [`ErrorKind`]s reported to the
//! application.

use rfb_pixelbuffer::StoreError;
use std::borrow::Cow;
use std::io;
use thiserror::Error;

/// Category of a session-ending failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Socket-level failure or the peer closing mid-message.
    Io,
    /// Malformed or unexpected bytes where the framing is fixed.
    Protocol,
    /// Credentials rejected or no usable security type.
    Authentication,
    /// A recognized message type this client does not implement.
    UnsupportedMessage,
    /// An allocation failed.
    ResourceExhausted,
}

impl ErrorKind {
    pub fn label(self) -> &'static str {
        match self {
            ErrorKind::Io => "I/O error",
            ErrorKind::Protocol => "protocol error",
            ErrorKind::Authentication => "authentication error",
            ErrorKind::UnsupportedMessage => "unsupported message",
            ErrorKind::ResourceExhausted => "out of memory",
        }
    }

    fn of_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::InvalidData
            | io::ErrorKind::Unsupported
            | io::ErrorKind::ConnectionRefused => ErrorKind::Protocol,
            io::ErrorKind::PermissionDenied => ErrorKind::Authentication,
            io::ErrorKind::OutOfMemory => ErrorKind::ResourceExhausted,
            _ => ErrorKind::Io,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Errors that can occur during VNC client operation.
#[derive(Debug, Error)]
pub enum RfbClientError {
    /// TCP connection establishment failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection or handshake did not finish in time.
    #[error("Connection timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("I/O error: {0}")]
    Io(String),

    /// Malformed message or unexpected data.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Authentication failed (wrong password, no common security type, ...).
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Unsupported message: {0}")]
    UnsupportedMessage(String),

    /// Allocation failure. Carries no heap data.
    #[error("Out of memory")]
    ResourceExhausted,

    #[error("Configuration error: {0}")]
    Config(String),

    /// The session worker has stopped.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The session task panicked or was aborted.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RfbClientError {
    /// Category reported to the application.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConnectionFailed(_)
            | Self::Timeout(_)
            | Self::Io(_)
            | Self::ConnectionClosed
            | Self::Internal(_) => ErrorKind::Io,
            Self::Protocol(_) | Self::Config(_) => ErrorKind::Protocol,
            Self::AuthFailed(_) => ErrorKind::Authentication,
            Self::UnsupportedMessage(_) => ErrorKind::UnsupportedMessage,
            Self::ResourceExhausted => ErrorKind::ResourceExhausted,
        }
    }

    /// Convert a session failure into a typed error of its classified kind.
    #[must_use]
    pub fn from_session(err: &anyhow::Error) -> Self {
        match classify(err) {
            ErrorKind::ResourceExhausted => Self::ResourceExhausted,
            ErrorKind::Io => Self::Io(format!("{err:#}")),
            ErrorKind::Protocol => Self::Protocol(format!("{err:#}")),
            ErrorKind::Authentication => Self::AuthFailed(format!("{err:#}")),
            ErrorKind::UnsupportedMessage => Self::UnsupportedMessage(format!("{err:#}")),
        }
    }

    /// Message for the terminal error event. Out-of-memory uses a static
    /// string so reporting it does not allocate.
    #[must_use]
    pub fn event_message(&self) -> Cow<'static, str> {
        match self {
            Self::ResourceExhausted => Cow::Borrowed("out of memory"),
            other => Cow::Owned(other.to_string()),
        }
    }
}

/// Classify a failure by the first categorized error in its chain.
///
/// Errors without a recognizable source (decoder validation failures raised
/// with `bail!`) are protocol errors.
#[must_use]
pub fn classify(err: &anyhow::Error) -> ErrorKind {
    for cause in err.chain() {
        if let Some(client) = cause.downcast_ref::<RfbClientError>() {
            return client.kind();
        }
        if cause.downcast_ref::<StoreError>().is_some() {
            return ErrorKind::ResourceExhausted;
        }
        if let Some(io) = cause.downcast_ref::<io::Error>() {
            return ErrorKind::of_io(io);
        }
    }
    ErrorKind::Protocol
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    fn io_err(kind: io::ErrorKind) -> anyhow::Error {
        anyhow::Error::new(io::Error::new(kind, "boom"))
    }

    #[test]
    fn test_io_kinds_map_to_categories() {
        assert_eq!(classify(&io_err(io::ErrorKind::UnexpectedEof)), ErrorKind::Io);
        assert_eq!(classify(&io_err(io::ErrorKind::ConnectionReset)), ErrorKind::Io);
        assert_eq!(classify(&io_err(io::ErrorKind::InvalidData)), ErrorKind::Protocol);
        assert_eq!(classify(&io_err(io::ErrorKind::ConnectionRefused)), ErrorKind::Protocol);
        assert_eq!(
            classify(&io_err(io::ErrorKind::PermissionDenied)),
            ErrorKind::Authentication
        );
        assert_eq!(
            classify(&io_err(io::ErrorKind::OutOfMemory)),
            ErrorKind::ResourceExhausted
        );
    }

    #[test]
    fn test_context_does_not_hide_the_cause() {
        let err = Err::<(), _>(io::Error::from(io::ErrorKind::UnexpectedEof))
            .context("Failed to read raw pixel data")
            .context("RAW rectangle [0,0 4x4]")
            .unwrap_err();
        assert_eq!(classify(&err), ErrorKind::Io);
    }

    #[test]
    fn test_store_error_is_resource_exhausted() {
        let err = anyhow::Error::new(StoreError::ResourceExhausted).context("resize");
        assert_eq!(classify(&err), ErrorKind::ResourceExhausted);
        let typed = RfbClientError::from_session(&err);
        assert!(matches!(typed, RfbClientError::ResourceExhausted));
        assert!(matches!(typed.event_message(), Cow::Borrowed("out of memory")));
    }

    #[test]
    fn test_bare_message_is_protocol() {
        let err = anyhow::anyhow!("subrect extends beyond tile");
        assert_eq!(classify(&err), ErrorKind::Protocol);
    }

    #[test]
    fn test_unsupported_message_survives_wrapping() {
        let err = anyhow::Error::new(RfbClientError::UnsupportedMessage(
            "SetColourMapEntries".to_string(),
        ))
        .context("dispatch");
        assert_eq!(classify(&err), ErrorKind::UnsupportedMessage);
    }

    #[test]
    fn test_error_display() {
        let err = RfbClientError::AuthFailed("wrong password".to_string());
        assert_eq!(err.to_string(), "Authentication failed: wrong password");
        assert_eq!(err.kind(), ErrorKind::Authentication);

        let err = RfbClientError::Timeout(std::time::Duration::from_secs(5));
        assert!(err.to_string().contains("5s"));
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
