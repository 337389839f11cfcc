//! State shared between the session worker and the application handle.

use crate::config::Config;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Exchanging protocol versions.
    Handshaking,
    /// Selecting and running a security type.
    Authenticating,
    /// ClientInit sent, waiting for ServerInit.
    Initializing,
    /// Dispatching server messages.
    NormalProtocol,
    /// The worker has stopped and the stream is closed.
    Closed,
}

/// Descriptive values the application reads for display.
#[derive(Debug, Clone)]
pub(crate) struct SessionInfo {
    pub state: SessionState,
    pub desktop_name: String,
    pub width: u16,
    pub height: u16,
    pub encoding_label: &'static str,
    pub color_model_label: &'static str,
}

impl SessionInfo {
    pub fn new(config: &Config) -> Self {
        Self {
            state: SessionState::Handshaking,
            desktop_name: String::new(),
            width: 0,
            height: 0,
            encoding_label: config.encodings.preferred.label(),
            color_model_label: config.display.color_model.label(),
        }
    }
}

/// Cooperative cancellation: the maintain-connection flag plus a wakeup
/// for a worker parked on a read.
#[derive(Debug)]
pub(crate) struct Shared {
    maintain: AtomicBool,
    wake: Notify,
}

impl Shared {
    pub fn new() -> Self {
        Self {
            maintain: AtomicBool::new(true),
            wake: Notify::new(),
        }
    }

    pub fn maintain(&self) -> bool {
        self.maintain.load(Ordering::Acquire)
    }

    /// Clear the flag and wake the worker. The permit is kept if the worker
    /// is not currently waiting.
    pub fn cancel(&self) {
        self.maintain.store(false, Ordering::Release);
        self.wake.notify_one();
    }

    pub async fn cancelled(&self) {
        self.wake.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_before_wait_is_not_lost() {
        let shared = Shared::new();
        assert!(shared.maintain());
        shared.cancel();
        assert!(!shared.maintain());
        tokio::time::timeout(Duration::from_secs(1), shared.cancelled())
            .await
            .unwrap();
    }
}
