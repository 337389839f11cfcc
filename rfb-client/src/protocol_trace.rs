//! Opt-in wire trace, enabled with `RUST_VNC_TRACE=1`.
//!
//! Logs one line per client message sent and per server message received
//! under the `protocol_trace` target.

use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicBool, Ordering};

static TRACE_ENABLED: Lazy<AtomicBool> = Lazy::new(|| {
    let on = std::env::var("RUST_VNC_TRACE")
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE"))
        .unwrap_or(false);
    AtomicBool::new(on)
});

#[inline]
pub fn enabled() -> bool {
    TRACE_ENABLED.load(Ordering::Relaxed)
}

#[cfg(test)]
pub fn set_enabled(on: bool) {
    TRACE_ENABLED.store(on, Ordering::Relaxed);
}

#[inline]
pub fn out_msg(name: &str, fields: impl FnOnce() -> String) {
    if enabled() {
        tracing::info!(target: "protocol_trace", "OUT {} {}", name, fields());
    }
}

#[inline]
pub fn in_msg(name: &str, fields: impl FnOnce() -> String) {
    if enabled() {
        tracing::info!(target: "protocol_trace", "IN  {} {}", name, fields());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_only_formatted_when_enabled() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_test_writer()
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            set_enabled(false);
            out_msg("KeyEvent", || unreachable!("trace is off"));

            set_enabled(true);
            let mut called = false;
            in_msg("Bell", || {
                called = true;
                String::new()
            });
            set_enabled(false);
            assert!(called);
        });
    }
}
