//! TCP transport for VNC connections.
//!
//! # Examples
//!
//! ```no_run
//! use rfb_client::transport;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let stream = transport::connect_tcp("localhost", 5900, Duration::from_secs(5)).await?;
//! // Hand the stream to `Client::connect_with`
//! # Ok(())
//! # }
//! ```

use crate::errors::RfbClientError;
use std::time::Duration;
use tokio::net::TcpStream;

/// Connect to a VNC server via plain TCP.
///
/// TCP_NODELAY is enabled for low-latency input events.
///
/// # Errors
///
/// Returns [`RfbClientError::Timeout`] if the connection is not established
/// within `timeout`, and [`RfbClientError::ConnectionFailed`] if DNS
/// resolution or the connection itself fails.
pub async fn connect_tcp(
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<TcpStream, RfbClientError> {
    let addr = format!("{host}:{port}");
    let stream = tokio::time::timeout(timeout, TcpStream::connect(&addr))
        .await
        .map_err(|_| RfbClientError::Timeout(timeout))?
        .map_err(|e| {
            RfbClientError::ConnectionFailed(format!("Failed to connect to {addr}: {e}"))
        })?;

    stream.set_nodelay(true).map_err(|e| {
        RfbClientError::ConnectionFailed(format!("Failed to set TCP_NODELAY: {e}"))
    })?;

    // Log local and remote addresses for correlation with server logs
    if let (Ok(local), Ok(peer)) = (stream.local_addr(), stream.peer_addr()) {
        tracing::info!("Connected via TCP: local={} -> remote={}", local, peer);
    } else {
        tracing::info!("Connected to {} via plain TCP", addr);
    }
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_tcp_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move { listener.accept().await.map(|_| ()) });

        let stream = connect_tcp("127.0.0.1", port, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(stream.nodelay().unwrap());
        accept.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to obtain a port with nothing listening.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let err = connect_tcp("127.0.0.1", port, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, RfbClientError::ConnectionFailed(_)));
    }
}
