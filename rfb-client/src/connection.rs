//! Connection establishment: the RFB handshake up to ServerInit.
//!
//! Steps, all bounded by the configured timeout:
//! 1) Negotiate the protocol version
//! 2) Select and run a security type (None, VNC, MS-Logon II, or Tight
//!    wrapping one of the first two)
//! 3) Send ClientInit with the configured shared flag
//! 4) Read ServerInit (plus Tight capability lists when Tight was used)

use crate::config::Config;
use crate::errors::RfbClientError;
use crate::session::{SessionInfo, SessionState};
use anyhow::Context;
use parking_lot::Mutex;
use rfb_protocol::handshake::{
    negotiate_security, negotiate_version, recv_server_init, send_client_init, Credentials,
};
use rfb_protocol::io::{RfbInStream, RfbOutStream};
use rfb_protocol::messages::ServerInit;
use tokio::io::{AsyncRead, AsyncWrite};

/// Run the handshake on an already connected stream.
pub(crate) async fn establish<R, W>(
    input: &mut RfbInStream<R>,
    output: &mut RfbOutStream<W>,
    config: &Config,
    info: &Mutex<SessionInfo>,
) -> Result<ServerInit, RfbClientError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let timeout = config.timeout();
    match tokio::time::timeout(timeout, handshake(input, output, config, info)).await {
        Ok(Ok(init)) => Ok(init),
        Ok(Err(err)) => {
            tracing::warn!("Handshake failed: {:#}", err);
            info.lock().state = SessionState::Closed;
            Err(RfbClientError::from_session(&err))
        }
        Err(_) => {
            tracing::warn!("Handshake timed out after {:?}", timeout);
            info.lock().state = SessionState::Closed;
            Err(RfbClientError::Timeout(timeout))
        }
    }
}

fn credentials(config: &Config) -> Credentials {
    Credentials {
        username: config.security.username.clone().unwrap_or_default(),
        password: config.security.password.clone(),
    }
}

async fn handshake<R, W>(
    input: &mut RfbInStream<R>,
    output: &mut RfbOutStream<W>,
    config: &Config,
    info: &Mutex<SessionInfo>,
) -> anyhow::Result<ServerInit>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info.lock().state = SessionState::Handshaking;
    let version = negotiate_version(input, output)
        .await
        .context("Version negotiation failed")?;
    tracing::debug!("Negotiated protocol version {:?}", version);

    info.lock().state = SessionState::Authenticating;
    let security = negotiate_security(input, output, version, &credentials(config))
        .await
        .context("Security negotiation failed")?;
    tracing::debug!(
        "Security complete: {:?}{}",
        security.scheme,
        if security.tight { " (tight)" } else { "" }
    );

    info.lock().state = SessionState::Initializing;
    send_client_init(output, config.connection.shared)
        .await
        .context("Failed to send ClientInit")?;
    let init = recv_server_init(input, security.tight)
        .await
        .context("Failed to read ServerInit")?;

    tracing::info!(
        "Server '{}' is {}x{} ({} bpp)",
        init.name,
        init.framebuffer_width,
        init.framebuffer_height,
        init.pixel_format.bits_per_pixel
    );
    {
        let mut info = info.lock();
        info.desktop_name = init.name.clone();
        info.width = init.framebuffer_width;
        info.height = init.framebuffer_height;
    }
    Ok(init)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use std::time::Duration;

    fn config() -> Config {
        Config::builder().host("test").timeout_ms(2_000).build().unwrap()
    }

    fn server_init() -> ServerInit {
        ServerInit {
            framebuffer_width: 64,
            framebuffer_height: 48,
            pixel_format: rfb_pixelbuffer::ColorModel::C24bit.pixel_format(),
            name: "scripted".to_string(),
        }
    }

    #[tokio::test]
    async fn test_handshake_none_security_v3_8() {
        let (client, server) = tokio::io::duplex(4096);
        let (cr, cw) = tokio::io::split(client);
        let (sr, sw) = tokio::io::split(server);
        let mut input = RfbInStream::new(cr);
        let mut output = RfbOutStream::new(cw);

        let server = tokio::spawn(async move {
            let mut sin = RfbInStream::new(sr);
            let mut sout = RfbOutStream::new(sw);
            sout.write_bytes(b"RFB 003.008\n");
            sout.write_bytes(&[1, 1]);
            sout.flush().await.unwrap();

            let mut version = [0u8; 12];
            sin.read_bytes(&mut version).await.unwrap();
            assert_eq!(&version, b"RFB 003.008\n");
            assert_eq!(sin.read_u8().await.unwrap(), 1);

            sout.write_u32(0);
            sout.flush().await.unwrap();
            assert_eq!(sin.read_u8().await.unwrap(), 1, "shared flag");
            server_init().write_to(&mut sout);
            sout.flush().await.unwrap();
        });

        let info = Mutex::new(SessionInfo::new(&config()));
        let init = establish(&mut input, &mut output, &config(), &info)
            .await
            .unwrap();
        server.await.unwrap();

        assert_eq!(init, server_init());
        let info = info.lock();
        assert_eq!(info.state, SessionState::Initializing);
        assert_eq!(info.desktop_name, "scripted");
        assert_eq!((info.width, info.height), (64, 48));
    }

    #[tokio::test]
    async fn test_auth_failure_is_authentication_kind() {
        let (client, server) = tokio::io::duplex(4096);
        let (cr, cw) = tokio::io::split(client);
        let (sr, sw) = tokio::io::split(server);
        let mut input = RfbInStream::new(cr);
        let mut output = RfbOutStream::new(cw);

        tokio::spawn(async move {
            let mut sin = RfbInStream::new(sr);
            let mut sout = RfbOutStream::new(sw);
            sout.write_bytes(b"RFB 003.008\n");
            sout.write_bytes(&[1, 2]);
            sout.write_bytes(&[0u8; 16]);
            sout.flush().await.unwrap();
            let mut version = [0u8; 12];
            sin.read_bytes(&mut version).await.unwrap();
            sin.read_u8().await.unwrap();
            let mut response = [0u8; 16];
            sin.read_bytes(&mut response).await.unwrap();
            sout.write_u32(1);
            sout.write_u32(14);
            sout.write_bytes(b"wrong password");
            sout.flush().await.unwrap();
        });

        let config = Config::builder()
            .host("test")
            .password("secret")
            .build()
            .unwrap();
        let info = Mutex::new(SessionInfo::new(&config));
        let err = establish(&mut input, &mut output, &config, &info)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert!(err.to_string().contains("wrong password"), "{err}");
        assert_eq!(info.lock().state, SessionState::Closed);
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let (client, _server) = tokio::io::duplex(64);
        let (cr, cw) = tokio::io::split(client);
        let mut input = RfbInStream::new(cr);
        let mut output = RfbOutStream::new(cw);

        let config = Config::builder().host("test").timeout_ms(50).build().unwrap();
        let info = Mutex::new(SessionInfo::new(&config));
        let err = establish(&mut input, &mut output, &config, &info)
            .await
            .unwrap_err();
        assert!(matches!(err, RfbClientError::Timeout(d) if d == Duration::from_millis(50)));
    }

    #[test]
    fn test_credentials_from_config() {
        assert!(!credentials(&config()).has_username());
        let config = Config::builder()
            .host("h")
            .username("alice")
            .password("pw")
            .build()
            .unwrap();
        let creds = credentials(&config);
        assert_eq!(creds.username, "alice");
        assert_eq!(creds.password.as_deref(), Some("pw"));
    }
}
