//! RFB session negotiation.
//!
//! Runs once on a freshly connected stream, in order:
//!
//! 1. **Protocol version** - read the server's 12-byte version string and
//!    answer with the highest of 3.3 / 3.7 / 3.8 it can speak.
//! 2. **Security type** - pick one of the offered types (3.7+ sends a list,
//!    3.3 dictates a single `u32` type).
//! 3. **Sub-negotiation** - Tight security wraps a tunnelling offer and a
//!    second authentication choice.
//! 4. **Authentication** - None, VNC challenge/response, or MS-Logon II
//!    (see [`crate::auth`]), followed by the SecurityResult where the
//!    protocol version calls for one.
//! 5. **Initialization** - ClientInit out, ServerInit in, plus the Tight
//!    interaction capability lists when Tight security was used.
//!
//! # Errors
//!
//! Everything is reported as [`std::io::Error`], with the kind carrying the
//! failure class:
//!
//! - `InvalidData` / `Unsupported` / `ConnectionRefused` - malformed or
//!   refused handshake
//! - `PermissionDenied` - credentials rejected, missing, or no usable
//!   authentication type
//! - anything else - transport failure

use crate::auth;
use crate::io::{RfbInStream, RfbOutStream};
use crate::messages::types::{
    SECURITY_TYPE_NONE, SECURITY_TYPE_TIGHT, SECURITY_TYPE_ULTRA34,
    SECURITY_TYPE_ULTRA_MS_LOGON_II, SECURITY_TYPE_VNC_AUTH,
};
use crate::messages::{self, ServerInit};
use std::io::{Error, ErrorKind};
use tokio::io::{AsyncRead, AsyncWrite};

/// Upper bound on server-supplied failure reason strings.
const MAX_REASON_LENGTH: usize = 64 * 1024;

/// Size of one Tight capability record (code, vendor, name).
const TIGHT_CAPABILITY_SIZE: usize = 16;

/// Negotiated RFB protocol version after handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NegotiatedVersion {
    /// RFB 3.3 - server dictates the security type. Also used for the
    /// UltraVNC 3.4 / 3.6 variants.
    V3_3,
    /// RFB 3.7 - security list, no result after None.
    V3_7,
    /// RFB 3.8 - security list, result after every type, failure reasons.
    V3_8,
}

impl NegotiatedVersion {
    /// The 12-byte version string the client sends for this version.
    pub fn client_version_bytes(self) -> &'static [u8; 12] {
        match self {
            NegotiatedVersion::V3_3 => b"RFB 003.003\n",
            NegotiatedVersion::V3_7 => b"RFB 003.007\n",
            NegotiatedVersion::V3_8 => b"RFB 003.008\n",
        }
    }
}

/// Credentials supplied before negotiation begins.
///
/// An empty username means "not supplied" and steers the security policy
/// away from username-based schemes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

impl Credentials {
    pub fn has_username(&self) -> bool {
        !self.username.is_empty()
    }
}

/// Authentication scheme actually run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    None,
    Vnc,
    MsLogon,
}

/// Result of the security phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityOutcome {
    pub scheme: AuthScheme,
    /// Tight security was used; ServerInit is followed by capability lists.
    pub tight: bool,
}

/// Negotiate RFB protocol version with the server.
pub async fn negotiate_version<R: AsyncRead + Unpin, W: AsyncWrite + Unpin>(
    instream: &mut RfbInStream<R>,
    outstream: &mut RfbOutStream<W>,
) -> std::io::Result<NegotiatedVersion> {
    let mut version_buf = [0u8; 12];
    instream.read_bytes(&mut version_buf).await?;

    if &version_buf[0..4] != b"RFB " || version_buf[11] != b'\n' || version_buf[7] != b'.' {
        return Err(Error::new(
            ErrorKind::InvalidData,
            format!(
                "invalid RFB version string: expected 'RFB xxx.yyy\\n', got {:?}",
                String::from_utf8_lossy(&version_buf)
            ),
        ));
    }

    let parse = |digits: &[u8]| -> std::io::Result<u32> {
        std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::InvalidData,
                    format!("invalid version digits {:?}", String::from_utf8_lossy(digits)),
                )
            })
    };
    let major = parse(&version_buf[4..7])?;
    let minor = parse(&version_buf[8..11])?;

    if major != 3 {
        return Err(Error::new(
            ErrorKind::Unsupported,
            format!("unsupported RFB version {major}.{minor}"),
        ));
    }

    let negotiated = match minor {
        m if m >= 8 => NegotiatedVersion::V3_8,
        7 => NegotiatedVersion::V3_7,
        _ => NegotiatedVersion::V3_3,
    };
    tracing::info!(
        "server speaks RFB {}.{}, using {:?}",
        major,
        minor,
        negotiated
    );

    outstream.write_bytes(negotiated.client_version_bytes());
    outstream.flush().await?;

    Ok(negotiated)
}

/// Choose a security type from the server's list.
///
/// With a username, MS-Logon II is preferred when offered. Otherwise Tight
/// wins, then the first of None / VNC authentication in server order.
pub fn select_security_type(offered: &[u8], has_username: bool) -> Option<u8> {
    if has_username && offered.contains(&SECURITY_TYPE_ULTRA_MS_LOGON_II) {
        return Some(SECURITY_TYPE_ULTRA_MS_LOGON_II);
    }
    if offered.contains(&SECURITY_TYPE_TIGHT) {
        return Some(SECURITY_TYPE_TIGHT);
    }
    offered
        .iter()
        .copied()
        .find(|&t| t == SECURITY_TYPE_NONE || t == SECURITY_TYPE_VNC_AUTH)
}

/// Run security type selection, any sub-negotiation, authentication and the
/// SecurityResult check.
pub async fn negotiate_security<R: AsyncRead + Unpin, W: AsyncWrite + Unpin>(
    instream: &mut RfbInStream<R>,
    outstream: &mut RfbOutStream<W>,
    version: NegotiatedVersion,
    credentials: &Credentials,
) -> std::io::Result<SecurityOutcome> {
    let chosen = match version {
        NegotiatedVersion::V3_3 => read_security_type_3_3(instream, credentials).await?,
        _ => select_from_list(instream, outstream, credentials).await?,
    };

    let (scheme, tight) = if chosen == u32::from(SECURITY_TYPE_TIGHT) {
        setup_tunneling(instream, outstream).await?;
        (negotiate_tight_auth(instream, outstream).await?, true)
    } else {
        let scheme = match chosen {
            c if c == u32::from(SECURITY_TYPE_NONE) => AuthScheme::None,
            c if c == u32::from(SECURITY_TYPE_VNC_AUTH) => AuthScheme::Vnc,
            c if c == u32::from(SECURITY_TYPE_ULTRA_MS_LOGON_II) || c == SECURITY_TYPE_ULTRA34 => {
                AuthScheme::MsLogon
            }
            other => {
                return Err(Error::new(
                    ErrorKind::PermissionDenied,
                    format!("unknown authentication type {other}"),
                ))
            }
        };
        (scheme, false)
    };
    tracing::debug!("security type {} -> {:?} (tight: {})", chosen, scheme, tight);

    match scheme {
        AuthScheme::None => {
            if version >= NegotiatedVersion::V3_8 {
                read_security_result(instream, version).await?;
            }
        }
        AuthScheme::Vnc => {
            auth::authenticate_vnc(instream, outstream, credentials.password.as_deref()).await?;
            read_security_result(instream, version).await?;
        }
        AuthScheme::MsLogon => {
            auth::authenticate_ms_logon(
                instream,
                outstream,
                &credentials.username,
                credentials.password.as_deref().unwrap_or_default(),
            )
            .await?;
            read_security_result(instream, version).await?;
        }
    }

    Ok(SecurityOutcome { scheme, tight })
}

async fn select_from_list<R: AsyncRead + Unpin, W: AsyncWrite + Unpin>(
    instream: &mut RfbInStream<R>,
    outstream: &mut RfbOutStream<W>,
    credentials: &Credentials,
) -> std::io::Result<u32> {
    let count = instream.read_u8().await?;
    if count == 0 {
        let reason = instream.read_string(MAX_REASON_LENGTH).await?;
        return Err(Error::new(
            ErrorKind::ConnectionRefused,
            format!("server offered no security types: {reason}"),
        ));
    }

    let mut offered = vec![0u8; count as usize];
    instream.read_bytes(&mut offered).await?;
    tracing::debug!("server security types: {:?}", offered);

    let chosen = select_security_type(&offered, credentials.has_username()).ok_or_else(|| {
        Error::new(
            ErrorKind::PermissionDenied,
            format!("no supported security type offered (got {offered:?})"),
        )
    })?;

    outstream.write_u8(chosen);
    outstream.flush().await?;
    Ok(u32::from(chosen))
}

async fn read_security_type_3_3<R: AsyncRead + Unpin>(
    instream: &mut RfbInStream<R>,
    credentials: &Credentials,
) -> std::io::Result<u32> {
    match instream.read_u32().await? {
        0 => {
            let reason = instream.read_string(MAX_REASON_LENGTH).await?;
            Err(Error::new(
                ErrorKind::ConnectionRefused,
                format!("server rejected connection: {reason}"),
            ))
        }
        SECURITY_TYPE_ULTRA34 if !credentials.has_username() => Err(Error::new(
            ErrorKind::PermissionDenied,
            "server requires MS-Logon: username required",
        )),
        other => Ok(other),
    }
}

/// Read the SecurityResult word.
///
/// `0` is success; `1` is a failure (with a reason string on 3.8); `2` is
/// the "too many attempts" lockout some servers send.
pub async fn read_security_result<R: AsyncRead + Unpin>(
    instream: &mut RfbInStream<R>,
    version: NegotiatedVersion,
) -> std::io::Result<()> {
    match instream.read_u32().await? {
        0 => Ok(()),
        1 => {
            let reason = if version >= NegotiatedVersion::V3_8 {
                instream.read_string(MAX_REASON_LENGTH).await?
            } else {
                String::from("authentication failed")
            };
            Err(Error::new(
                ErrorKind::PermissionDenied,
                format!("authentication failed: {reason}"),
            ))
        }
        2 => Err(Error::new(
            ErrorKind::PermissionDenied,
            "authentication failed: too many attempts",
        )),
        other => Err(Error::new(
            ErrorKind::InvalidData,
            format!("invalid security result value: {other}"),
        )),
    }
}

async fn skip_capabilities<R: AsyncRead + Unpin>(
    instream: &mut RfbInStream<R>,
    count: usize,
) -> std::io::Result<()> {
    instream.skip(count * TIGHT_CAPABILITY_SIZE).await
}

/// Tight tunnelling offer: read the list (if any) and decline tunnelling.
async fn setup_tunneling<R: AsyncRead + Unpin, W: AsyncWrite + Unpin>(
    instream: &mut RfbInStream<R>,
    outstream: &mut RfbOutStream<W>,
) -> std::io::Result<()> {
    let tunnels = instream.read_u32().await? as usize;
    if tunnels > 0 {
        skip_capabilities(instream, tunnels).await?;
        outstream.write_u32(0);
        outstream.flush().await?;
    }
    Ok(())
}

/// Tight authentication choice: the first None or VNC capability wins.
async fn negotiate_tight_auth<R: AsyncRead + Unpin, W: AsyncWrite + Unpin>(
    instream: &mut RfbInStream<R>,
    outstream: &mut RfbOutStream<W>,
) -> std::io::Result<AuthScheme> {
    let count = instream.read_u32().await?;
    if count == 0 {
        return Ok(AuthScheme::None);
    }

    let mut chosen = None;
    for _ in 0..count {
        let code = instream.read_u32().await?;
        instream.skip(TIGHT_CAPABILITY_SIZE - 4).await?;
        if chosen.is_none()
            && (code == u32::from(SECURITY_TYPE_NONE) || code == u32::from(SECURITY_TYPE_VNC_AUTH))
        {
            chosen = Some(code);
        }
    }

    let code = chosen.ok_or_else(|| {
        Error::new(
            ErrorKind::PermissionDenied,
            "no suitable Tight authentication scheme offered",
        )
    })?;
    outstream.write_u32(code);
    outstream.flush().await?;

    Ok(if code == u32::from(SECURITY_TYPE_NONE) {
        AuthScheme::None
    } else {
        AuthScheme::Vnc
    })
}

/// Send ClientInit message to the server.
pub async fn send_client_init<W: AsyncWrite + Unpin>(
    outstream: &mut RfbOutStream<W>,
    shared: bool,
) -> std::io::Result<()> {
    messages::ClientInit { shared }.write_to(outstream);
    outstream.flush().await
}

/// Receive ServerInit, plus the Tight interaction capabilities when `tight`.
pub async fn recv_server_init<R: AsyncRead + Unpin>(
    instream: &mut RfbInStream<R>,
    tight: bool,
) -> std::io::Result<ServerInit> {
    let init = ServerInit::read_from(instream).await?;
    if tight {
        let server_msgs = instream.read_u16().await? as usize;
        let client_msgs = instream.read_u16().await? as usize;
        let encodings = instream.read_u16().await? as usize;
        instream.skip(2).await?;
        skip_capabilities(instream, server_msgs + client_msgs + encodings).await?;
    }
    Ok(init)
}
