//! Authentication schemes run after a security type has been chosen.
//!
//! - **VNC authentication** (security type 2): DES challenge/response keyed
//!   by the password.
//! - **MS-Logon II** (UltraVNC security type 113, and the 3.3-era
//!   `0xFFFFFFFA` variant): a 64-bit Diffie-Hellman exchange whose shared
//!   value keys DES-CBC encryption of a fixed-size username and password.
//!
//! Both schemes use the VNC flavour of DES keys, where every key byte has its
//! bit order reversed before use. Failures are reported as
//! [`std::io::ErrorKind::PermissionDenied`] when credentials are missing and
//! as [`std::io::ErrorKind::InvalidData`] when the server's parameters are
//! unusable.

use crate::io::{RfbInStream, RfbOutStream};
use des::cipher::generic_array::GenericArray;
use des::cipher::{BlockEncrypt, KeyInit};
use des::Des;
use num_bigint::BigUint;
use num_traits::ToPrimitive;
use rand::Rng;
use tokio::io::{AsyncRead, AsyncWrite};

/// Length of the VNC authentication challenge and response.
pub const CHALLENGE_SIZE: usize = 16;

/// Size of the encrypted username block in MS-Logon II.
pub const MS_LOGON_USER_SIZE: usize = 256;

/// Size of the encrypted password block in MS-Logon II.
pub const MS_LOGON_PASSWORD_SIZE: usize = 64;

/// Build a VNC DES key: the first 8 password bytes, zero-padded, each byte
/// bit-reversed.
pub fn vnc_des_key(password: &[u8]) -> [u8; 8] {
    let mut key = [0u8; 8];
    let len = password.len().min(8);
    key[..len].copy_from_slice(&password[..len]);
    for b in &mut key {
        *b = b.reverse_bits();
    }
    key
}

fn des_encrypt_block(cipher: &Des, block: &mut [u8]) {
    cipher.encrypt_block(GenericArray::from_mut_slice(block));
}

/// Encrypt a VNC authentication challenge with `password`.
pub fn vnc_auth_response(challenge: &[u8; CHALLENGE_SIZE], password: &str) -> [u8; CHALLENGE_SIZE] {
    let key = vnc_des_key(password.as_bytes());
    let cipher = Des::new(GenericArray::from_slice(&key));
    let mut response = *challenge;
    for block in response.chunks_exact_mut(8) {
        des_encrypt_block(&cipher, block);
    }
    response
}

/// DES-CBC encrypt `data` in place. `data.len()` must be a multiple of 8.
///
/// `key` is used raw as the IV and bit-reversed as the DES key, which is
/// how UltraVNC derives both from the shared Diffie-Hellman value.
pub fn ms_logon_encrypt(key: &[u8; 8], data: &mut [u8]) {
    let cipher = Des::new(GenericArray::from_slice(&vnc_des_key(key)));
    let mut chain = *key;
    for block in data.chunks_exact_mut(8) {
        for (b, c) in block.iter_mut().zip(chain.iter()) {
            *b ^= c;
        }
        des_encrypt_block(&cipher, block);
        chain.copy_from_slice(block);
    }
}

/// Client side of the 64-bit Diffie-Hellman exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DhExchange {
    /// Public value sent to the server.
    pub public: u64,
    /// Shared secret, big-endian, used as DES key and IV.
    pub key: [u8; 8],
}

/// Compute the client's public value and the shared key for the server
/// parameters `generator`, `modulus` and `server_public`.
pub fn dh_exchange<G: Rng + ?Sized>(
    generator: u64,
    modulus: u64,
    server_public: u64,
    rng: &mut G,
) -> std::io::Result<DhExchange> {
    if modulus < 2 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("unusable Diffie-Hellman modulus {modulus}"),
        ));
    }
    let private = BigUint::from(rng.gen_range(1..modulus));
    let m = BigUint::from(modulus);

    let public = BigUint::from(generator).modpow(&private, &m);
    let shared = BigUint::from(server_public).modpow(&private, &m);

    // Both results are < modulus, so they always fit.
    let public = public.to_u64().unwrap_or_default();
    let shared = shared.to_u64().unwrap_or_default();

    Ok(DhExchange {
        public,
        key: shared.to_be_bytes(),
    })
}

/// Zero-padded, DES-CBC encrypted username and password blocks.
pub fn ms_logon_credentials(
    key: &[u8; 8],
    username: &str,
    password: &str,
) -> ([u8; MS_LOGON_USER_SIZE], [u8; MS_LOGON_PASSWORD_SIZE]) {
    let mut user = [0u8; MS_LOGON_USER_SIZE];
    let mut passwd = [0u8; MS_LOGON_PASSWORD_SIZE];

    // Leave room for the terminating NUL the server expects.
    let u = username.as_bytes();
    let ulen = u.len().min(MS_LOGON_USER_SIZE - 1);
    user[..ulen].copy_from_slice(&u[..ulen]);
    let p = password.as_bytes();
    let plen = p.len().min(MS_LOGON_PASSWORD_SIZE - 1);
    passwd[..plen].copy_from_slice(&p[..plen]);

    ms_logon_encrypt(key, &mut user);
    ms_logon_encrypt(key, &mut passwd);
    (user, passwd)
}

/// Run VNC authentication: read the challenge, write the response.
///
/// The SecurityResult that follows is read by the caller.
pub async fn authenticate_vnc<R: AsyncRead + Unpin, W: AsyncWrite + Unpin>(
    instream: &mut RfbInStream<R>,
    outstream: &mut RfbOutStream<W>,
    password: Option<&str>,
) -> std::io::Result<()> {
    let password = password.ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "server requires a password",
        )
    })?;

    let mut challenge = [0u8; CHALLENGE_SIZE];
    instream.read_bytes(&mut challenge).await?;
    outstream.write_bytes(&vnc_auth_response(&challenge, password));
    outstream.flush().await
}

/// Run MS-Logon II authentication.
///
/// # Wire Format
///
/// ```text
/// S->C  generator u64, modulus u64, server public u64
/// C->S  client public u64
/// C->S  username 256 bytes, password 64 bytes (both DES-CBC encrypted)
/// ```
pub async fn authenticate_ms_logon<R: AsyncRead + Unpin, W: AsyncWrite + Unpin>(
    instream: &mut RfbInStream<R>,
    outstream: &mut RfbOutStream<W>,
    username: &str,
    password: &str,
) -> std::io::Result<()> {
    let generator = instream.read_u64().await?;
    let modulus = instream.read_u64().await?;
    let server_public = instream.read_u64().await?;

    let exchange = dh_exchange(generator, modulus, server_public, &mut rand::thread_rng())?;
    let (user, passwd) = ms_logon_credentials(&exchange.key, username, password);

    outstream.write_u64(exchange.public);
    outstream.write_bytes(&user);
    outstream.write_bytes(&passwd);
    outstream.flush().await
}
