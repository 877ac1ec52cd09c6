//! Key derivation: file passphrase → stream key
//!
//! The key is SHA-256 of the passphrase bytes. Nothing about the passphrase is
//! stored; a wrong passphrase only shows up as an authentication failure on
//! the first frame.

use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::KEY_SIZE;

/// A 256-bit AES key for one stream.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct StreamKey {
    bytes: [u8; KEY_SIZE],
}

impl StreamKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for StreamKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for StreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derive the stream key from a passphrase (one-way, deterministic).
pub fn derive_stream_key(passphrase: &SecretString) -> StreamKey {
    let mut digest = Sha256::digest(passphrase.expose_secret().as_bytes());
    let mut bytes = [0u8; KEY_SIZE];
    bytes.copy_from_slice(&digest);
    digest.as_mut_slice().zeroize();
    StreamKey::from_bytes(bytes)
}
