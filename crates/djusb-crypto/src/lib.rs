//! djusb-crypto: streaming encryption for djusb artifacts
//!
//! Wire format (no header, no trailer):
//! ```text
//! frame := [4 bytes: ciphertext length, u32 LE][ciphertext || 16-byte GCM tag]
//! stream := frame*
//! ```
//!
//! Every frame is sealed with AES-256-GCM under
//! `nonce = nonce_base[0..4] || chunk_counter (u64 LE)`, the counter starting
//! at zero for each stream. The 96-bit nonce base is random per controller
//! file and stored there; the key is SHA-256 of the file passphrase.

pub mod error;
pub mod kdf;
pub mod nonce;
pub mod stream;

pub use error::CodecError;
pub use kdf::{derive_stream_key, StreamKey};
pub use nonce::{chunk_nonce, NonceBase};
pub use stream::{ChunkCipher, ChunkReader, ChunkWriter};

/// Size of an AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of the little-endian frame length prefix
pub const LEN_PREFIX_SIZE: usize = 4;
