//! Per-stream nonce base and per-chunk nonce derivation

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::{rngs::OsRng, RngCore};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::NONCE_SIZE;

#[derive(Debug, Error)]
pub enum NonceError {
    #[error("nonce base is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("nonce base must be {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("nonce base is all zeros")]
    AllZero,

    #[error("OS random number generator failed: {0}")]
    Random(#[from] rand::Error),
}

/// Random 96-bit value generated once per controller file.
///
/// Combined with the chunk counter by [`chunk_nonce`]; a (key, base) pair must
/// never encrypt two different streams.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct NonceBase([u8; NONCE_SIZE]);

impl NonceBase {
    /// Draw a fresh base from the OS RNG. RNG failure is an error, never a
    /// zero base.
    pub fn generate() -> Result<Self, NonceError> {
        let mut bytes = [0u8; NONCE_SIZE];
        OsRng.try_fill_bytes(&mut bytes)?;
        Self::from_bytes(bytes)
    }

    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Result<Self, NonceError> {
        if bytes.iter().all(|&b| b == 0) {
            return Err(NonceError::AllZero);
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }

    /// Standard base64 with padding (the controller file representation)
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn from_base64(text: &str) -> Result<Self, NonceError> {
        let raw = STANDARD.decode(text)?;
        let bytes: [u8; NONCE_SIZE] = raw.as_slice().try_into().map_err(|_| NonceError::Length {
            expected: NONCE_SIZE,
            actual: raw.len(),
        })?;
        Self::from_bytes(bytes)
    }
}

impl std::fmt::Debug for NonceBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("NonceBase").field(&self.to_base64()).finish()
    }
}

impl Serialize for NonceBase {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for NonceBase {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        NonceBase::from_base64(&text).map_err(de::Error::custom)
    }
}

/// Nonce for chunk `counter`: the base with bytes 4..12 replaced by the
/// counter in little-endian.
#[inline]
pub fn chunk_nonce(base: &NonceBase, counter: u64) -> [u8; NONCE_SIZE] {
    let mut nonce = base.0;
    nonce[4..].copy_from_slice(&counter.to_le_bytes());
    nonce
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_random() {
        let a = NonceBase::generate().unwrap();
        let b = NonceBase::generate().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_base64_roundtrip() {
        let base = NonceBase::from_bytes([7u8; NONCE_SIZE]).unwrap();
        let text = base.to_base64();
        assert_eq!(text.len(), 16);
        assert_eq!(NonceBase::from_base64(&text).unwrap(), base);
    }

    #[test]
    fn test_from_base64_rejects_wrong_length() {
        let text = STANDARD.encode([1u8; 16]);
        assert!(matches!(
            NonceBase::from_base64(&text),
            Err(NonceError::Length { expected: 12, actual: 16 })
        ));
    }

    #[test]
    fn test_from_base64_rejects_garbage_and_zero() {
        assert!(matches!(
            NonceBase::from_base64("not base64!"),
            Err(NonceError::Encoding(_))
        ));
        let zero = STANDARD.encode([0u8; NONCE_SIZE]);
        assert!(matches!(NonceBase::from_base64(&zero), Err(NonceError::AllZero)));
    }

    #[test]
    fn test_serde_uses_base64_text() {
        let base = NonceBase::from_bytes([9u8; NONCE_SIZE]).unwrap();
        let json = serde_json::to_string(&base).unwrap();
        assert_eq!(json, format!("\"{}\"", base.to_base64()));
        let back: NonceBase = serde_json::from_str(&json).unwrap();
        assert_eq!(back, base);
        assert!(serde_json::from_str::<NonceBase>("\"AAAA\"").is_err());
        assert!(serde_json::from_str::<NonceBase>("12").is_err());
    }

    #[test]
    fn test_chunk_nonce_layout() {
        let base = NonceBase::from_bytes([0xAA; NONCE_SIZE]).unwrap();

        let n0 = chunk_nonce(&base, 0);
        assert_eq!(&n0[..4], &[0xAA; 4]);
        assert_eq!(&n0[4..], &[0u8; 8]);

        let n = chunk_nonce(&base, 0x0102);
        assert_eq!(&n[..4], &[0xAA; 4]);
        assert_eq!(&n[4..], &[0x02, 0x01, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_chunk_nonces_distinct() {
        let base = NonceBase::generate().unwrap();
        assert_ne!(chunk_nonce(&base, 1), chunk_nonce(&base, 2));
    }
}
