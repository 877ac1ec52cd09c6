//! Codec error kinds.
//!
//! The chunk reader and writer speak `std::io`, so these errors travel inside
//! an `io::Error`. Callers that need the kind back use
//! [`CodecError::from_io`].

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    /// Stream ended inside a 4-byte length prefix
    #[error("truncated frame length prefix: got {got} of 4 bytes")]
    TruncatedLength { got: usize },

    /// Stream ended before the declared ciphertext length was read
    #[error("truncated frame {index}: expected {expected} ciphertext bytes, got {got}")]
    TruncatedFrame {
        index: u64,
        expected: usize,
        got: usize,
    },

    /// Sealed chunk does not fit the 32-bit length prefix
    #[error("chunk too large: sealed length {len} exceeds u32::MAX")]
    ChunkTooLarge { len: usize },

    /// Frame is shorter than a GCM tag and cannot be authentic
    #[error("frame {index} too short: {len} bytes (minimum {min})")]
    FrameTooShort { index: u64, len: usize, min: usize },

    /// AEAD tag verification failed: wrong key, tampering, or corruption
    #[error("authentication failed for frame {index}: wrong passphrase or tampered data")]
    Authentication { index: u64 },

    /// Key material has the wrong length for AES-256
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// Chunk counter exhausted the 64-bit nonce space
    #[error("chunk counter exhausted")]
    CounterExhausted,

    /// AEAD seal failed (length limits of the primitive)
    #[error("seal failed for frame {index}")]
    Seal { index: u64 },
}

impl CodecError {
    /// `true` for errors caused by malformed framing rather than failed
    /// authentication.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            CodecError::TruncatedLength { .. }
                | CodecError::TruncatedFrame { .. }
                | CodecError::ChunkTooLarge { .. }
                | CodecError::FrameTooShort { .. }
        )
    }

    /// Recover a codec error carried inside an `io::Error`.
    pub fn from_io(err: &io::Error) -> Option<&CodecError> {
        err.get_ref().and_then(|inner| inner.downcast_ref::<CodecError>())
    }

    /// Take ownership of a codec error carried inside an `io::Error`,
    /// handing the error back untouched when it carries something else.
    pub fn try_from_io(err: io::Error) -> Result<CodecError, io::Error> {
        if Self::from_io(&err).is_none() {
            return Err(err);
        }
        let kind = err.kind();
        match err.into_inner().map(|inner| inner.downcast::<CodecError>()) {
            Some(Ok(codec)) => Ok(*codec),
            Some(Err(other)) => Err(io::Error::new(kind, other)),
            None => Err(io::Error::from(kind)),
        }
    }

    pub(crate) fn into_io(self) -> io::Error {
        let kind = match &self {
            CodecError::TruncatedLength { .. } | CodecError::TruncatedFrame { .. } => {
                io::ErrorKind::UnexpectedEof
            }
            CodecError::ChunkTooLarge { .. } => io::ErrorKind::InvalidInput,
            _ => io::ErrorKind::InvalidData,
        };
        io::Error::new(kind, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_io_error() {
        let err = CodecError::Authentication { index: 7 }.into_io();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        let back = CodecError::from_io(&err).expect("codec payload");
        assert!(matches!(back, CodecError::Authentication { index: 7 }));
        assert!(!back.is_framing());
    }

    #[test]
    fn plain_io_error_has_no_codec_payload() {
        let err = io::Error::new(io::ErrorKind::Other, "disk gone");
        assert!(CodecError::from_io(&err).is_none());

        let back = CodecError::try_from_io(err).unwrap_err();
        assert_eq!(back.to_string(), "disk gone");
    }

    #[test]
    fn try_from_io_takes_ownership() {
        let err = CodecError::TruncatedFrame {
            index: 3,
            expected: 40,
            got: 12,
        }
        .into_io();
        let codec = CodecError::try_from_io(err).unwrap();
        assert!(matches!(codec, CodecError::TruncatedFrame { index: 3, .. }));
    }

    #[test]
    fn truncation_maps_to_unexpected_eof() {
        let err = CodecError::TruncatedLength { got: 2 }.into_io();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert!(CodecError::from_io(&err).unwrap().is_framing());
    }
}
