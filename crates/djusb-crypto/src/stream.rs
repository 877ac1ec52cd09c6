//! Chunked AES-256-GCM stream codec
//!
//! [`ChunkWriter`] turns every `write` call into exactly one frame;
//! [`ChunkReader`] reverses it and serves plaintext in whatever slice sizes
//! the caller asks for. Frame layout and nonce schedule are described in the
//! crate docs.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use std::io::{self, Read, Write};

use crate::error::CodecError;
use crate::nonce::{chunk_nonce, NonceBase};
use crate::{KEY_SIZE, LEN_PREFIX_SIZE, TAG_SIZE};

/// AEAD primitive bound to one nonce base.
#[derive(Clone)]
pub struct ChunkCipher {
    aead: Aes256Gcm,
    base: NonceBase,
}

impl ChunkCipher {
    pub fn new(key: &[u8], base: NonceBase) -> Result<Self, CodecError> {
        let aead = Aes256Gcm::new_from_slice(key).map_err(|_| CodecError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: key.len(),
        })?;
        Ok(Self { aead, base })
    }

    pub fn nonce_base(&self) -> &NonceBase {
        &self.base
    }

    /// Seal one chunk under the nonce for `index`. Returns `ciphertext || tag`.
    pub fn seal(&self, index: u64, plaintext: &[u8]) -> Result<Vec<u8>, CodecError> {
        let nonce = chunk_nonce(&self.base, index);
        self.aead
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CodecError::Seal { index })
    }

    /// Open and verify one chunk sealed under the nonce for `index`.
    pub fn open(&self, index: u64, sealed: &[u8]) -> Result<Vec<u8>, CodecError> {
        if sealed.len() < TAG_SIZE {
            return Err(CodecError::FrameTooShort {
                index,
                len: sealed.len(),
                min: TAG_SIZE,
            });
        }
        let nonce = chunk_nonce(&self.base, index);
        self.aead
            .decrypt(Nonce::from_slice(&nonce), sealed)
            .map_err(|_| CodecError::Authentication { index })
    }
}

impl std::fmt::Debug for ChunkCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkCipher")
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

/// Length prefix for a sealed chunk, or `ChunkTooLarge` if it needs more than
/// 32 bits.
pub fn frame_len(sealed_len: usize) -> Result<u32, CodecError> {
    u32::try_from(sealed_len).map_err(|_| CodecError::ChunkTooLarge { len: sealed_len })
}

/// Encrypting writer: one `write` call, one frame.
pub struct ChunkWriter<W> {
    inner: W,
    cipher: ChunkCipher,
    /// Index of the next frame; `None` once the counter space is used up
    next: Option<u64>,
}

impl<W: Write> ChunkWriter<W> {
    pub fn new(inner: W, cipher: ChunkCipher) -> Self {
        Self {
            inner,
            cipher,
            next: Some(0),
        }
    }

    /// Number of frames emitted so far
    pub fn frames_written(&self) -> u64 {
        self.next.unwrap_or(u64::MAX)
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Unwrap the underlying sink. No trailer is written: the stream simply
    /// ends after the last frame.
    pub fn into_inner(self) -> W {
        self.inner
    }

    fn write_frame(&mut self, plaintext: &[u8]) -> io::Result<()> {
        let index = self.next.ok_or_else(|| CodecError::CounterExhausted.into_io())?;
        let sealed = self
            .cipher
            .seal(index, plaintext)
            .map_err(CodecError::into_io)?;
        let len = frame_len(sealed.len()).map_err(CodecError::into_io)?;

        self.inner.write_all(&len.to_le_bytes())?;
        self.inner.write_all(&sealed)?;

        self.next = index.checked_add(1);
        Ok(())
    }
}

impl<W: Write> Write for ChunkWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.write_frame(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Decrypting reader over a frame stream.
pub struct ChunkReader<R> {
    inner: R,
    cipher: ChunkCipher,
    next: u64,
    plain: Vec<u8>,
    pos: usize,
    done: bool,
}

impl<R: Read> ChunkReader<R> {
    pub fn new(inner: R, cipher: ChunkCipher) -> Self {
        Self {
            inner,
            cipher,
            next: 0,
            plain: Vec::new(),
            pos: 0,
            done: false,
        }
    }

    /// Number of frames opened so far
    pub fn frames_read(&self) -> u64 {
        self.next
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Read the 4-byte prefix. `Ok(None)` only when the stream ends exactly on
    /// a frame boundary.
    fn read_len(&mut self) -> io::Result<Option<u32>> {
        let mut prefix = [0u8; LEN_PREFIX_SIZE];
        let mut got = 0;
        while got < LEN_PREFIX_SIZE {
            match self.inner.read(&mut prefix[got..]) {
                Ok(0) => break,
                Ok(n) => got += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        match got {
            0 => Ok(None),
            LEN_PREFIX_SIZE => Ok(Some(u32::from_le_bytes(prefix))),
            _ => Err(CodecError::TruncatedLength { got }.into_io()),
        }
    }

    fn next_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        let Some(len) = self.read_len()? else {
            return Ok(None);
        };
        let expected = len as usize;
        let index = self.next;

        // Grow with the data actually present so a corrupted length cannot
        // force a 4 GiB allocation up front.
        let mut sealed = Vec::new();
        (&mut self.inner)
            .take(u64::from(len))
            .read_to_end(&mut sealed)?;
        if sealed.len() != expected {
            return Err(CodecError::TruncatedFrame {
                index,
                expected,
                got: sealed.len(),
            }
            .into_io());
        }

        let plain = self
            .cipher
            .open(index, &sealed)
            .map_err(CodecError::into_io)?;
        self.next = index
            .checked_add(1)
            .ok_or_else(|| CodecError::CounterExhausted.into_io())?;
        tracing::trace!(frame = index, bytes = plain.len(), "opened frame");
        Ok(Some(plain))
    }
}

impl<R: Read> Read for ChunkReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        while self.pos == self.plain.len() {
            if self.done {
                return Ok(0);
            }
            match self.next_frame()? {
                Some(plain) => {
                    self.plain = plain;
                    self.pos = 0;
                }
                None => {
                    self.done = true;
                    return Ok(0);
                }
            }
        }
        let n = out.len().min(self.plain.len() - self.pos);
        out[..n].copy_from_slice(&self.plain[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cipher() -> ChunkCipher {
        let base = NonceBase::from_bytes([0x5Au8; 12]).unwrap();
        ChunkCipher::new(&[42u8; KEY_SIZE], base).unwrap()
    }

    /// Encrypt `data`, one write per `chunk`-sized slice.
    fn encrypt(data: &[u8], chunk: usize) -> Vec<u8> {
        let mut w = ChunkWriter::new(Vec::new(), cipher());
        for piece in data.chunks(chunk.max(1)) {
            w.write_all(piece).unwrap();
        }
        w.into_inner()
    }

    fn decrypt(wire: &[u8]) -> io::Result<Vec<u8>> {
        let mut r = ChunkReader::new(wire, cipher());
        let mut out = Vec::new();
        r.read_to_end(&mut out)?;
        Ok(out)
    }

    fn codec_err(err: &io::Error) -> &CodecError {
        CodecError::from_io(err).expect("codec error payload")
    }

    #[test]
    fn test_empty_stream_has_no_frames() {
        let wire = encrypt(b"", 16);
        assert!(wire.is_empty());
        assert_eq!(decrypt(&wire).unwrap(), b"");
    }

    #[test]
    fn test_one_write_is_one_frame() {
        let mut w = ChunkWriter::new(Vec::new(), cipher());
        w.write_all(b"hello").unwrap();
        w.write_all(b" world").unwrap();
        assert_eq!(w.frames_written(), 2);

        let wire = w.into_inner();
        let first = u32::from_le_bytes(wire[..4].try_into().unwrap()) as usize;
        assert_eq!(first, 5 + TAG_SIZE);
        assert_eq!(wire.len(), 2 * LEN_PREFIX_SIZE + 11 + 2 * TAG_SIZE);
    }

    #[test]
    fn test_empty_write_emits_nothing() {
        let mut w = ChunkWriter::new(Vec::new(), cipher());
        assert_eq!(w.write(b"").unwrap(), 0);
        assert_eq!(w.frames_written(), 0);
        assert!(w.into_inner().is_empty());
    }

    #[test]
    fn test_small_reads_across_frames() {
        let data: Vec<u8> = (0u8..=255).cycle().take(10_000).collect();
        let wire = encrypt(&data, 777);

        let mut r = ChunkReader::new(wire.as_slice(), cipher());
        let mut out = Vec::new();
        let mut buf = [0u8; 13];
        loop {
            let n = r.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, data);
        assert_eq!(r.frames_read(), 13);
    }

    #[test]
    fn test_same_plaintext_chunks_get_distinct_ciphertext() {
        let wire = encrypt(b"AAAAAAAAAAAAAAAA", 8);
        let frame = LEN_PREFIX_SIZE + 8 + TAG_SIZE;
        assert_ne!(&wire[4..frame], &wire[frame + 4..]);
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let wire = encrypt(b"secret data", 64);
        let other = ChunkCipher::new(&[7u8; KEY_SIZE], *cipher().nonce_base()).unwrap();
        let mut r = ChunkReader::new(wire.as_slice(), other);
        let err = r.read_to_end(&mut Vec::new()).unwrap_err();
        assert!(matches!(codec_err(&err), CodecError::Authentication { index: 0 }));
    }

    #[test]
    fn test_reordered_frames_fail_authentication() {
        let wire = encrypt(b"aaaabbbb", 4);
        let frame = LEN_PREFIX_SIZE + 4 + TAG_SIZE;
        let mut swapped = wire[frame..].to_vec();
        swapped.extend_from_slice(&wire[..frame]);

        let err = decrypt(&swapped).unwrap_err();
        assert!(matches!(codec_err(&err), CodecError::Authentication { index: 0 }));
    }

    #[test]
    fn test_truncated_length_prefix() {
        let mut wire = encrypt(b"payload", 64);
        wire.extend_from_slice(&[1, 0]);
        let err = decrypt(&wire).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert!(matches!(codec_err(&err), CodecError::TruncatedLength { got: 2 }));
    }

    #[test]
    fn test_truncated_ciphertext() {
        let wire = encrypt(b"payload that will be cut", 64);
        let cut = &wire[..wire.len() - 3];
        let err = decrypt(cut).unwrap_err();
        let codec = codec_err(&err);
        assert!(codec.is_framing());
        assert!(matches!(
            codec,
            CodecError::TruncatedFrame { index: 0, got, expected } if *got + 3 == *expected
        ));
    }

    #[test]
    fn test_frame_shorter_than_tag() {
        let mut wire = 3u32.to_le_bytes().to_vec();
        wire.extend_from_slice(&[1, 2, 3]);
        let err = decrypt(&wire).unwrap_err();
        assert!(matches!(codec_err(&err), CodecError::FrameTooShort { .. }));
    }

    #[test]
    fn test_frame_len_limit() {
        assert_eq!(frame_len(16).unwrap(), 16);
        assert_eq!(frame_len(u32::MAX as usize).unwrap(), u32::MAX);
        #[cfg(target_pointer_width = "64")]
        assert!(matches!(
            frame_len(u32::MAX as usize + 1),
            Err(CodecError::ChunkTooLarge { .. })
        ));
    }

    #[test]
    fn test_invalid_key_length() {
        let base = NonceBase::from_bytes([1u8; 12]).unwrap();
        assert!(matches!(
            ChunkCipher::new(&[0u8; 16], base),
            Err(CodecError::InvalidKeyLength { expected: 32, actual: 16 })
        ));
    }

    proptest! {
        #[test]
        fn prop_roundtrip(
            data in proptest::collection::vec(any::<u8>(), 0..=16384),
            chunk in 1usize..=4096,
        ) {
            let wire = encrypt(&data, chunk);
            prop_assert_eq!(decrypt(&wire).unwrap(), data);
        }

        #[test]
        fn prop_ciphertext_bit_flip_fails_authentication(
            data in proptest::collection::vec(any::<u8>(), 1..=2048),
            chunk in 1usize..=512,
            pick in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let mut wire = encrypt(&data, chunk);

            // Collect the offsets of sealed bytes (everything but prefixes).
            let mut sealed = Vec::new();
            let mut off = 0;
            while off < wire.len() {
                let len = u32::from_le_bytes(wire[off..off + 4].try_into().unwrap()) as usize;
                sealed.extend(off + 4..off + 4 + len);
                off += 4 + len;
            }
            let at = sealed[pick.index(sealed.len())];
            wire[at] ^= 1 << bit;

            let err = decrypt(&wire).unwrap_err();
            prop_assert!(
                matches!(codec_err(&err), CodecError::Authentication { .. }),
                "expected authentication error, got {err}"
            );
        }

        #[test]
        fn prop_any_bit_flip_is_detected(
            data in proptest::collection::vec(any::<u8>(), 1..=2048),
            chunk in 1usize..=512,
            pick in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let mut wire = encrypt(&data, chunk);
            let at = pick.index(wire.len());
            wire[at] ^= 1 << bit;

            // A flipped length prefix may surface as a framing error instead;
            // either way the reader must never hand back plaintext silently.
            match decrypt(&wire) {
                Ok(out) => prop_assert!(false, "corruption went undetected ({} bytes)", out.len()),
                Err(err) => prop_assert!(CodecError::from_io(&err).is_some()),
            }
        }
    }
}
