//! Stream endpoints and the decorators stages wrap around them.
//!
//! A stage replaces the context's source or sink with a wrapper that owns the
//! previous endpoint. Closing the outermost endpoint closes the whole chain,
//! innermost last.

use djusb_crypto::{ChunkReader, ChunkWriter};
use sha2::{Digest, Sha256};
use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub trait Source: Read {
    /// Release this endpoint and everything it wraps.
    fn close(self: Box<Self>) -> io::Result<()>;
}

pub trait Sink: Write {
    /// Flush pending output, then release this endpoint and everything it
    /// wraps.
    fn close(self: Box<Self>) -> io::Result<()>;
}

pub type BoxSource = Box<dyn Source>;
pub type BoxSink = Box<dyn Sink>;

// ── Files and devices ──────────────────────────────────────────────────────

pub struct FileSource {
    file: File,
}

impl FileSource {
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self {
            file: File::open(path)?,
        })
    }
}

impl Read for FileSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Source for FileSource {
    fn close(self: Box<Self>) -> io::Result<()> {
        Ok(())
    }
}

pub struct FileSink {
    file: File,
    path: PathBuf,
}

impl FileSink {
    /// Open `path` for writing, creating it if needed. `truncate` is off for
    /// raw devices, which must be overwritten in place.
    pub fn create(path: &Path, truncate: bool) -> io::Result<Self> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(truncate);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        Ok(Self {
            file: options.open(path)?,
            path: path.to_path_buf(),
        })
    }
}

impl Write for FileSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Sink for FileSink {
    fn close(mut self: Box<Self>) -> io::Result<()> {
        self.file.flush()?;
        match self.file.sync_all() {
            // Character devices such as /dev/null reject fsync.
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {
                tracing::debug!(path = %self.path.display(), "sink does not support fsync");
                Ok(())
            }
            other => other,
        }
    }
}

// ── Integrity tap ──────────────────────────────────────────────────────────

/// Running SHA-256 shared between the tap and the integrity finalizer.
#[derive(Clone, Default)]
pub struct DigestAccumulator(Rc<RefCell<Sha256>>);

impl DigestAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, data: &[u8]) {
        self.0.borrow_mut().update(data);
    }

    /// Lowercase hex digest of everything fed so far. Does not reset.
    pub fn finalize_hex(&self) -> String {
        hex::encode(self.0.borrow().clone().finalize())
    }
}

impl std::fmt::Debug for DigestAccumulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigestAccumulator").finish_non_exhaustive()
    }
}

/// Sink wrapper hashing exactly the bytes the inner sink accepted.
pub struct TapSink {
    inner: BoxSink,
    digest: DigestAccumulator,
}

impl TapSink {
    pub fn new(inner: BoxSink, digest: DigestAccumulator) -> Self {
        Self { inner, digest }
    }
}

impl Write for TapSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.digest.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl Sink for TapSink {
    fn close(self: Box<Self>) -> io::Result<()> {
        self.inner.close()
    }
}

/// Source wrapper hashing every byte handed upward.
pub struct TapSource {
    inner: BoxSource,
    digest: DigestAccumulator,
}

impl TapSource {
    pub fn new(inner: BoxSource, digest: DigestAccumulator) -> Self {
        Self { inner, digest }
    }
}

impl Read for TapSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.digest.update(&buf[..n]);
        Ok(n)
    }
}

impl Source for TapSource {
    fn close(self: Box<Self>) -> io::Result<()> {
        self.inner.close()
    }
}

// ── Chunk codec ────────────────────────────────────────────────────────────

impl Sink for ChunkWriter<BoxSink> {
    fn close(self: Box<Self>) -> io::Result<()> {
        let mut writer = *self;
        writer.flush()?;
        tracing::debug!(frames = writer.frames_written(), "chunk encoder closed");
        writer.into_inner().close()
    }
}

impl Source for ChunkReader<BoxSource> {
    fn close(self: Box<Self>) -> io::Result<()> {
        tracing::debug!(frames = self.frames_read(), "chunk decoder closed");
        self.into_inner().close()
    }
}
