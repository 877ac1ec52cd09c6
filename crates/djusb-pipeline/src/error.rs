//! Pipeline error kinds.
//!
//! Codec failures surface from the wrapped endpoints as `io::Error`s carrying
//! a [`CodecError`]; the `From<io::Error>` impl recovers them so callers can
//! tell framing damage from a failed authentication.

use djusb_core::StageName;
use djusb_crypto::CodecError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing or contradictory run parameters
    #[error("config error: {0}")]
    Config(String),

    /// Controller file exists but cannot be parsed into a decision record
    #[error("malformed controller {}: {reason}", .path.display())]
    Decode { path: PathBuf, reason: String },

    /// Truncated length prefix, truncated ciphertext, or oversized chunk
    #[error("framing error: {0}")]
    Framing(CodecError),

    /// AEAD tag verification failed
    #[error("{0}")]
    Authentication(CodecError),

    #[error("integrity mismatch: expected sha256 {expected}, computed {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    /// Cipher construction or sealing failed
    #[error("cipher error: {0}")]
    Crypto(CodecError),

    #[error("random number generator failed: {0}")]
    Random(String),

    #[error("compression error: {0}")]
    Compression(String),

    #[error("device error: {0}")]
    Device(String),

    /// A stage needed an endpoint that no earlier stage opened
    #[error("{0} endpoint is not open")]
    MissingEndpoint(&'static str),

    #[error("I/O error: {0}")]
    Io(io::Error),

    #[error("step {stage}: {source}")]
    Stage {
        stage: StageName,
        source: Box<PipelineError>,
    },

    #[error("finalizer {name}: {source}")]
    Finalizer {
        name: String,
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    pub fn stage(stage: StageName, source: PipelineError) -> Self {
        PipelineError::Stage {
            stage,
            source: Box::new(source),
        }
    }

    pub fn finalizer(name: impl Into<String>, source: PipelineError) -> Self {
        PipelineError::Finalizer {
            name: name.into(),
            source: Box::new(source),
        }
    }

    /// The underlying error with any stage/finalizer wrapping removed.
    pub fn root(&self) -> &PipelineError {
        match self {
            PipelineError::Stage { source, .. } | PipelineError::Finalizer { source, .. } => {
                source.root()
            }
            other => other,
        }
    }
}

impl From<CodecError> for PipelineError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Authentication { .. } => PipelineError::Authentication(err),
            _ if err.is_framing() => PipelineError::Framing(err),
            _ => PipelineError::Crypto(err),
        }
    }
}

impl From<io::Error> for PipelineError {
    fn from(err: io::Error) -> Self {
        match CodecError::try_from_io(err) {
            Ok(codec) => codec.into(),
            Err(err) => PipelineError::Io(err),
        }
    }
}
