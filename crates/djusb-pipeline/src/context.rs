//! Per-run state shared by every stage.

use djusb_core::config::{DjusbConfig, DEFAULT_COMPRESS_LEVEL, DEFAULT_COPY_BUFFER_BYTES};
use djusb_core::Mode;
use secrecy::SecretString;
use std::io;
use std::path::PathBuf;
use tracing::warn;

use crate::controller::{ControllerStore, DecisionRecord};
use crate::endpoint::{BoxSink, BoxSource, DigestAccumulator};
use crate::error::{PipelineError, PipelineResult};

/// Deferred action run once after every stage succeeded.
pub type Finalizer = Box<dyn FnOnce(&mut RunContext) -> PipelineResult<()>>;

/// Everything the caller decides before a run starts.
pub struct RunRequest {
    pub mode: Mode,
    pub source_path: PathBuf,
    pub dest_path: PathBuf,
    pub controller_path: PathBuf,
    pub passphrase: SecretString,
    /// Defaults consulted only when the controller lacks a decision
    pub seed: DecisionRecord,
    pub settings: RunSettings,
}

/// Tuning knobs taken from the config file.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub copy_buffer_bytes: usize,
    pub compress_level: i32,
    /// Unmount mounted partitions of a raw device before opening it
    pub unmount_devices: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            copy_buffer_bytes: DEFAULT_COPY_BUFFER_BYTES,
            compress_level: DEFAULT_COMPRESS_LEVEL,
            unmount_devices: true,
        }
    }
}

impl From<&DjusbConfig> for RunSettings {
    fn from(config: &DjusbConfig) -> Self {
        Self {
            copy_buffer_bytes: config.pipeline.copy_buffer_bytes,
            compress_level: config.pipeline.compress_level,
            unmount_devices: config.device.unmount,
        }
    }
}

pub struct RunContext {
    pub mode: Mode,
    pub source_path: PathBuf,
    pub dest_path: PathBuf,
    pub store: ControllerStore,
    /// The decision record; loaded by the bootstrap stage
    pub controller: DecisionRecord,
    pub seed: DecisionRecord,
    pub digest: DigestAccumulator,
    pub settings: RunSettings,
    /// Bytes moved by the copy stage
    pub bytes_copied: u64,
    passphrase: SecretString,
    source: Option<BoxSource>,
    sink: Option<BoxSink>,
    finalizers: Vec<(String, Finalizer)>,
}

impl RunContext {
    pub fn new(request: RunRequest) -> Self {
        Self {
            mode: request.mode,
            source_path: request.source_path,
            dest_path: request.dest_path,
            store: ControllerStore::new(request.controller_path),
            controller: DecisionRecord::default(),
            seed: request.seed,
            digest: DigestAccumulator::new(),
            settings: request.settings,
            bytes_copied: 0,
            passphrase: request.passphrase,
            source: None,
            sink: None,
            finalizers: Vec::new(),
        }
    }

    pub fn passphrase(&self) -> &SecretString {
        &self.passphrase
    }

    /// Install freshly opened endpoints. Anything already open is dropped.
    pub fn open_endpoints(&mut self, source: BoxSource, sink: BoxSink) {
        self.source = Some(source);
        self.sink = Some(sink);
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    pub fn take_source(&mut self) -> PipelineResult<BoxSource> {
        self.source
            .take()
            .ok_or(PipelineError::MissingEndpoint("source"))
    }

    pub fn take_sink(&mut self) -> PipelineResult<BoxSink> {
        self.sink.take().ok_or(PipelineError::MissingEndpoint("sink"))
    }

    /// Replace the source with a decorator built around it.
    pub fn wrap_source<F>(&mut self, wrap: F) -> PipelineResult<()>
    where
        F: FnOnce(BoxSource) -> PipelineResult<BoxSource>,
    {
        let inner = self.take_source()?;
        self.source = Some(wrap(inner)?);
        Ok(())
    }

    /// Replace the sink with a decorator built around it.
    pub fn wrap_sink<F>(&mut self, wrap: F) -> PipelineResult<()>
    where
        F: FnOnce(BoxSink) -> PipelineResult<BoxSink>,
    {
        let inner = self.take_sink()?;
        self.sink = Some(wrap(inner)?);
        Ok(())
    }

    /// Persist the whole decision record.
    pub fn commit(&self) -> PipelineResult<()> {
        self.store.save(&self.controller)
    }

    pub fn register_finalizer<F>(&mut self, name: impl Into<String>, finalizer: F)
    where
        F: FnOnce(&mut RunContext) -> PipelineResult<()> + 'static,
    {
        self.finalizers.push((name.into(), Box::new(finalizer)));
    }

    pub fn take_finalizers(&mut self) -> Vec<(String, Finalizer)> {
        std::mem::take(&mut self.finalizers)
    }

    /// Close whatever endpoints are still held, sink first. Every endpoint is
    /// attempted; the first failure is returned.
    pub fn close_endpoints(&mut self) -> io::Result<()> {
        let mut first_err = None;
        if let Some(sink) = self.sink.take() {
            if let Err(e) = sink.close() {
                warn!(error = %e, "closing sink failed");
                first_err.get_or_insert(e);
            }
        }
        if let Some(source) = self.source.take() {
            if let Err(e) = source.close() {
                warn!(error = %e, "closing source failed");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
