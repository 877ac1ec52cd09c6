use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{DjusbError, DjusbResult};

/// Default copy buffer: 8 MiB per read/write round trip
pub const DEFAULT_COPY_BUFFER_BYTES: usize = 8 * 1024 * 1024;

/// Default zstd level for the compression stage (fastest standard level)
pub const DEFAULT_COMPRESS_LEVEL: i32 = 1;

/// Top-level tool configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DjusbConfig {
    pub pipeline: PipelineConfig,
    pub device: DeviceConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Bytes moved per read/write in the copy stage (default: 8 MiB)
    pub copy_buffer_bytes: usize,
    /// zstd level used when compression is enabled (default: 1)
    pub compress_level: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Unmount every mounted partition of a raw device before opening it
    pub unmount: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            copy_buffer_bytes: DEFAULT_COPY_BUFFER_BYTES,
            compress_level: DEFAULT_COMPRESS_LEVEL,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self { unmount: true }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl DjusbConfig {
    /// Load the config file at `path`, falling back to defaults when the file
    /// does not exist.
    pub fn load(path: &Path) -> DjusbResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: DjusbConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> DjusbResult<()> {
        if self.pipeline.copy_buffer_bytes == 0 {
            return Err(DjusbError::Config(
                "pipeline.copy_buffer_bytes must be greater than zero".into(),
            ));
        }
        // zstd accepts negative "fast" levels down to -131072, but anything
        // past 22 is rejected by the encoder at runtime.
        if !(-7..=22).contains(&self.pipeline.compress_level) {
            return Err(DjusbError::Config(format!(
                "pipeline.compress_level {} out of range -7..=22",
                self.pipeline.compress_level
            )));
        }
        match self.log.format.as_str() {
            "json" | "text" => Ok(()),
            other => Err(DjusbError::Config(format!(
                "log.format must be \"json\" or \"text\", got \"{other}\""
            ))),
        }
    }
}
