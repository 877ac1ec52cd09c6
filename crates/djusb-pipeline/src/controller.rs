//! Controller file: the persisted decision record.
//!
//! Top-level keys are stage names. Each stage owns its own object and either
//! obeys a value already present or seeds one and commits the whole record
//! before moving on. Known keys are typed so a wrong-typed value fails at
//! load time; anything unknown is carried through untouched.

use djusb_crypto::NonceBase;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};

/// Free-form decision map for stages that own no typed keys
pub type StageDecisions = Map<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diskio: Option<StageDecisions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<StageDecisions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compress: Option<CompressDecisions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crypto: Option<CryptoDecisions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrity: Option<IntegrityDecisions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copy: Option<StageDecisions>,
    /// Stage names this version does not know about
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressDecisions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoDecisions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce_base: Option<NonceBase>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrityDecisions {
    /// Lowercase hex SHA-256 of the wire stream
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "digest_hex"
    )]
    pub sha256: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An empty string counts as "not recorded yet".
fn digest_hex<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let text = Option::<String>::deserialize(deserializer)?;
    match text.as_deref() {
        None | Some("") => Ok(None),
        Some(hex) if hex.len() == 64 && hex.bytes().all(|b| b.is_ascii_hexdigit()) => {
            Ok(Some(hex.to_ascii_lowercase()))
        }
        Some(other) => Err(de::Error::custom(format!(
            "integrity.sha256 is not a hex SHA-256 digest: {other:?}"
        ))),
    }
}

impl DecisionRecord {
    /// A fresh record: one entry per known stage, taken from `seed` where the
    /// seed provides it and empty otherwise.
    pub fn seeded(seed: &DecisionRecord) -> Self {
        Self {
            diskio: Some(seed.diskio.clone().unwrap_or_default()),
            meta: Some(seed.meta.clone().unwrap_or_default()),
            compress: Some(seed.compress.clone().unwrap_or_default()),
            crypto: Some(seed.crypto.clone().unwrap_or_default()),
            integrity: Some(seed.integrity.clone().unwrap_or_default()),
            copy: Some(seed.copy.clone().unwrap_or_default()),
            other: seed.other.clone(),
        }
    }

    pub fn compress_mut(&mut self) -> &mut CompressDecisions {
        self.compress.get_or_insert_with(Default::default)
    }

    pub fn crypto_mut(&mut self) -> &mut CryptoDecisions {
        self.crypto.get_or_insert_with(Default::default)
    }

    pub fn integrity_mut(&mut self) -> &mut IntegrityDecisions {
        self.integrity.get_or_insert_with(Default::default)
    }
}

/// Loads and atomically saves the controller file at one path.
#[derive(Debug, Clone)]
pub struct ControllerStore {
    path: PathBuf,
}

impl ControllerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the record and whether the file existed. A missing file is an
    /// empty record, not an error.
    pub fn load(&self) -> PipelineResult<(DecisionRecord, bool)> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok((DecisionRecord::default(), false));
            }
            Err(e) => return Err(e.into()),
        };
        let record = serde_json::from_slice(&bytes).map_err(|e| PipelineError::Decode {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        Ok((record, true))
    }

    /// Write the record as pretty JSON.
    ///
    /// Goes through a sibling temp file that is fsynced and renamed over the
    /// target, so a crash never leaves a half-written controller behind.
    pub fn save(&self, record: &DecisionRecord) -> PipelineResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut json = serde_json::to_vec_pretty(record).map_err(io::Error::from)?;
        json.push(b'\n');

        let tmp_path = self.tmp_path();
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(&json)?;
        tmp.sync_all()?;
        drop(tmp);
        fs::rename(&tmp_path, &self.path)?;

        debug!(path = %self.path.display(), bytes = json.len(), "controller saved");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "controller".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
