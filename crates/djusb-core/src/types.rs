use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Direction of a run, fixed for the whole invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Plain device/file → artifact
    Backup,
    /// Artifact → plain device/file
    Restore,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Backup => "backup",
            Mode::Restore => "restore",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = crate::DjusbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "backup" => Ok(Mode::Backup),
            "restore" => Ok(Mode::Restore),
            other => Err(crate::DjusbError::Config(format!(
                "invalid mode '{other}' (expected backup or restore)"
            ))),
        }
    }
}

/// Names of the pipeline stages. These double as the top-level keys of the
/// controller file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageName {
    DiskIo,
    Meta,
    Compress,
    Crypto,
    Integrity,
    Copy,
}

impl StageName {
    /// Every stage, in controller-file order.
    pub const ALL: [StageName; 6] = [
        StageName::DiskIo,
        StageName::Meta,
        StageName::Compress,
        StageName::Crypto,
        StageName::Integrity,
        StageName::Copy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::DiskIo => "diskio",
            StageName::Meta => "meta",
            StageName::Compress => "compress",
            StageName::Crypto => "crypto",
            StageName::Integrity => "integrity",
            StageName::Copy => "copy",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
