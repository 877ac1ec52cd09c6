//! Concrete pipeline stages.

mod compress;
mod copy;
mod crypto;
mod diskio;
mod integrity;
mod meta;

pub use compress::Compression;
pub use copy::Copy;
pub use crypto::Encryption;
pub use diskio::DiskIo;
pub use integrity::Integrity;
pub use meta::Bootstrap;

use djusb_core::Mode;

use crate::stage::Stage;

/// The stage list for a run.
///
/// Writers are decorated outside-in and readers inside-out, so listing the
/// codec stages by distance from the wire gives the right data path in both
/// directions:
///
/// ```text
/// backup:  copy → zstd → encrypt → tap → device
/// restore: device → tap → decrypt → zstd → copy
/// ```
pub fn stages_for(_mode: Mode) -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(DiskIo),
        Box::new(Bootstrap),
        Box::new(Integrity),
        Box::new(Encryption),
        Box::new(Compression),
        Box::new(Copy),
    ]
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::Path;

    use djusb_core::Mode;

    use crate::context::{RunContext, RunRequest, RunSettings};
    use crate::controller::DecisionRecord;
    use crate::stage::Stage;

    use super::{Bootstrap, DiskIo};

    /// Context with endpoints open and the controller loaded, ready for the
    /// codec stages. Writes `input` to the source path first if given.
    pub(crate) fn prepared(dir: &Path, mode: Mode, input: Option<&[u8]>) -> RunContext {
        if let Some(input) = input {
            std::fs::write(dir.join("in"), input).unwrap();
        }
        let mut ctx = RunContext::new(RunRequest {
            mode,
            source_path: dir.join("in"),
            dest_path: dir.join("out"),
            controller_path: dir.join("ctrl.json"),
            passphrase: "p".to_string().into(),
            seed: DecisionRecord::default(),
            settings: RunSettings::default(),
        });
        DiskIo.apply(&mut ctx).unwrap();
        Bootstrap.apply(&mut ctx).unwrap();
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use djusb_core::StageName;

    #[test]
    fn test_stage_order_is_wire_outward() {
        for mode in [Mode::Backup, Mode::Restore] {
            let names: Vec<StageName> = stages_for(mode).iter().map(|s| s.name()).collect();
            assert_eq!(
                names,
                [
                    StageName::DiskIo,
                    StageName::Meta,
                    StageName::Integrity,
                    StageName::Crypto,
                    StageName::Compress,
                    StageName::Copy,
                ]
            );
        }
    }
}
