use djusb_core::StageName;
use std::io;
use std::path::Path;
use tracing::info;

use crate::context::RunContext;
use crate::device::{is_device_path, unmount_all};
use crate::endpoint::{FileSink, FileSource};
use crate::error::{PipelineError, PipelineResult};
use crate::stage::Stage;

/// Opens the raw endpoints, unmounting device partitions first when
/// configured to.
pub struct DiskIo;

impl Stage for DiskIo {
    fn name(&self) -> StageName {
        StageName::DiskIo
    }

    fn apply(&self, ctx: &mut RunContext) -> PipelineResult<()> {
        if ctx.settings.unmount_devices {
            for path in [&ctx.source_path, &ctx.dest_path] {
                if is_device_path(path) {
                    unmount_all(path)?;
                }
            }
        }

        let source = FileSource::open(&ctx.source_path)
            .map_err(|e| open_failed("source", &ctx.source_path, e))?;
        let dest_is_device = is_device_path(&ctx.dest_path);
        let sink = FileSink::create(&ctx.dest_path, !dest_is_device)
            .map_err(|e| open_failed("destination", &ctx.dest_path, e))?;

        info!(
            source = %ctx.source_path.display(),
            dest = %ctx.dest_path.display(),
            dest_is_device,
            "endpoints open"
        );
        ctx.open_endpoints(Box::new(source), Box::new(sink));
        Ok(())
    }
}

fn open_failed(role: &str, path: &Path, err: io::Error) -> PipelineError {
    PipelineError::Io(io::Error::new(
        err.kind(),
        format!("opening {role} {}: {err}", path.display()),
    ))
}
