use djusb_core::{Mode, StageName};
use tracing::{debug, info, warn};

use crate::context::RunContext;
use crate::endpoint::{BoxSink, BoxSource, TapSink, TapSource};
use crate::error::{PipelineError, PipelineResult};
use crate::stage::Stage;

/// SHA-256 over the wire-format stream.
///
/// The tap sits next to the device, so the digest covers exactly the bytes
/// stored in the artifact. A recorded `integrity.sha256` is verified once the
/// copy is done; otherwise the computed digest is recorded.
pub struct Integrity;

impl Stage for Integrity {
    fn name(&self) -> StageName {
        StageName::Integrity
    }

    fn apply(&self, ctx: &mut RunContext) -> PipelineResult<()> {
        if ctx.controller.integrity.is_none() {
            ctx.controller.integrity_mut();
            ctx.commit()?;
        }

        let digest = ctx.digest.clone();
        match ctx.mode {
            Mode::Backup => {
                ctx.wrap_sink(|inner| Ok(Box::new(TapSink::new(inner, digest)) as BoxSink))?
            }
            Mode::Restore => {
                ctx.wrap_source(|inner| Ok(Box::new(TapSource::new(inner, digest)) as BoxSource))?
            }
        }

        ctx.register_finalizer(StageName::Integrity.as_str(), verify_or_record);
        Ok(())
    }
}

fn verify_or_record(ctx: &mut RunContext) -> PipelineResult<()> {
    let actual = ctx.digest.finalize_hex();
    let recorded = ctx
        .controller
        .integrity
        .as_ref()
        .and_then(|i| i.sha256.clone());

    match recorded {
        Some(expected) if expected == actual => {
            info!(sha256 = %actual, "integrity verified");
            Ok(())
        }
        Some(expected) => {
            warn!(expected = %expected, actual = %actual, "integrity mismatch");
            Err(PipelineError::IntegrityMismatch { expected, actual })
        }
        None => {
            debug!(sha256 = %actual, "recording digest");
            ctx.controller.integrity_mut().sha256 = Some(actual.clone());
            ctx.commit()?;
            info!(sha256 = %actual, "integrity recorded");
            Ok(())
        }
    }
}
