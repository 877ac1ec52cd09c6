//! Pipeline runner
//!
//! Phases of one invocation:
//! 1. Apply each stage in order; the first failure stops the run.
//! 2. Run the registered finalizers in registration order.
//! 3. Close any endpoints still held by the context, on success and failure
//!    alike. A close failure never hides an earlier error.

use djusb_core::Mode;
use tracing::{debug, info, warn};

use crate::context::{RunContext, RunRequest};
use crate::error::{PipelineError, PipelineResult};
use crate::stage::Stage;
use crate::stages::stages_for;

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub mode: Mode,
    /// Plaintext-side bytes moved by the copy stage
    pub bytes_copied: u64,
    /// Digest recorded in (or verified against) the controller
    pub sha256: Option<String>,
}

/// Apply `stages` to `ctx`, then its finalizers.
pub fn run(ctx: &mut RunContext, stages: &[Box<dyn Stage>]) -> PipelineResult<()> {
    for stage in stages {
        let name = stage.name();
        debug!(stage = %name, mode = %ctx.mode, "applying stage");
        stage
            .apply(ctx)
            .map_err(|e| PipelineError::stage(name, e))?;
    }

    for (name, finalizer) in ctx.take_finalizers() {
        debug!(finalizer = %name, "running finalizer");
        finalizer(ctx).map_err(|e| PipelineError::finalizer(name, e))?;
    }
    Ok(())
}

/// Run the standard stage list for the request's mode.
pub fn execute(request: RunRequest) -> PipelineResult<RunReport> {
    let stages = stages_for(request.mode);
    let mut ctx = RunContext::new(request);

    info!(
        mode = %ctx.mode,
        source = %ctx.source_path.display(),
        dest = %ctx.dest_path.display(),
        controller = %ctx.store.path().display(),
        "starting run"
    );

    let outcome = run(&mut ctx, &stages);
    let closed = ctx.close_endpoints();

    match (outcome, closed) {
        (Err(e), closed) => {
            if let Err(close_err) = closed {
                warn!(error = %close_err, "cleanup after failed run");
            }
            Err(e)
        }
        (Ok(()), Err(close_err)) => Err(close_err.into()),
        (Ok(()), Ok(())) => {
            let report = RunReport {
                mode: ctx.mode,
                bytes_copied: ctx.bytes_copied,
                sha256: ctx
                    .controller
                    .integrity
                    .as_ref()
                    .and_then(|i| i.sha256.clone()),
            };
            info!(
                mode = %report.mode,
                bytes = report.bytes_copied,
                sha256 = report.sha256.as_deref().unwrap_or("-"),
                "run complete"
            );
            Ok(report)
        }
    }
}
