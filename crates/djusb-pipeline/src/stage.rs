//! The stage abstraction.

use djusb_core::StageName;

use crate::context::RunContext;
use crate::error::PipelineResult;

/// One named pipeline step.
///
/// `apply` reads or seeds the stage's own controller entry and may replace
/// the context's source or sink with a decorator, or register a finalizer.
pub trait Stage {
    fn name(&self) -> StageName;

    fn apply(&self, ctx: &mut RunContext) -> PipelineResult<()>;
}
