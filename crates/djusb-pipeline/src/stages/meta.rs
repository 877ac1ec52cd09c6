use djusb_core::StageName;
use tracing::{debug, info};

use crate::context::RunContext;
use crate::controller::DecisionRecord;
use crate::error::PipelineResult;
use crate::stage::Stage;

/// Loads the controller, or creates and persists a seeded one.
pub struct Bootstrap;

impl Stage for Bootstrap {
    fn name(&self) -> StageName {
        StageName::Meta
    }

    fn apply(&self, ctx: &mut RunContext) -> PipelineResult<()> {
        let (record, existed) = ctx.store.load()?;
        if existed {
            debug!(path = %ctx.store.path().display(), "controller loaded");
            ctx.controller = record;
            return Ok(());
        }

        ctx.controller = DecisionRecord::seeded(&ctx.seed);
        ctx.commit()?;
        info!(path = %ctx.store.path().display(), "controller created");
        Ok(())
    }
}
