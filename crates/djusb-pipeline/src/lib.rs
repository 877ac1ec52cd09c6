//! djusb-pipeline: controller store, stream endpoints, stages, and runner
//!
//! A run opens the raw endpoints, loads or creates the controller file, then
//! lets each codec stage decorate the source or sink before the copy stage
//! pumps bytes end to end. Finalizers run once every stage has succeeded.

pub mod context;
pub mod controller;
pub mod device;
pub mod endpoint;
pub mod error;
pub mod runner;
pub mod stage;
pub mod stages;

pub use context::{RunContext, RunRequest, RunSettings};
pub use controller::{
    CompressDecisions, ControllerStore, CryptoDecisions, DecisionRecord, IntegrityDecisions,
};
pub use error::{PipelineError, PipelineResult};
pub use runner::{execute, run, RunReport};
pub use stage::Stage;
pub use stages::stages_for;
