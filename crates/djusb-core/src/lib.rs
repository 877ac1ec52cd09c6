pub mod config;
pub mod error;
pub mod types;

pub use error::{DjusbError, DjusbResult};
pub use types::{Mode, StageName};
