//! The historical backfill pipeline: indexer loader → batch processor →
//! batch writer, one run per job.

pub mod loader;
pub mod processor;
pub mod recorder;
pub mod types;
pub mod writer;

pub use recorder::run_backfill_job;
pub use types::{BackfillRequest, BackfillRequestError};
