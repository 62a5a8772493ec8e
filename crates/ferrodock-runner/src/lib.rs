//! ferrodock-runner — fan a set of input files out over a bounded worker
//! pool, one external tool invocation per item.
//!
//! 1. Discover work items by file suffix (`work`)
//! 2. Build and launch tool processes (`executor`)
//! 3. Run every item under a worker cap, collecting per-item outcomes (`batch`)

pub mod work;
pub mod executor;
pub mod batch;

pub use batch::{BatchJob, BatchReport, BatchRunner, ItemFailure, ItemSuccess, RetryPolicy};
pub use executor::{ProcessExecutor, ToolExecutor, ToolInvocation, ToolOutcome};
pub use work::{WorkInput, WorkItem};
