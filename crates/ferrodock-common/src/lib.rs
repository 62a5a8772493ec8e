//! ferrodock-common — Shared error taxonomy, configuration and file-naming
//! conventions used by every ferrodock crate.

pub mod error;
pub mod config;
pub mod cpu;
pub mod naming;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
