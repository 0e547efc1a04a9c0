// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod dates;
pub mod digest;
pub mod error;
pub mod ingest;
pub mod judge;
pub mod pipeline;
pub mod render;
pub mod state;
pub mod telemetry;

// ---- Re-exports for the common entry points ----
pub use crate::config::Config;
pub use crate::pipeline::{Pipeline, PipelineConfig, RunReport};
pub use crate::state::Store;
