// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod analyze;
pub mod api;
pub mod canonical;
pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod notify;
pub mod pipeline;
pub mod source_weights;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::error::PipelineError;
pub use crate::model::{CanonicalUpgrade, UpgradeStatus};
pub use crate::notify::NotifierMux;
pub use crate::pipeline::{CycleReport, Pipeline, PipelineConfig};
