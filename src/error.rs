// src/error.rs
use thiserror::Error;

/// Invariant violations inside one unit of pipeline work. These abort the
/// current project for the cycle; everything else is recovered locally.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cannot canonicalize an empty cluster for project `{project}`")]
    EmptyCluster { project: String },

    #[error("source registry is empty")]
    EmptyRegistry,
}
