//! Error types for the build pipeline.

use std::path::PathBuf;

use opforge_core::EngineError;

use crate::run::PipelineState;
use crate::stage::StageKind;

/// Errors produced by pipeline scheduling and execution.
///
/// Cancellation is not an error; it is reported through
/// [`crate::RunOutcome::Cancelled`].
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("stage {stage} failed: {reason}")]
    StageFailed { stage: StageKind, reason: String },

    #[error("illegal state transition {from} -> {to}")]
    IllegalTransition {
        from: PipelineState,
        to: PipelineState,
    },

    #[error("a build is already running for destination {}", .0.display())]
    DestinationBusy(PathBuf),

    #[error("build worker terminated abnormally: {0}")]
    WorkerPanicked(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Error returned by a single [`crate::Stage`].
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("{0}")]
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_failed_names_stage() {
        let err = PipelineError::StageFailed {
            stage: StageKind::ApplyingPatches,
            reason: "disk full".to_string(),
        };
        assert_eq!(err.to_string(), "stage ApplyingPatches failed: disk full");
    }

    #[test]
    fn test_destination_busy_display() {
        let err = PipelineError::DestinationBusy(PathBuf::from("/tmp/out"));
        assert!(err.to_string().contains("/tmp/out"));
    }
}
