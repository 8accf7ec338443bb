//! opforge build pipeline
//!
//! Turns a finalized [`opforge_core::BuildConfiguration`] into a packaged EFI
//! directory through a fixed sequence of stages:
//!
//! `Idle → Initializing → ValidatingConfig → ApplyingPatches →
//! ConfiguringModules → GeneratingIdentity → GeneratingConfigFile →
//! PackagingArtifact → Completed`
//!
//! Each run executes on its own task and reports through a
//! [`PipelineEvent`] channel. Cancellation is cooperative and observed at
//! every stage boundary.

pub mod cancel;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod run;
pub mod scheduler;
pub mod stage;

pub use cancel::{cancel_pair, CancelHandle, CancellationToken};
pub use error::{PipelineError, Result, StageError};
pub use events::PipelineEvent;
pub use pipeline::{BuildHandle, BuildPipeline};
pub use run::{PipelineRun, PipelineState, RunOutcome};
pub use scheduler::BuildScheduler;
pub use stage::{DefaultStage, LogEntry, Stage, StageContext, StageKind};
