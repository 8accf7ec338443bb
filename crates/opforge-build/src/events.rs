//! Events streamed from a running build to its caller.

use serde::{Deserialize, Serialize};

use crate::run::{PipelineState, RunOutcome};

/// Progress, log and completion notifications, in emission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// Entered `state`. `percent` never decreases within a run.
    Progress {
        state: PipelineState,
        percent: u8,
        status: String,
    },
    Log {
        stage: PipelineState,
        line: String,
    },
    /// Always the last event of a run.
    Finished { outcome: RunOutcome },
}

impl PipelineEvent {
    pub fn is_finished(&self) -> bool {
        matches!(self, PipelineEvent::Finished { .. })
    }
}
