//! Per-run state machine and record.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::stage::{LogEntry, StageKind};

/// Where a run is. Terminal states: `Completed`, `Cancelled`, `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineState {
    Idle,
    Initializing,
    ValidatingConfig,
    ApplyingPatches,
    ConfiguringModules,
    GeneratingIdentity,
    GeneratingConfigFile,
    PackagingArtifact,
    Completed,
    Cancelled,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Completed | PipelineState::Cancelled | PipelineState::Failed
        )
    }

    /// The stage this state runs, if any.
    pub fn stage(&self) -> Option<StageKind> {
        match self {
            PipelineState::Initializing => Some(StageKind::Initializing),
            PipelineState::ValidatingConfig => Some(StageKind::ValidatingConfig),
            PipelineState::ApplyingPatches => Some(StageKind::ApplyingPatches),
            PipelineState::ConfiguringModules => Some(StageKind::ConfiguringModules),
            PipelineState::GeneratingIdentity => Some(StageKind::GeneratingIdentity),
            PipelineState::GeneratingConfigFile => Some(StageKind::GeneratingConfigFile),
            PipelineState::PackagingArtifact => Some(StageKind::PackagingArtifact),
            _ => None,
        }
    }

    /// The only forward successor.
    pub fn next(&self) -> Option<PipelineState> {
        match self {
            PipelineState::Idle => Some(PipelineState::Initializing),
            PipelineState::PackagingArtifact => Some(PipelineState::Completed),
            s => {
                let i = s.stage()?.index();
                StageKind::ALL.get(i + 1).map(|k| PipelineState::from(*k))
            }
        }
    }

    pub fn can_transition_to(&self, to: PipelineState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match to {
            PipelineState::Cancelled | PipelineState::Failed => true,
            _ => self.next() == Some(to),
        }
    }
}

impl From<StageKind> for PipelineState {
    fn from(kind: StageKind) -> Self {
        match kind {
            StageKind::Initializing => PipelineState::Initializing,
            StageKind::ValidatingConfig => PipelineState::ValidatingConfig,
            StageKind::ApplyingPatches => PipelineState::ApplyingPatches,
            StageKind::ConfiguringModules => PipelineState::ConfiguringModules,
            StageKind::GeneratingIdentity => PipelineState::GeneratingIdentity,
            StageKind::GeneratingConfigFile => PipelineState::GeneratingConfigFile,
            StageKind::PackagingArtifact => PipelineState::PackagingArtifact,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stage() {
            Some(stage) => f.write_str(stage.name()),
            None => fmt::Debug::fmt(self, f),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed { artifact: PathBuf },
    /// `stage` is the state the run was in when the error happened.
    Failed { stage: PipelineState, error: String },
    /// `before` is the state that was not entered.
    Cancelled { before: PipelineState },
}

impl RunOutcome {
    pub fn state(&self) -> PipelineState {
        match self {
            RunOutcome::Completed { .. } => PipelineState::Completed,
            RunOutcome::Failed { .. } => PipelineState::Failed,
            RunOutcome::Cancelled { .. } => PipelineState::Cancelled,
        }
    }

    pub fn artifact(&self) -> Option<&PathBuf> {
        match self {
            RunOutcome::Completed { artifact } => Some(artifact),
            _ => None,
        }
    }
}

/// Record of a single build, owned by the task executing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    run_id: Uuid,
    state: PipelineState,
    stage_index: usize,
    history: Vec<PipelineState>,
    log: Vec<LogEntry>,
    cancel_observed: bool,
    outcome: Option<RunOutcome>,
    partial_artifact: Option<PathBuf>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            state: PipelineState::Idle,
            stage_index: 0,
            history: vec![PipelineState::Idle],
            log: Vec::new(),
            cancel_observed: false,
            outcome: None,
            partial_artifact: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Index of the current or last entered stage.
    pub fn stage_index(&self) -> usize {
        self.stage_index
    }

    /// Every state entered, starting with `Idle`.
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    pub fn cancel_observed(&self) -> bool {
        self.cancel_observed
    }

    pub fn outcome(&self) -> Option<&RunOutcome> {
        self.outcome.as_ref()
    }

    /// Staging output left behind by a run that did not complete.
    /// Its contents are not a valid artifact.
    pub fn partial_artifact(&self) -> Option<&PathBuf> {
        self.partial_artifact.as_ref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Move to `to`, enforcing the forward-only ordering.
    pub fn transition(&mut self, to: PipelineState) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(PipelineError::IllegalTransition {
                from: self.state,
                to,
            });
        }
        if let Some(stage) = to.stage() {
            self.stage_index = stage.index();
        }
        self.state = to;
        self.history.push(to);
        Ok(())
    }

    pub(crate) fn append_log(&mut self, entries: Vec<LogEntry>) {
        self.log.extend(entries);
    }

    pub(crate) fn set_partial_artifact(&mut self, path: Option<PathBuf>) {
        self.partial_artifact = path;
    }

    /// Record the terminal outcome and enter its state.
    pub(crate) fn finish(&mut self, outcome: RunOutcome) -> Result<()> {
        if matches!(outcome, RunOutcome::Cancelled { .. }) {
            self.cancel_observed = true;
        }
        self.transition(outcome.state())?;
        self.outcome = Some(outcome);
        self.finished_at = Some(Utc::now());
        Ok(())
    }
}
