//! Build pipeline orchestration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use opforge_core::{obs, BuildConfiguration, DEFAULT_ARTIFACT_NAME};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::cancel::{cancel_pair, CancelHandle, CancellationToken};
use crate::error::{PipelineError, Result};
use crate::events::PipelineEvent;
use crate::run::{PipelineRun, PipelineState, RunOutcome};
use crate::stage::{DefaultStage, Stage, StageContext, StageKind};

/// Runs the fixed stage sequence against a [`BuildConfiguration`].
///
/// The pipeline holds no per-run state; one value can start any number of
/// runs. Destination-level exclusion is the scheduler's job
/// ([`crate::BuildScheduler`]).
#[derive(Clone)]
pub struct BuildPipeline {
    stages: [Arc<dyn Stage>; 7],
    artifact_name: String,
}

impl Default for BuildPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildPipeline {
    pub fn new() -> Self {
        Self {
            stages: StageKind::ALL.map(|k| Arc::new(DefaultStage(k)) as Arc<dyn Stage>),
            artifact_name: DEFAULT_ARTIFACT_NAME.to_string(),
        }
    }

    /// Replace the implementation of one stage.
    pub fn with_stage(mut self, kind: StageKind, stage: impl Stage + 'static) -> Self {
        self.stages[kind.index()] = Arc::new(stage);
        self
    }

    pub fn with_artifact_name(mut self, name: &str) -> Self {
        self.artifact_name = name.to_string();
        self
    }

    pub fn artifact_name(&self) -> &str {
        &self.artifact_name
    }

    /// Final artifact path for `config`.
    pub fn artifact_path(&self, config: &BuildConfiguration) -> PathBuf {
        config.output_dir().join(&self.artifact_name)
    }

    /// Staging path used until packaging.
    pub fn staging_path(&self, config: &BuildConfiguration) -> PathBuf {
        config
            .output_dir()
            .join(format!(".{}.partial", self.artifact_name))
    }

    /// Where a replaced artifact waits until the new one is confirmed.
    pub fn previous_path(&self, config: &BuildConfiguration) -> PathBuf {
        config
            .output_dir()
            .join(format!(".{}.previous", self.artifact_name))
    }

    /// Start a run on its own task.
    pub fn spawn(&self, config: Arc<BuildConfiguration>) -> BuildHandle {
        self.spawn_guarded(config, ())
    }

    /// Like [`spawn`](Self::spawn); `guard` is dropped when the task ends.
    pub(crate) fn spawn_guarded<G: Send + 'static>(
        &self,
        config: Arc<BuildConfiguration>,
        guard: G,
    ) -> BuildHandle {
        let run_id = Uuid::new_v4();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (cancel, token) = cancel_pair();
        let pipeline = self.clone();

        let span = obs::run_span(&run_id.to_string());
        let join = tokio::spawn(
            async move {
                let _guard = guard;
                pipeline.execute(run_id, config, token, events_tx).await
            }
            .instrument(span),
        );

        BuildHandle {
            run_id,
            events: events_rx,
            cancel,
            join,
        }
    }

    /// Run to a terminal state on the current task.
    pub async fn run(
        &self,
        config: Arc<BuildConfiguration>,
        cancel: CancellationToken,
        events: UnboundedSender<PipelineEvent>,
    ) -> PipelineRun {
        self.execute(Uuid::new_v4(), config, cancel, events).await
    }

    async fn execute(
        &self,
        run_id: Uuid,
        config: Arc<BuildConfiguration>,
        cancel: CancellationToken,
        events: UnboundedSender<PipelineEvent>,
    ) -> PipelineRun {
        let start = Instant::now();
        let run_label = run_id.to_string();
        let mut run = PipelineRun::new(run_id);

        let artifact_dir = self.artifact_path(&config);
        let staging_dir = self.staging_path(&config);
        let previous_dir = self.previous_path(&config);
        let digest = match config.digest() {
            Ok(digest) => digest,
            Err(e) => {
                warn!(error = %e, "could not compute configuration digest");
                String::new()
            }
        };
        obs::emit_run_started(&run_label, &config.output_dir().display().to_string(), &digest);

        let mut ctx = StageContext::new(
            run_id,
            Arc::clone(&config),
            staging_dir.clone(),
            artifact_dir.clone(),
            previous_dir.clone(),
            cancel.clone(),
            events.clone(),
        );

        for kind in StageKind::ALL {
            let state = PipelineState::from(kind);

            if cancel.is_cancelled() {
                info!(stage = %kind, "cancellation observed at stage boundary");
                return self.conclude(run, RunOutcome::Cancelled { before: state }, &events, start);
            }
            if let Err(e) = run.transition(state) {
                let outcome = RunOutcome::Failed {
                    stage: run.state(),
                    error: e.to_string(),
                };
                return self.conclude(run, outcome, &events, start);
            }

            obs::emit_stage_entered(&run_label, kind.name(), kind.percent());
            let _ = events.send(PipelineEvent::Progress {
                state,
                percent: kind.percent(),
                status: kind.status().to_string(),
            });

            ctx.stage = kind;
            let result = self.stages[kind.index()].execute(&mut ctx).await;
            run.append_log(ctx.drain_log());

            let staged = tokio::fs::try_exists(&staging_dir).await.unwrap_or(false);
            run.set_partial_artifact(staged.then(|| staging_dir.clone()));

            if let Err(e) = result {
                let err = PipelineError::StageFailed {
                    stage: kind,
                    reason: e.to_string(),
                };
                obs::emit_run_failed(&run_label, kind.name(), &err);
                let outcome = RunOutcome::Failed {
                    stage: state,
                    error: err.to_string(),
                };
                return self.conclude(run, outcome, &events, start);
            }
        }

        if cancel.is_cancelled() {
            // The new artifact must not be trusted: park it as partial output
            // and put back whatever it replaced.
            let partial = match roll_back_package(&artifact_dir, &staging_dir, &previous_dir).await {
                Ok(()) => staging_dir,
                Err(e) => {
                    warn!(error = %e, "could not restore the previous artifact");
                    artifact_dir
                }
            };
            run.set_partial_artifact(Some(partial));
            return self.conclude(
                run,
                RunOutcome::Cancelled {
                    before: PipelineState::Completed,
                },
                &events,
                start,
            );
        }

        if tokio::fs::try_exists(&previous_dir).await.unwrap_or(false) {
            if let Err(e) = tokio::fs::remove_dir_all(&previous_dir).await {
                warn!(error = %e, path = %previous_dir.display(), "could not remove replaced artifact");
            }
        }
        self.conclude(run, RunOutcome::Completed { artifact: artifact_dir }, &events, start)
    }

    fn conclude(
        &self,
        mut run: PipelineRun,
        outcome: RunOutcome,
        events: &UnboundedSender<PipelineEvent>,
        start: Instant,
    ) -> PipelineRun {
        let run_label = run.run_id().to_string();
        let last_percent = run
            .state()
            .stage()
            .map(|s| s.percent())
            .unwrap_or(0);

        let (percent, status) = match &outcome {
            RunOutcome::Completed { .. } => (100, "Build completed".to_string()),
            RunOutcome::Cancelled { .. } => (last_percent, "Build cancelled".to_string()),
            RunOutcome::Failed { error, .. } => (last_percent, format!("Build failed: {error}")),
        };

        if let Err(e) = run.finish(outcome.clone()) {
            // Only reachable if the run was already terminal.
            warn!(error = %e, "run already concluded");
            return run;
        }

        let _ = events.send(PipelineEvent::Progress {
            state: outcome.state(),
            percent,
            status,
        });
        let _ = events.send(PipelineEvent::Finished { outcome });

        obs::emit_run_finished(
            &run_label,
            start.elapsed().as_millis() as u64,
            &run.state().to_string(),
        );
        run
    }
}

async fn roll_back_package(artifact: &Path, staging: &Path, previous: &Path) -> std::io::Result<()> {
    if tokio::fs::try_exists(artifact).await? {
        if tokio::fs::try_exists(staging).await? {
            tokio::fs::remove_dir_all(staging).await?;
        }
        tokio::fs::rename(artifact, staging).await?;
    }
    if tokio::fs::try_exists(previous).await? {
        tokio::fs::rename(previous, artifact).await?;
    }
    Ok(())
}

/// Caller's side of a spawned run.
///
/// Drain [`events`](Self::events) until it yields `None`, then
/// [`wait`](Self::wait) for the final [`PipelineRun`].
pub struct BuildHandle {
    run_id: Uuid,
    /// Closed when the run task ends.
    pub events: UnboundedReceiver<PipelineEvent>,
    cancel: CancelHandle,
    join: JoinHandle<PipelineRun>,
}

impl BuildHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// A clonable handle that can cancel this run from elsewhere.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the run to reach a terminal state.
    pub async fn wait(self) -> Result<PipelineRun> {
        self.join
            .await
            .map_err(|e| PipelineError::WorkerPanicked(e.to_string()))
    }

    /// Wait at most `limit`; on expiry request cancellation and wait for
    /// the run to reach `Cancelled` at its next stage boundary.
    pub async fn wait_timeout(self, limit: Duration) -> Result<PipelineRun> {
        let BuildHandle {
            run_id,
            cancel,
            mut join,
            ..
        } = self;

        match tokio::time::timeout(limit, &mut join).await {
            Ok(joined) => joined.map_err(|e| PipelineError::WorkerPanicked(e.to_string())),
            Err(_) => {
                warn!(run_id = %run_id, timeout_ms = limit.as_millis() as u64, "build timed out, cancelling");
                cancel.cancel();
                join.await
                    .map_err(|e| PipelineError::WorkerPanicked(e.to_string()))
            }
        }
    }
}
