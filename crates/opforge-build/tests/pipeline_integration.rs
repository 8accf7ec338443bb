//! Integration tests for the build pipeline against a temporary destination.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use opforge_build::{
    cancel_pair, BuildHandle, BuildPipeline, BuildScheduler, CancelHandle, DefaultStage,
    PipelineError, PipelineEvent, PipelineRun, PipelineState, RunOutcome, Stage, StageContext,
    StageError, StageKind,
};
use opforge_core::{
    modules, patches, synthesize, BuildConfiguration, DeviceModel, HardwareDescriptor,
    TargetVersion,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;
use tokio::sync::{Notify, Semaphore};

fn config(dir: &Path) -> Arc<BuildConfiguration> {
    let descriptor = HardwareDescriptor::from_value(json!({
        "system": { "chassis": "laptop" },
        "cpu": { "vendor": "Intel", "model": "Intel Core i7-10710U" },
        "storage": [ { "model": "Toshiba XG6", "type": "NVMe" } ]
    }))
    .unwrap();
    let p = patches::recommend(&descriptor).unwrap();
    let m = modules::recommend(Some(&descriptor));
    let identity = synthesize(DeviceModel::MacBookPro16_1, &mut StdRng::seed_from_u64(21)).unwrap();

    Arc::new(
        BuildConfiguration::builder(descriptor)
            .target_version(TargetVersion::Ventura)
            .identity(identity)
            .patches(p.patches)
            .modules(m.modules)
            .output_dir(dir)
            .finalize()
            .unwrap(),
    )
}

async fn drain(mut handle: BuildHandle) -> (Vec<PipelineEvent>, PipelineRun) {
    let mut events = Vec::new();
    while let Some(ev) = handle.events.recv().await {
        events.push(ev);
    }
    let run = handle.wait().await.expect("worker joined");
    (events, run)
}

fn progress(events: &[PipelineEvent]) -> Vec<(PipelineState, u8)> {
    events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Progress { state, percent, .. } => Some((*state, *percent)),
            _ => None,
        })
        .collect()
}

/// Blocks inside a stage until a permit is released.
struct GateStage {
    entered: Arc<Notify>,
    release: Arc<Semaphore>,
}

#[async_trait]
impl Stage for GateStage {
    async fn execute(&self, ctx: &mut StageContext) -> Result<(), StageError> {
        ctx.log("waiting at gate");
        self.entered.notify_one();
        let permit = self
            .release
            .acquire()
            .await
            .map_err(|e| StageError::Failed(e.to_string()))?;
        permit.forget();
        Ok(())
    }
}

struct FailingStage;

#[async_trait]
impl Stage for FailingStage {
    async fn execute(&self, ctx: &mut StageContext) -> Result<(), StageError> {
        ctx.log("about to fail");
        Err(StageError::Failed("kext copy failed".to_string()))
    }
}

/// Sleeps unless cancelled first.
struct CancelAwareStage {
    entered: Arc<Notify>,
    wait: Duration,
}

#[async_trait]
impl Stage for CancelAwareStage {
    async fn execute(&self, ctx: &mut StageContext) -> Result<(), StageError> {
        let mut cancel = ctx.cancel.clone();
        self.entered.notify_one();
        tokio::select! {
            _ = tokio::time::sleep(self.wait) => ctx.log("finished the long wait"),
            _ = cancel.cancelled() => ctx.log("stopping early"),
        }
        Ok(())
    }
}

/// Packages normally, then requests cancellation before the run concludes.
struct PackageThenCancel(CancelHandle);

#[async_trait]
impl Stage for PackageThenCancel {
    async fn execute(&self, ctx: &mut StageContext) -> Result<(), StageError> {
        DefaultStage(StageKind::PackagingArtifact).execute(ctx).await?;
        self.0.cancel();
        Ok(())
    }
}

struct SlowStage(Duration);

#[async_trait]
impl Stage for SlowStage {
    async fn execute(&self, _ctx: &mut StageContext) -> Result<(), StageError> {
        tokio::time::sleep(self.0).await;
        Ok(())
    }
}

/// Test: a clean run visits every stage once, in order, with fixed checkpoints
#[tokio::test]
async fn test_successful_run_visits_stages_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());

    let (events, run) = drain(BuildPipeline::new().spawn(cfg)).await;

    assert_eq!(
        progress(&events),
        vec![
            (PipelineState::Initializing, 10),
            (PipelineState::ValidatingConfig, 20),
            (PipelineState::ApplyingPatches, 35),
            (PipelineState::ConfiguringModules, 50),
            (PipelineState::GeneratingIdentity, 65),
            (PipelineState::GeneratingConfigFile, 80),
            (PipelineState::PackagingArtifact, 90),
            (PipelineState::Completed, 100),
        ]
    );
    assert!(events.last().unwrap().is_finished());

    assert_eq!(run.history().len(), 9);
    assert_eq!(run.history()[0], PipelineState::Idle);
    let artifact = dir.path().join("OpenCore-EFI");
    assert_eq!(
        run.outcome(),
        Some(&RunOutcome::Completed {
            artifact: artifact.clone()
        })
    );

    assert!(artifact.join("EFI/OC/ACPI/patches.json").exists());
    assert!(artifact.join("EFI/OC/Kexts/Lilu.kext/Info.json").exists());
    assert!(artifact.join("EFI/OC/Kexts/NVMeFix.kext/Info.json").exists());
    assert!(artifact.join("EFI/OC/smbios.json").exists());
    assert!(artifact.join("BUILD-INFO.json").exists());
    assert!(!dir.path().join(".OpenCore-EFI.partial").exists());

    let config_doc: serde_json::Value = serde_json::from_slice(
        &std::fs::read(artifact.join("EFI/OC/config.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(config_doc["smbios_model"], "MacBookPro16,1");
    assert_eq!(config_doc["target_version"], "13");

    assert!(run.log().iter().any(|l| l.line == "applied SSDT-PNLF"));
    assert!(events
        .iter()
        .any(|e| matches!(e, PipelineEvent::Log { line, .. } if line == "applied SSDT-PNLF")));
}

/// Test: cancellation requested before ApplyingPatches never completes
#[tokio::test]
async fn test_cancel_before_applying_patches() {
    let dir = tempfile::tempdir().unwrap();
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Semaphore::new(0));

    let pipeline = BuildPipeline::new().with_stage(
        StageKind::ValidatingConfig,
        GateStage {
            entered: Arc::clone(&entered),
            release: Arc::clone(&release),
        },
    );
    let handle = pipeline.spawn(config(dir.path()));

    entered.notified().await;
    handle.cancel();
    release.add_permits(1);

    let (events, run) = drain(handle).await;

    assert_eq!(
        run.outcome(),
        Some(&RunOutcome::Cancelled {
            before: PipelineState::ApplyingPatches
        })
    );
    assert!(run.cancel_observed());
    assert!(!run.history().contains(&PipelineState::ApplyingPatches));
    assert!(!run.history().contains(&PipelineState::Completed));
    assert!(run.partial_artifact().is_some());
    assert!(!dir.path().join("OpenCore-EFI").exists());

    assert!(!progress(&events)
        .iter()
        .any(|(s, _)| *s == PipelineState::Completed));
    let percents: Vec<u8> = progress(&events).iter().map(|(_, p)| *p).collect();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
}

/// Test: a pre-cancelled run stops before the first stage
#[tokio::test]
async fn test_cancel_before_start() {
    let dir = tempfile::tempdir().unwrap();
    let (cancel, token) = cancel_pair();
    let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
    cancel.cancel();

    let run = BuildPipeline::new()
        .run(config(dir.path()), token, tx)
        .await;

    assert_eq!(run.state(), PipelineState::Cancelled);
    assert_eq!(run.history(), &[PipelineState::Idle, PipelineState::Cancelled]);
    assert!(run.partial_artifact().is_none());
}

/// Test: an injected stage failure is retained with the stage name
#[tokio::test]
async fn test_stage_failure_is_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = BuildPipeline::new().with_stage(StageKind::ConfiguringModules, FailingStage);

    let (events, run) = drain(pipeline.spawn(config(dir.path()))).await;

    match run.outcome() {
        Some(RunOutcome::Failed { stage, error }) => {
            assert_eq!(*stage, PipelineState::ConfiguringModules);
            assert!(error.contains("ConfiguringModules"));
            assert!(error.contains("kext copy failed"));
        }
        other => panic!("expected Failed, got {other:?}"),
    }
    assert_eq!(run.state(), PipelineState::Failed);
    assert!(!run.history().contains(&PipelineState::GeneratingIdentity));
    assert!(run.log().iter().any(|l| l.line == "about to fail"));
    assert!(run.partial_artifact().unwrap().exists());
    assert!(!events
        .iter()
        .any(|e| matches!(e, PipelineEvent::Progress { state: PipelineState::Completed, .. })));
}

/// Test: the scheduler serializes runs per destination
#[tokio::test]
async fn test_scheduler_rejects_busy_destination() {
    let dir = tempfile::tempdir().unwrap();
    let other = tempfile::tempdir().unwrap();
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Semaphore::new(0));

    let scheduler = BuildScheduler::new(BuildPipeline::new().with_stage(
        StageKind::Initializing,
        GateStage {
            entered: Arc::clone(&entered),
            release: Arc::clone(&release),
        },
    ));

    let first = scheduler.start(config(dir.path())).unwrap();
    entered.notified().await;
    assert!(scheduler.is_busy(dir.path()));

    let err = scheduler.start(config(dir.path())).err().unwrap();
    assert!(matches!(err, PipelineError::DestinationBusy(_)));

    // A different destination is independent; it also blocks at the gate.
    let second = scheduler.start(config(other.path())).unwrap();
    entered.notified().await;
    assert_eq!(scheduler.active_count(), 2);

    release.add_permits(2);
    let (_, run_a) = drain(first).await;
    let (_, run_b) = drain(second).await;
    assert_eq!(run_a.state(), PipelineState::Completed);
    assert_eq!(run_b.state(), PipelineState::Completed);

    assert!(!scheduler.is_busy(dir.path()));
    assert!(scheduler.start(config(dir.path())).is_ok());
}

/// Test: a caller-imposed timeout acts as cancellation
#[tokio::test]
async fn test_wait_timeout_cancels() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = BuildPipeline::new()
        .with_stage(StageKind::ApplyingPatches, SlowStage(Duration::from_millis(500)));

    let handle = pipeline.spawn(config(dir.path()));
    let run = handle
        .wait_timeout(Duration::from_millis(100))
        .await
        .unwrap();

    assert_eq!(
        run.outcome(),
        Some(&RunOutcome::Cancelled {
            before: PipelineState::ConfiguringModules
        })
    );
}

/// Test: the artifact name is configurable
#[tokio::test]
async fn test_custom_artifact_name() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = BuildPipeline::new().with_artifact_name("EFI-Build");

    let (_, run) = drain(pipeline.spawn(config(dir.path()))).await;

    assert_eq!(
        run.outcome().and_then(|o| o.artifact()),
        Some(&dir.path().join("EFI-Build"))
    );
    assert!(dir.path().join("EFI-Build/EFI/OC/config.json").exists());
}

/// Test: a stage watching its token returns as soon as cancellation arrives
#[tokio::test]
async fn test_stage_observes_cancellation() {
    let dir = tempfile::tempdir().unwrap();
    let entered = Arc::new(Notify::new());
    let pipeline = BuildPipeline::new().with_stage(
        StageKind::GeneratingIdentity,
        CancelAwareStage {
            entered: Arc::clone(&entered),
            wait: Duration::from_secs(600),
        },
    );

    let handle = pipeline.spawn(config(dir.path()));
    entered.notified().await;
    let started = std::time::Instant::now();
    handle.cancel();
    let (_, run) = drain(handle).await;

    assert!(started.elapsed() < Duration::from_secs(30));
    assert_eq!(
        run.outcome(),
        Some(&RunOutcome::Cancelled {
            before: PipelineState::GeneratingConfigFile
        })
    );
    assert!(run.log().iter().any(|l| l.line == "stopping early"));
}

/// Test: rebuilding replaces the artifact and leaves nothing parked
#[tokio::test]
async fn test_rebuild_replaces_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = dir.path().join("OpenCore-EFI");

    let (_, first) = drain(BuildPipeline::new().spawn(config(dir.path()))).await;
    assert_eq!(first.state(), PipelineState::Completed);
    std::fs::write(artifact.join("stale.txt"), "old build").unwrap();

    let (_, second) = drain(BuildPipeline::new().spawn(config(dir.path()))).await;
    assert_eq!(second.state(), PipelineState::Completed);
    assert!(!artifact.join("stale.txt").exists());
    assert!(artifact.join("EFI/OC/config.json").exists());
    assert!(!dir.path().join(".OpenCore-EFI.previous").exists());
}

/// Test: cancellation after packaging restores the artifact it replaced
#[tokio::test]
async fn test_cancel_after_packaging_keeps_previous_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = dir.path().join("OpenCore-EFI");

    let (_, first) = drain(BuildPipeline::new().spawn(config(dir.path()))).await;
    assert_eq!(first.state(), PipelineState::Completed);
    std::fs::write(artifact.join("known-good.txt"), "previous build").unwrap();

    let (cancel, token) = cancel_pair();
    let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
    let run = BuildPipeline::new()
        .with_stage(StageKind::PackagingArtifact, PackageThenCancel(cancel))
        .run(config(dir.path()), token, tx)
        .await;

    assert_eq!(
        run.outcome(),
        Some(&RunOutcome::Cancelled {
            before: PipelineState::Completed
        })
    );
    assert!(artifact.join("known-good.txt").exists());
    assert!(!dir.path().join(".OpenCore-EFI.previous").exists());

    let partial = run.partial_artifact().unwrap();
    assert_eq!(partial, &dir.path().join(".OpenCore-EFI.partial"));
    assert!(partial.join("EFI/OC/config.json").exists());
}

/// Test: every selected patch and module is materialized from the catalog
#[tokio::test]
async fn test_selected_entries_are_materialized() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());

    let (_, run) = drain(BuildPipeline::new().spawn(Arc::clone(&cfg))).await;
    assert_eq!(run.state(), PipelineState::Completed);

    let oc = dir.path().join("OpenCore-EFI/EFI/OC");
    let doc: serde_json::Value =
        serde_json::from_slice(&std::fs::read(oc.join("ACPI/patches.json")).unwrap()).unwrap();
    let names: Vec<&str> = doc["patches"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, cfg.patches().iter().map(String::as_str).collect::<Vec<_>>());

    for module in cfg.modules() {
        let info: serde_json::Value =
            serde_json::from_slice(&std::fs::read(oc.join("Kexts").join(module).join("Info.json")).unwrap())
                .unwrap();
        let record = opforge_core::MODULE_CATALOG.get(module).unwrap();
        assert_eq!(info["version"], record.version);
    }
}
