//! Build stages and the default implementations that materialize the EFI tree.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use opforge_core::{
    obs, BuildConfiguration, Named, MODULE_CATALOG, PATCH_CATALOG,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::cancel::CancellationToken;
use crate::error::StageError;
use crate::events::PipelineEvent;
use crate::run::PipelineState;

/// The fixed, ordered build stages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum StageKind {
    Initializing,
    ValidatingConfig,
    ApplyingPatches,
    ConfiguringModules,
    GeneratingIdentity,
    GeneratingConfigFile,
    PackagingArtifact,
}

impl StageKind {
    /// Execution order.
    pub const ALL: [StageKind; 7] = [
        StageKind::Initializing,
        StageKind::ValidatingConfig,
        StageKind::ApplyingPatches,
        StageKind::ConfiguringModules,
        StageKind::GeneratingIdentity,
        StageKind::GeneratingConfigFile,
        StageKind::PackagingArtifact,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Initializing => "Initializing",
            StageKind::ValidatingConfig => "ValidatingConfig",
            StageKind::ApplyingPatches => "ApplyingPatches",
            StageKind::ConfiguringModules => "ConfiguringModules",
            StageKind::GeneratingIdentity => "GeneratingIdentity",
            StageKind::GeneratingConfigFile => "GeneratingConfigFile",
            StageKind::PackagingArtifact => "PackagingArtifact",
        }
    }

    /// Position in [`StageKind::ALL`].
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Fixed progress checkpoint reported on entry.
    pub fn percent(&self) -> u8 {
        match self {
            StageKind::Initializing => 10,
            StageKind::ValidatingConfig => 20,
            StageKind::ApplyingPatches => 35,
            StageKind::ConfiguringModules => 50,
            StageKind::GeneratingIdentity => 65,
            StageKind::GeneratingConfigFile => 80,
            StageKind::PackagingArtifact => 90,
        }
    }

    /// Short status line reported on entry.
    pub fn status(&self) -> &'static str {
        match self {
            StageKind::Initializing => "Initializing build environment",
            StageKind::ValidatingConfig => "Validating configuration",
            StageKind::ApplyingPatches => "Applying ACPI patches",
            StageKind::ConfiguringModules => "Configuring Kext drivers",
            StageKind::GeneratingIdentity => "Generating SMBIOS information",
            StageKind::GeneratingConfigFile => "Generating configuration file",
            StageKind::PackagingArtifact => "Packaging EFI",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A line logged by a stage, with the time it was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub at: chrono::DateTime<Utc>,
    pub state: PipelineState,
    pub line: String,
}

/// Everything a stage can see and touch.
pub struct StageContext {
    pub run_id: Uuid,
    pub stage: StageKind,
    pub config: Arc<BuildConfiguration>,
    /// Directory the tree is assembled in until packaging.
    pub staging_dir: PathBuf,
    /// Final artifact location.
    pub artifact_dir: PathBuf,
    /// Where an existing artifact is parked while the new one moves into place.
    pub previous_dir: PathBuf,
    /// Long-running stages may watch this and return early; the pipeline
    /// still only acts on cancellation at stage boundaries.
    pub cancel: CancellationToken,
    events: UnboundedSender<PipelineEvent>,
    pending: Vec<LogEntry>,
}

impl StageContext {
    pub(crate) fn new(
        run_id: Uuid,
        config: Arc<BuildConfiguration>,
        staging_dir: PathBuf,
        artifact_dir: PathBuf,
        previous_dir: PathBuf,
        cancel: CancellationToken,
        events: UnboundedSender<PipelineEvent>,
    ) -> Self {
        Self {
            run_id,
            stage: StageKind::Initializing,
            config,
            staging_dir,
            artifact_dir,
            previous_dir,
            cancel,
            events,
            pending: Vec::new(),
        }
    }

    /// Log a line: streamed as a [`PipelineEvent::Log`] and kept on the run.
    pub fn log(&mut self, line: impl Into<String>) {
        let line = line.into();
        let state = PipelineState::from(self.stage);
        obs::emit_stage_log(&self.run_id.to_string(), self.stage.name(), &line);
        let _ = self.events.send(PipelineEvent::Log {
            stage: state,
            line: line.clone(),
        });
        self.pending.push(LogEntry {
            at: Utc::now(),
            state,
            line,
        });
    }

    /// Root of the EFI tree inside the staging directory.
    pub fn oc_dir(&self) -> PathBuf {
        self.staging_dir.join("EFI").join("OC")
    }

    pub(crate) fn drain_log(&mut self) -> Vec<LogEntry> {
        std::mem::take(&mut self.pending)
    }
}

/// One step of a build.
///
/// Implementations may be swapped per [`StageKind`] on
/// [`crate::BuildPipeline::with_stage`]; sequencing stays with the pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    async fn execute(&self, ctx: &mut StageContext) -> Result<(), StageError>;
}

/// The stock implementation of every stage.
#[derive(Debug, Clone, Copy)]
pub struct DefaultStage(pub StageKind);

#[async_trait]
impl Stage for DefaultStage {
    async fn execute(&self, ctx: &mut StageContext) -> Result<(), StageError> {
        match self.0 {
            StageKind::Initializing => initialize(ctx).await,
            StageKind::ValidatingConfig => validate(ctx).await,
            StageKind::ApplyingPatches => apply_patches(ctx).await,
            StageKind::ConfiguringModules => configure_modules(ctx).await,
            StageKind::GeneratingIdentity => generate_identity(ctx).await,
            StageKind::GeneratingConfigFile => generate_config_file(ctx).await,
            StageKind::PackagingArtifact => package(ctx).await,
        }
    }
}

async fn write_json(path: &Path, value: &serde_json::Value) -> Result<(), StageError> {
    let content = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, content).await?;
    Ok(())
}

async fn initialize(ctx: &mut StageContext) -> Result<(), StageError> {
    ctx.log("Starting OpenCore EFI build...");

    if tokio::fs::try_exists(&ctx.staging_dir).await? {
        ctx.log(format!("removing stale staging directory {}", ctx.staging_dir.display()));
        tokio::fs::remove_dir_all(&ctx.staging_dir).await?;
    }
    tokio::fs::create_dir_all(ctx.oc_dir()).await?;
    Ok(())
}

async fn validate(ctx: &mut StageContext) -> Result<(), StageError> {
    ctx.log("Validating hardware report and configuration...");

    if ctx.artifact_dir.parent() != Some(ctx.config.output_dir().as_path()) {
        return Err(StageError::Failed(format!(
            "artifact {} must be a direct child of {}",
            ctx.artifact_dir.display(),
            ctx.config.output_dir().display()
        )));
    }
    let meta = tokio::fs::metadata(ctx.config.output_dir()).await?;
    if meta.permissions().readonly() {
        return Err(StageError::Failed(format!(
            "output destination {} is read-only",
            ctx.config.output_dir().display()
        )));
    }

    let target = ctx.config.target_version();
    let patches = ctx.config.patches().len();
    let modules = ctx.config.modules().len();
    ctx.log(format!("target {target}, {patches} patch(es), {modules} module(s)"));
    let warnings: Vec<String> = ctx.config.warnings().iter().map(|w| w.to_string()).collect();
    for w in warnings {
        ctx.log(format!("warning: {w}"));
    }
    Ok(())
}

async fn apply_patches(ctx: &mut StageContext) -> Result<(), StageError> {
    ctx.log("Applying ACPI patches...");

    let acpi = ctx.oc_dir().join("ACPI");
    tokio::fs::create_dir_all(&acpi).await?;

    // Names were resolved against the catalog when the configuration was finalized.
    let selected: Vec<_> = ctx
        .config
        .patches()
        .iter()
        .filter_map(|name| PATCH_CATALOG.get(name))
        .collect();
    let mut records = Vec::new();
    for record in selected {
        records.push(json!({
            "name": record.name(),
            "description": record.description,
            "priority": record.priority.to_string(),
        }));
        ctx.log(format!("applied {}", record.name()));
    }
    write_json(
        &acpi.join("patches.json"),
        &json!({ "catalog_version": PATCH_CATALOG.version, "patches": records }),
    )
    .await
}

async fn configure_modules(ctx: &mut StageContext) -> Result<(), StageError> {
    ctx.log("Configuring and copying Kext drivers...");

    let kexts = ctx.oc_dir().join("Kexts");
    tokio::fs::create_dir_all(&kexts).await?;

    let selected: Vec<_> = ctx
        .config
        .modules()
        .iter()
        .filter_map(|name| MODULE_CATALOG.get(name))
        .collect();
    for record in selected {
        let dir = kexts.join(record.name());
        tokio::fs::create_dir_all(&dir).await?;
        write_json(
            &dir.join("Info.json"),
            &json!({ "name": record.name(), "version": record.version }),
        )
        .await?;
        ctx.log(format!("added {} {}", record.name(), record.version));
    }
    Ok(())
}

async fn generate_identity(ctx: &mut StageContext) -> Result<(), StageError> {
    ctx.log("Generating SMBIOS information...");

    let identity = ctx.config.identity().clone();
    write_json(&ctx.oc_dir().join("smbios.json"), &serde_json::to_value(&identity)?).await?;
    ctx.log(format!("SMBIOS model {}", identity.model));
    Ok(())
}

async fn generate_config_file(ctx: &mut StageContext) -> Result<(), StageError> {
    ctx.log("Generating configuration file...");

    let cfg = &ctx.config;
    let document = json!({
        "generator": format!("opforge {}", opforge_core::VERSION),
        "target_version": cfg.target_version().number(),
        "smbios_model": cfg.identity().model.identifier(),
        "acpi": cfg.patches(),
        "kexts": cfg.modules(),
        "config_digest": cfg.digest()?,
    });
    write_json(&ctx.oc_dir().join("config.json"), &document).await?;
    ctx.log("config.json written");
    Ok(())
}

async fn package(ctx: &mut StageContext) -> Result<(), StageError> {
    ctx.log("Packaging EFI folder...");

    write_json(
        &ctx.staging_dir.join("BUILD-INFO.json"),
        &json!({
            "run_id": ctx.run_id,
            "built_at": Utc::now(),
            "target_version": ctx.config.target_version(),
        }),
    )
    .await?;

    if tokio::fs::try_exists(&ctx.previous_dir).await? {
        tokio::fs::remove_dir_all(&ctx.previous_dir).await?;
    }
    let replacing = tokio::fs::try_exists(&ctx.artifact_dir).await?;
    if replacing {
        ctx.log(format!("moving existing {} aside", ctx.artifact_dir.display()));
        tokio::fs::rename(&ctx.artifact_dir, &ctx.previous_dir).await?;
    }

    if let Err(e) = tokio::fs::rename(&ctx.staging_dir, &ctx.artifact_dir).await {
        if replacing {
            tokio::fs::rename(&ctx.previous_dir, &ctx.artifact_dir).await?;
        }
        return Err(e.into());
    }
    // The parked artifact is discarded by the pipeline once the run completes.
    ctx.log(format!("EFI packaged at {}", ctx.artifact_dir.display()));
    Ok(())
}
