//! opforge - hardware-aware OpenCore configuration CLI
//!
//! ## Commands
//!
//! - `check`: Evaluate a hardware report against a macOS release
//! - `recommend`: Recommend ACPI patches and kexts for a hardware report
//! - `identity`: Generate SMBIOS identity tokens
//! - `build`: Build an EFI folder from a hardware report
//! - `overview`: Print a short hardware summary

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use opforge_build::{BuildPipeline, BuildScheduler, PipelineEvent, RunOutcome};
use opforge_core::{
    emit_recommendation, evaluate, merge_selection, modules, patches, recommended_versions,
    render_compat_report_md, render_hardware_overview, synthesize, BuildConfiguration,
    DeviceModel, ForgeSettings, HardwareDescriptor, IdentityRecord, SelectionPolicy,
    TargetVersion,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "opforge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Hardware-aware OpenCore configuration and EFI builder", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate compatibility of a hardware report with a macOS release
    Check {
        /// Hardware report (JSON)
        report: PathBuf,

        /// Target release: "14", "sonoma", "macOS Sonoma (14)"
        #[arg(short, long, default_value = "14")]
        target: String,

        #[arg(long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Recommend ACPI patches and kexts
    Recommend {
        /// Hardware report (JSON)
        report: PathBuf,

        /// Patches already selected; recommendations are merged into these
        #[arg(long = "existing")]
        existing: Vec<String>,

        /// Replace prior selections instead of adding to them
        #[arg(long)]
        replace: bool,

        #[arg(long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Generate SMBIOS identity tokens for a model
    Identity {
        /// Model identifier, e.g. "iMac20,1"
        #[arg(short, long)]
        model: String,

        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Build an EFI folder
    Build {
        /// Hardware report (JSON)
        report: PathBuf,

        #[arg(short, long, default_value = "14")]
        target: String,

        #[arg(short, long)]
        model: String,

        /// Output destination
        #[arg(short, long, env = "OPFORGE_OUTPUT_DIR")]
        output: Option<PathBuf>,

        /// ACPI patch to include (repeatable)
        #[arg(long = "patch")]
        patches: Vec<String>,

        /// Kext to include (repeatable)
        #[arg(long = "module")]
        modules: Vec<String>,

        /// Add recommended patches and kexts to the explicit selection
        #[arg(long)]
        auto: bool,

        /// Seed for the identity tokens
        #[arg(long)]
        seed: Option<u64>,

        /// Cancel the build after this many seconds (0 = no limit)
        #[arg(long, env = "OPFORGE_BUILD_TIMEOUT_SECS")]
        timeout: Option<u64>,

        /// Name of the packaged directory
        #[arg(long, env = "OPFORGE_ARTIFACT_NAME")]
        artifact_name: Option<String>,
    },

    /// Print a short hardware overview
    Overview {
        /// Hardware report (JSON)
        report: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = ForgeSettings::from_env();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    opforge_core::init_tracing(cli.json || settings.json_logs, level);

    match cli.command {
        Commands::Check {
            report,
            target,
            format,
        } => cmd_check(&report, &target, format),
        Commands::Recommend {
            report,
            existing,
            replace,
            format,
        } => cmd_recommend(&report, existing, replace, format),
        Commands::Identity { model, seed } => cmd_identity(&model, seed),
        Commands::Build {
            report,
            target,
            model,
            output,
            patches,
            modules,
            auto,
            seed,
            timeout,
            artifact_name,
        } => {
            let mut settings = settings;
            if let Some(dir) = output {
                settings = settings.with_output_dir(dir);
            }
            if let Some(secs) = timeout {
                settings = settings.with_build_timeout(Duration::from_secs(secs));
            }
            if let Some(name) = artifact_name.as_deref() {
                settings = settings.with_artifact_name(name);
            }
            cmd_build(&settings, &report, &target, &model, patches, modules, auto, seed).await
        }
        Commands::Overview { report } => cmd_overview(&report),
    }
}

fn load_report(path: &Path) -> Result<HardwareDescriptor> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read hardware report {}", path.display()))?;
    HardwareDescriptor::from_json_str(&content)
        .with_context(|| format!("Invalid hardware report {}", path.display()))
}

fn parse_target(target: &str) -> Result<TargetVersion> {
    target.parse().context("Invalid --target")
}

fn generate_identity(model: &str, seed: Option<u64>) -> Result<IdentityRecord> {
    let model: DeviceModel = model.parse().context("Invalid --model")?;
    let identity = match seed {
        Some(seed) => synthesize(model, &mut StdRng::seed_from_u64(seed)),
        None => synthesize(model, &mut rand::thread_rng()),
    };
    identity.context("Failed to generate identity")
}

fn cmd_check(report: &Path, target: &str, format: Format) -> Result<()> {
    let descriptor = load_report(report)?;
    let target = parse_target(target)?;
    let result = evaluate(&descriptor, target).context("Compatibility check failed")?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => {
            let recommended = recommended_versions(&descriptor);
            print!("{}", render_compat_report_md(&result, &recommended));
        }
    }
    Ok(())
}

fn cmd_recommend(report: &Path, existing: Vec<String>, replace: bool, format: Format) -> Result<()> {
    let descriptor = load_report(report)?;
    let patch_rec = patches::recommend(&descriptor).context("Patch recommendation failed")?;
    let module_rec = modules::recommend(Some(&descriptor));

    let policy = if replace {
        SelectionPolicy::Replace
    } else {
        SelectionPolicy::Advisory
    };
    let existing: BTreeSet<String> = existing.into_iter().collect();
    let selected = merge_selection(&existing, &patch_rec, policy);

    let fired: Vec<&str> = patch_rec.trail.iter().map(|n| n.rule.name()).collect();
    emit_recommendation("patches", selected.len(), &fired.join(","));
    emit_recommendation("modules", module_rec.modules.len(), "");

    match format {
        Format::Json => {
            let doc = serde_json::json!({
                "patches": selected,
                "trail": patch_rec.trail,
                "modules": module_rec.modules,
                "module_reasons": module_rec.reasons,
            });
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
        Format::Text => {
            println!("ACPI patches:");
            for p in &selected {
                println!("  {p}");
            }
            println!("\nDetection:");
            for note in &patch_rec.trail {
                println!("  [{}] {}", note.rule.name(), note.note);
            }
            println!("\nKexts:");
            for m in &module_rec.modules {
                println!("  {m}");
            }
        }
    }
    Ok(())
}

fn cmd_identity(model: &str, seed: Option<u64>) -> Result<()> {
    let identity = generate_identity(model, seed)?;
    println!("{}", serde_json::to_string_pretty(&identity)?);
    Ok(())
}

fn cmd_overview(report: &Path) -> Result<()> {
    let descriptor = load_report(report)?;
    print!("{}", render_hardware_overview(&descriptor));
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_build(
    settings: &ForgeSettings,
    report: &Path,
    target: &str,
    model: &str,
    mut patch_names: Vec<String>,
    mut module_names: Vec<String>,
    auto: bool,
    seed: Option<u64>,
) -> Result<()> {
    let descriptor = Arc::new(load_report(report)?);
    let target = parse_target(target)?;
    let identity = generate_identity(model, seed)?;
    let output = settings
        .output_dir
        .clone()
        .context("No output destination: pass --output or set OPFORGE_OUTPUT_DIR")?;

    if auto {
        let rec = patches::recommend(&descriptor).context("Patch recommendation failed")?;
        let existing: BTreeSet<String> = patch_names.into_iter().collect();
        patch_names = merge_selection(&existing, &rec, SelectionPolicy::Advisory)
            .into_iter()
            .collect();
        module_names.extend(modules::recommend(Some(descriptor.as_ref())).modules);
    }

    let config = BuildConfiguration::builder(Arc::clone(&descriptor))
        .target_version(target)
        .identity(identity)
        .patches(patch_names)
        .modules(module_names)
        .output_dir(&output)
        .finalize()
        .context("Invalid build configuration")?;
    for w in config.warnings() {
        println!("warning: {w}");
    }

    let scheduler =
        BuildScheduler::new(BuildPipeline::new().with_artifact_name(&settings.artifact_name));
    let mut handle = scheduler
        .start(Arc::new(config))
        .context("Failed to start build")?;
    info!(run_id = %handle.run_id(), "build started");

    let deadline = settings
        .build_timeout
        .map(|t| tokio::time::Instant::now() + t);
    let mut cancel_requested = false;

    loop {
        let timeout = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            event = handle.events.recv() => match event {
                Some(PipelineEvent::Progress { percent, status, .. }) => println!("[{percent:>3}%] {status}"),
                Some(PipelineEvent::Log { line, .. }) => println!("       {line}"),
                Some(PipelineEvent::Finished { .. }) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !cancel_requested => {
                println!("Cancelling build...");
                handle.cancel();
                cancel_requested = true;
            }
            _ = timeout, if !cancel_requested => {
                println!("Build timed out, cancelling...");
                handle.cancel();
                cancel_requested = true;
            }
        }
    }

    let run = handle.wait().await.context("Build worker failed")?;
    match run.outcome() {
        Some(RunOutcome::Completed { artifact }) => {
            println!("OpenCore EFI successfully built: {}", artifact.display());
            Ok(())
        }
        Some(RunOutcome::Cancelled { before }) => {
            if let Some(partial) = run.partial_artifact() {
                println!("Partial output left at {} is not usable", partial.display());
            }
            anyhow::bail!("Build cancelled before {before}")
        }
        Some(RunOutcome::Failed { error, .. }) => anyhow::bail!("Build failed: {error}"),
        None => anyhow::bail!("Build ended without an outcome"),
    }
}
