//! opforge core library
//!
//! Hardware descriptor model, rule-based recommendation engine, identity
//! synthesis and build configuration assembly. Everything here is pure and
//! reentrant; the build pipeline lives in `opforge-build`.

pub mod compat;
pub mod config;
pub mod domain;
pub mod identity;
pub mod modules;
pub mod obs;
pub mod patches;
pub mod reporting;
pub mod settings;
pub mod telemetry;

pub use domain::{
    Attr, Catalog, CatalogKind, CpuSection, CpuVendor, DeviceModel, EngineError, GpuSection,
    HardwareDescriptor, ModuleRecord, MotherboardSection, Named, NetworkSection, PatchRecord,
    Priority, RamSection, Result, StorageDevice, SystemSection, TargetVersion, MODULE_CATALOG,
    PATCH_CATALOG,
};

pub use compat::{evaluate, recommended_versions, CompatibilityResult, Component, Finding, Tier};
pub use config::{BuildConfiguration, BuildConfigurationBuilder, ConfigWarning};
pub use identity::{synthesize, IdentityRecord};
pub use modules::{ModuleRecommendation, BASELINE_MODULES};
pub use patches::{
    merge_selection, PatchRecommendation, PatchRule, RuleNote, SelectionPolicy, BASELINE_PATCHES,
};
pub use reporting::{render_compat_report_md, render_hardware_overview};
pub use settings::{ForgeSettings, DEFAULT_ARTIFACT_NAME};
pub use telemetry::init_tracing;

pub use obs::{
    emit_recommendation, emit_run_failed, emit_run_finished, emit_run_started, emit_stage_entered,
    emit_stage_log, run_span, RunSpan,
};

/// Crate version, embedded in build artifacts.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
