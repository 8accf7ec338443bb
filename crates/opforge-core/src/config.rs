//! Finalized build configuration.
//!
//! [`BuildConfigurationBuilder::finalize`] is the single validation gate: a
//! [`BuildConfiguration`] that exists is well-formed, and nothing downstream
//! re-validates it.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::domain::catalog::{MODULE_CATALOG, PATCH_CATALOG};
use crate::domain::hardware::HardwareDescriptor;
use crate::domain::version::TargetVersion;
use crate::domain::{EngineError, Result};
use crate::identity::IdentityRecord;

/// Non-blocking issue found while finalizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigWarning {
    NoPatches,
    NoModules,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::NoPatches => write!(f, "no ACPI patches selected"),
            ConfigWarning::NoModules => write!(f, "no driver modules selected"),
        }
    }
}

/// Immutable set of choices a build runs against.
#[derive(Debug, Clone, Serialize)]
pub struct BuildConfiguration {
    descriptor: Arc<HardwareDescriptor>,
    target_version: TargetVersion,
    identity: IdentityRecord,
    patches: BTreeSet<String>,
    modules: BTreeSet<String>,
    output_dir: PathBuf,
    #[serde(skip)]
    warnings: Vec<ConfigWarning>,
}

impl BuildConfiguration {
    pub fn builder(descriptor: impl Into<Arc<HardwareDescriptor>>) -> BuildConfigurationBuilder {
        BuildConfigurationBuilder {
            descriptor: descriptor.into(),
            target_version: None,
            identity: None,
            patches: Vec::new(),
            modules: Vec::new(),
            output_dir: None,
        }
    }

    pub fn descriptor(&self) -> &Arc<HardwareDescriptor> {
        &self.descriptor
    }

    pub fn target_version(&self) -> TargetVersion {
        self.target_version
    }

    pub fn identity(&self) -> &IdentityRecord {
        &self.identity
    }

    pub fn patches(&self) -> &BTreeSet<String> {
        &self.patches
    }

    pub fn modules(&self) -> &BTreeSet<String> {
        &self.modules
    }

    pub fn output_dir(&self) -> &PathBuf {
        &self.output_dir
    }

    pub fn warnings(&self) -> &[ConfigWarning] {
        &self.warnings
    }

    /// SHA-256 over the canonical JSON form (object keys sorted).
    pub fn digest(&self) -> Result<String> {
        // serde_json::Value maps are ordered, so this is key-sorted.
        let canonical = serde_json::to_value(self)?;
        let bytes = serde_json::to_vec(&canonical)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}

/// Collects choices for a [`BuildConfiguration`].
#[derive(Debug, Clone)]
pub struct BuildConfigurationBuilder {
    descriptor: Arc<HardwareDescriptor>,
    target_version: Option<TargetVersion>,
    identity: Option<IdentityRecord>,
    patches: Vec<String>,
    modules: Vec<String>,
    output_dir: Option<PathBuf>,
}

impl BuildConfigurationBuilder {
    pub fn target_version(mut self, version: TargetVersion) -> Self {
        self.target_version = Some(version);
        self
    }

    pub fn identity(mut self, identity: IdentityRecord) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn patch(mut self, name: impl Into<String>) -> Self {
        self.patches.push(name.into());
        self
    }

    pub fn patches<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patches.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn module(mut self, name: impl Into<String>) -> Self {
        self.modules.push(name.into());
        self
    }

    pub fn modules<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modules.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Validate and freeze.
    ///
    /// Required fields are checked first, then every patch and module name
    /// against its catalog. Empty sets only produce warnings.
    pub fn finalize(self) -> Result<BuildConfiguration> {
        let target_version = self
            .target_version
            .ok_or(EngineError::MissingField("target version"))?;
        let identity = self.identity.ok_or(EngineError::MissingField("identity"))?;
        let output_dir = self
            .output_dir
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or(EngineError::MissingField("output destination"))?;

        identity.validate()?;
        let patches = PATCH_CATALOG.resolve(&self.patches)?;
        let modules = MODULE_CATALOG.resolve(&self.modules)?;

        let mut warnings = Vec::new();
        if patches.is_empty() {
            warnings.push(ConfigWarning::NoPatches);
        }
        if modules.is_empty() {
            warnings.push(ConfigWarning::NoModules);
        }
        for w in &warnings {
            warn!(warning = %w, "build configuration finalized with warning");
        }

        Ok(BuildConfiguration {
            descriptor: self.descriptor,
            target_version,
            identity,
            patches,
            modules,
            output_dir,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::{FIX_HPET, LILU};
    use crate::domain::version::DeviceModel;
    use crate::domain::CatalogKind;
    use crate::identity::synthesize;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn identity() -> IdentityRecord {
        synthesize(DeviceModel::IMac20_1, &mut StdRng::seed_from_u64(1)).unwrap()
    }

    #[test]
    fn test_missing_target_version() {
        let err = BuildConfiguration::builder(HardwareDescriptor::default())
            .identity(identity())
            .output_dir("/tmp/out")
            .finalize()
            .unwrap_err();
        assert!(matches!(err, EngineError::MissingField("target version")));
    }

    #[test]
    fn test_missing_output_destination() {
        let err = BuildConfiguration::builder(HardwareDescriptor::default())
            .target_version(TargetVersion::Sonoma)
            .identity(identity())
            .finalize()
            .unwrap_err();
        assert!(matches!(err, EngineError::MissingField("output destination")));
    }

    #[test]
    fn test_unknown_module_fails_fast() {
        let err = BuildConfiguration::builder(HardwareDescriptor::default())
            .target_version(TargetVersion::Sonoma)
            .identity(identity())
            .output_dir("/tmp/out")
            .module("Bogus.kext")
            .finalize()
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::UnknownCatalogEntry {
                kind: CatalogKind::Module,
                ..
            }
        ));
    }

    #[test]
    fn test_empty_sets_warn_but_succeed() {
        let cfg = BuildConfiguration::builder(HardwareDescriptor::default())
            .target_version(TargetVersion::Ventura)
            .identity(identity())
            .output_dir("/tmp/out")
            .finalize()
            .unwrap();
        assert_eq!(
            cfg.warnings(),
            &[ConfigWarning::NoPatches, ConfigWarning::NoModules]
        );
    }

    #[test]
    fn test_duplicates_collapse_and_digest_is_stable() {
        let build = || {
            BuildConfiguration::builder(HardwareDescriptor::default())
                .target_version(TargetVersion::Ventura)
                .identity(identity())
                .output_dir("/tmp/out")
                .patches([FIX_HPET, FIX_HPET])
                .modules([LILU])
                .finalize()
                .unwrap()
        };
        let a = build();
        assert_eq!(a.patches().len(), 1);
        assert!(a.warnings().is_empty());
        assert_eq!(a.digest().unwrap(), build().digest().unwrap());
        assert_eq!(a.digest().unwrap().len(), 64);
    }
}
