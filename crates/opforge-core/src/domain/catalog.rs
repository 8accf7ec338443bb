//! Fixed, versioned catalogs of ACPI patches and driver modules.
//!
//! Catalogs are compiled into the binary as `static` data: they are read-only
//! for the life of the process and are only ever looked up by name.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{CatalogKind, EngineError, Result};

/// Patch priority as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::High => write!(f, "High"),
            Priority::Medium => write!(f, "Medium"),
            Priority::Low => write!(f, "Low"),
        }
    }
}

/// A known ACPI patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PatchRecord {
    pub name: &'static str,
    pub description: &'static str,
    pub priority: Priority,
    /// Which systems the patch is meant for.
    pub applicability: &'static str,
}

/// A known driver module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModuleRecord {
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
}

/// A versioned, read-only set of records.
#[derive(Debug)]
pub struct Catalog<R: 'static> {
    pub version: &'static str,
    kind: CatalogKind,
    records: &'static [R],
}

/// Records addressable by a unique name.
pub trait Named {
    fn name(&self) -> &'static str;
}

impl Named for PatchRecord {
    fn name(&self) -> &'static str {
        self.name
    }
}

impl Named for ModuleRecord {
    fn name(&self) -> &'static str {
        self.name
    }
}

impl<R: Named> Catalog<R> {
    pub fn records(&self) -> &'static [R] {
        self.records
    }

    pub fn get(&self, name: &str) -> Option<&'static R> {
        self.records.iter().find(|r| r.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Look up `name`, failing with [`EngineError::UnknownCatalogEntry`].
    pub fn require(&self, name: &str) -> Result<&'static R> {
        self.get(name).ok_or_else(|| EngineError::UnknownCatalogEntry {
            kind: self.kind,
            name: name.to_string(),
        })
    }

    /// Validate every name and collapse duplicates.
    pub fn resolve<I, S>(&self, names: I) -> Result<BTreeSet<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .map(|n| self.require(n.as_ref()).map(|r| r.name().to_string()))
            .collect()
    }
}

pub const FIX_HPET: &str = "FixHPET";
pub const FIX_RTC: &str = "FixRTC";
pub const SSDT_PLUG: &str = "SSDT-PLUG";
pub const SSDT_EC_USBX: &str = "SSDT-EC-USBX";
pub const SSDT_AWAC: &str = "SSDT-AWAC";
pub const SSDT_PNLF: &str = "SSDT-PNLF";
pub const SSDT_USBX: &str = "SSDT-USBX";
pub const SSDT_AWAC_DISABLE: &str = "SSDT-AWAC-DISABLE";

pub static PATCH_CATALOG: Catalog<PatchRecord> = Catalog {
    version: "2024.1",
    kind: CatalogKind::Patch,
    records: &[
        PatchRecord {
            name: FIX_HPET,
            description: "Fix HPET device",
            priority: Priority::High,
            applicability: "All systems",
        },
        PatchRecord {
            name: FIX_RTC,
            description: "Fix RTC clock",
            priority: Priority::High,
            applicability: "All systems",
        },
        PatchRecord {
            name: SSDT_PLUG,
            description: "CPU power management patch",
            priority: Priority::High,
            applicability: "All CPUs",
        },
        PatchRecord {
            name: SSDT_EC_USBX,
            description: "EC controller and USB power patch",
            priority: Priority::High,
            applicability: "All systems",
        },
        PatchRecord {
            name: SSDT_AWAC,
            description: "Fix AWAC clock",
            priority: Priority::Medium,
            applicability: "New motherboards",
        },
        PatchRecord {
            name: SSDT_PNLF,
            description: "Laptop brightness control",
            priority: Priority::Medium,
            applicability: "Laptop computers",
        },
        PatchRecord {
            name: SSDT_USBX,
            description: "USB power management optimization",
            priority: Priority::Medium,
            applicability: "USB 3.0+ systems",
        },
        PatchRecord {
            name: SSDT_AWAC_DISABLE,
            description: "Disable AWAC clock",
            priority: Priority::Low,
            applicability: "Specific motherboards",
        },
    ],
};

pub const LILU: &str = "Lilu.kext";
pub const VIRTUAL_SMC: &str = "VirtualSMC.kext";
pub const WHATEVER_GREEN: &str = "WhateverGreen.kext";
pub const APPLE_ALC: &str = "AppleALC.kext";
pub const INTEL_MAUSI: &str = "IntelMausi.kext";
pub const NVME_FIX: &str = "NVMeFix.kext";

pub static MODULE_CATALOG: Catalog<ModuleRecord> = Catalog {
    version: "2024.1",
    kind: CatalogKind::Module,
    records: &[
        ModuleRecord {
            name: LILU,
            version: "1.6.7",
            description: "Core patching framework",
        },
        ModuleRecord {
            name: VIRTUAL_SMC,
            version: "1.3.3",
            description: "SMC emulation",
        },
        ModuleRecord {
            name: WHATEVER_GREEN,
            version: "1.6.6",
            description: "Graphics patch",
        },
        ModuleRecord {
            name: APPLE_ALC,
            version: "1.8.8",
            description: "Audio driver",
        },
        ModuleRecord {
            name: INTEL_MAUSI,
            version: "1.0.7",
            description: "Intel network driver",
        },
        ModuleRecord {
            name: NVME_FIX,
            version: "1.1.1",
            description: "NVMe storage optimization",
        },
    ],
};
