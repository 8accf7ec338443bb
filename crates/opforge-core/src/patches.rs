//! ACPI patch recommendation.
//!
//! Rules are independent and additive: each inspects the descriptor and may
//! add patches, none removes one. The output is a canonical sorted set, so the
//! order rules run in never affects the result.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::catalog::{FIX_HPET, FIX_RTC, SSDT_AWAC, SSDT_EC_USBX, SSDT_PLUG, SSDT_PNLF};
use crate::domain::hardware::{CpuVendor, HardwareDescriptor};
use crate::domain::{EngineError, Result};

/// Patches every build starts from, independent of hardware.
pub const BASELINE_PATCHES: [&str; 4] = [FIX_HPET, FIX_RTC, SSDT_PLUG, SSDT_EC_USBX];

const LAPTOP_PATCHES: &[&str] = &[SSDT_PNLF];
const CHIPSET_PATCHES: &[&str] = &[SSDT_AWAC];
const SECONDARY_VENDOR_PATCHES: &[&str] = &[SSDT_PLUG];

/// A single recommendation rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchRule {
    /// Clock and CPU power-management fixes needed by every system.
    Baseline,
    /// Portable chassis needs backlight control.
    LaptopBrightness,
    /// 300-series and newer chipsets need the AWAC clock fix.
    NewerChipset,
    /// AMD CPUs depend on the power-management patch.
    SecondaryVendorPower,
}

impl PatchRule {
    pub const ALL: [PatchRule; 4] = [
        PatchRule::Baseline,
        PatchRule::LaptopBrightness,
        PatchRule::NewerChipset,
        PatchRule::SecondaryVendorPower,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PatchRule::Baseline => "baseline",
            PatchRule::LaptopBrightness => "laptop-brightness",
            PatchRule::NewerChipset => "newer-chipset",
            PatchRule::SecondaryVendorPower => "secondary-vendor-power",
        }
    }

    /// Patches this rule contributes for `d`, with a note, if it fires.
    pub fn apply(&self, d: &HardwareDescriptor) -> Option<(&'static [&'static str], String)> {
        match self {
            PatchRule::Baseline => Some((
                &BASELINE_PATCHES[..],
                format!("basic patches: {}", BASELINE_PATCHES.join(", ")),
            )),
            PatchRule::LaptopBrightness => d.is_laptop().then(|| {
                (
                    LAPTOP_PATCHES,
                    format!("laptop chassis detected, adding {SSDT_PNLF} (brightness control)"),
                )
            }),
            PatchRule::NewerChipset => {
                let mb = d.motherboard.as_ref()?;
                mb.is_newer_chipset()
                    .then(|| {
                        (
                            CHIPSET_PATCHES,
                            format!("newer motherboard chipset detected, adding {SSDT_AWAC} (AWAC clock fix)"),
                        )
                    })
            }
            PatchRule::SecondaryVendorPower => (d.cpu_vendor() == Some(CpuVendor::Amd)).then(|| {
                (
                    SECONDARY_VENDOR_PATCHES,
                    format!("AMD CPU detected, ensuring {SSDT_PLUG} power management is enabled"),
                )
            }),
        }
    }
}

/// One fired rule in the detection trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleNote {
    pub rule: PatchRule,
    pub note: String,
}

/// Recommended patch set plus the rules that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchRecommendation {
    pub patches: BTreeSet<String>,
    pub trail: Vec<RuleNote>,
}

impl PatchRecommendation {
    pub fn contains(&self, name: &str) -> bool {
        self.patches.contains(name)
    }
}

/// Recommend patches for `descriptor`.
///
/// Fails with [`EngineError::InvalidHardwareData`] when the descriptor has no
/// sections: an empty report is a caller mistake, not "no patches needed".
pub fn recommend(descriptor: &HardwareDescriptor) -> Result<PatchRecommendation> {
    if descriptor.is_empty() {
        return Err(EngineError::InvalidHardwareData {
            rule: PatchRule::Baseline.name(),
            reason: "hardware report has no sections".to_string(),
        });
    }

    let mut patches = BTreeSet::new();
    let mut trail = Vec::new();

    for rule in PatchRule::ALL {
        if let Some((names, note)) = rule.apply(descriptor) {
            patches.extend(names.iter().map(|n| n.to_string()));
            trail.push(RuleNote { rule, note });
        }
    }

    tracing::debug!(count = patches.len(), rules = trail.len(), "patch recommendation computed");
    Ok(PatchRecommendation { patches, trail })
}

/// How a recommendation is combined with an existing user selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Add recommended patches, keep everything the user already chose.
    #[default]
    Advisory,
    /// Recommended patches plus the clock and power baseline; other prior
    /// choices are dropped.
    Replace,
}

/// Combine `existing` with `recommendation` under `policy`.
pub fn merge_selection(
    existing: &BTreeSet<String>,
    recommendation: &PatchRecommendation,
    policy: SelectionPolicy,
) -> BTreeSet<String> {
    match policy {
        SelectionPolicy::Advisory => existing.union(&recommendation.patches).cloned().collect(),
        SelectionPolicy::Replace => {
            const KEEP: [&str; 3] = [FIX_HPET, FIX_RTC, SSDT_PLUG];
            let mut merged = recommendation.patches.clone();
            merged.extend(
                existing
                    .iter()
                    .filter(|p| KEEP.contains(&p.as_str()))
                    .cloned(),
            );
            merged
        }
    }
}
