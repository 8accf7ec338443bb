//! Driver module recommendation.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::catalog::{APPLE_ALC, INTEL_MAUSI, LILU, NVME_FIX, VIRTUAL_SMC, WHATEVER_GREEN};
use crate::domain::hardware::HardwareDescriptor;

/// Modules every build carries.
pub const BASELINE_MODULES: [&str; 4] = [LILU, VIRTUAL_SMC, WHATEVER_GREEN, APPLE_ALC];

/// Recommended module set with a reason per conditional addition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRecommendation {
    pub modules: BTreeSet<String>,
    pub reasons: Vec<String>,
}

impl ModuleRecommendation {
    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains(name)
    }

    /// True when nothing beyond the baseline was added.
    pub fn is_baseline(&self) -> bool {
        self.modules.len() == BASELINE_MODULES.len()
            && BASELINE_MODULES.iter().all(|m| self.modules.contains(*m))
    }
}

/// Recommend modules for an optional descriptor.
///
/// Never fails. With no descriptor, or one without any sections, the result
/// is exactly the baseline.
pub fn recommend(descriptor: Option<&HardwareDescriptor>) -> ModuleRecommendation {
    let mut modules: BTreeSet<String> = BASELINE_MODULES.iter().map(|m| m.to_string()).collect();
    let mut reasons = vec![format!("baseline: {}", BASELINE_MODULES.join(", "))];

    if let Some(d) = descriptor.filter(|d| !d.is_empty()) {
        if d.has_intel_ethernet() {
            modules.insert(INTEL_MAUSI.to_string());
            reasons.push(format!("Intel ethernet controller detected, adding {INTEL_MAUSI}"));
        }
        if d.has_nvme() {
            modules.insert(NVME_FIX.to_string());
            reasons.push(format!("NVMe storage detected, adding {NVME_FIX}"));
        }
    }

    tracing::debug!(count = modules.len(), "module recommendation computed");
    ModuleRecommendation { modules, reasons }
}
