//! Compatibility advisor for target OS versions.
//!
//! Evaluates a [`HardwareDescriptor`] against a [`TargetVersion`] to produce a
//! [`CompatibilityResult`]: one [`Finding`] per present component, in a fixed
//! order, and an overall [`Tier`] that is the most restrictive verdict.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::catalog::{NVME_FIX, SSDT_AWAC, SSDT_PLUG};
use crate::domain::hardware::{contains_any, CpuVendor, HardwareDescriptor};
use crate::domain::version::TargetVersion;
use crate::domain::{EngineError, Result};

/// Compatibility verdict, ordered from most to least restrictive.
///
/// `Unknown` sits between `Unsupported` and `CompatibleWithCaveats`, so an
/// unidentifiable component drags the overall tier below "works with caveats"
/// but never hides a hard incompatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Unsupported,
    Unknown,
    CompatibleWithCaveats,
    Compatible,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Unsupported => write!(f, "Unsupported"),
            Tier::Unknown => write!(f, "Unknown"),
            Tier::CompatibleWithCaveats => write!(f, "Compatible with caveats"),
            Tier::Compatible => write!(f, "Compatible"),
        }
    }
}

/// Hardware component a finding refers to, in reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Cpu,
    Gpu,
    Ram,
    Motherboard,
    Storage,
    Network,
}

impl Component {
    pub const ORDER: [Component; 6] = [
        Component::Cpu,
        Component::Gpu,
        Component::Ram,
        Component::Motherboard,
        Component::Storage,
        Component::Network,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Component::Cpu => "cpu",
            Component::Gpu => "gpu",
            Component::Ram => "ram",
            Component::Motherboard => "motherboard",
            Component::Storage => "storage",
            Component::Network => "network",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Verdict for a single component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub component: Component,
    pub verdict: Tier,
    /// Human-readable rationale.
    pub note: String,
}

impl Finding {
    fn new(component: Component, verdict: Tier, note: impl Into<String>) -> Self {
        Self {
            component,
            verdict,
            note: note.into(),
        }
    }
}

/// The outcome of evaluating a descriptor against one target version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityResult {
    pub target_version: TargetVersion,
    pub tier: Tier,
    pub findings: Vec<Finding>,
}

impl CompatibilityResult {
    pub fn finding(&self, component: Component) -> Option<&Finding> {
        self.findings.iter().find(|f| f.component == component)
    }
}

/// Minimum Intel core generation considered fully compatible per release.
const MIN_INTEL_GENERATION: [(TargetVersion, u32); 6] = [
    (TargetVersion::Sonoma, 11),
    (TargetVersion::Ventura, 8),
    (TargetVersion::Monterey, 6),
    (TargetVersion::BigSur, 4),
    (TargetVersion::Catalina, 2),
    (TargetVersion::Mojave, 1),
];

/// Generations below the minimum that still boot with caveats.
const CAVEAT_WINDOW: u32 = 2;

#[derive(Debug, Clone, Copy)]
enum GpuBucket {
    NativeFull,
    Native,
    /// Supported up to and including `max`.
    Capped { max: TargetVersion },
}

/// Tested in order; first match wins.
const GPU_BUCKETS: [(GpuBucket, &[&str]); 3] = [
    (GpuBucket::NativeFull, &["intel iris", "intel uhd", "intel hd"]),
    (GpuBucket::Native, &["amd", "radeon"]),
    (
        GpuBucket::Capped {
            max: TargetVersion::Mojave,
        },
        &["nvidia", "gtx", "rtx"],
    ),
];

fn min_generation(target: TargetVersion) -> u32 {
    MIN_INTEL_GENERATION
        .iter()
        .find(|(v, _)| *v == target)
        .map(|(_, g)| *g)
        .unwrap_or(u32::MAX)
}

/// Evaluate `descriptor` for `target`.
///
/// Fails only when the descriptor carries neither a CPU nor a motherboard
/// section; missing or malformed attributes produce `Unknown` findings.
pub fn evaluate(descriptor: &HardwareDescriptor, target: TargetVersion) -> Result<CompatibilityResult> {
    if !descriptor.has_anchor() {
        return Err(EngineError::InvalidHardwareData {
            rule: "compatibility",
            reason: "a cpu or motherboard section is required to determine a tier".to_string(),
        });
    }

    let findings: Vec<Finding> = Component::ORDER
        .iter()
        .filter_map(|c| check_component(*c, descriptor, target))
        .collect();

    let tier = findings
        .iter()
        .map(|f| f.verdict)
        .min()
        .unwrap_or(Tier::Unknown);

    Ok(CompatibilityResult {
        target_version: target,
        tier,
        findings,
    })
}

/// Up to two newest releases for which the CPU is fully compatible.
pub fn recommended_versions(descriptor: &HardwareDescriptor) -> Vec<TargetVersion> {
    TargetVersion::ALL
        .into_iter()
        .filter(|v| {
            check_component(Component::Cpu, descriptor, *v)
                .map(|f| f.verdict == Tier::Compatible)
                .unwrap_or(false)
        })
        .take(2)
        .collect()
}

fn check_component(
    component: Component,
    d: &HardwareDescriptor,
    target: TargetVersion,
) -> Option<Finding> {
    match component {
        Component::Cpu => d.cpu.as_ref().map(|_| check_cpu(d, target)),
        Component::Gpu => d.gpu.as_ref().map(|gpu| {
            let Some(model) = gpu.model.text() else {
                return Finding::new(component, Tier::Unknown, "GPU model not reported");
            };
            check_gpu(model, target)
        }),
        Component::Ram => d.ram.as_ref().map(|ram| match ram.size.text() {
            Some(size) => Finding::new(component, Tier::Compatible, format!("{size} installed")),
            None => Finding::new(component, Tier::Unknown, "memory size not reported"),
        }),
        Component::Motherboard => d.motherboard.as_ref().map(|mb| {
            let label = mb.chipset.text().or(mb.model.text());
            match label {
                None => Finding::new(component, Tier::Unknown, "motherboard chipset not reported"),
                Some(label) if mb.is_newer_chipset() => {
                    Finding::new(
                        component,
                        Tier::Compatible,
                        format!("{label}: newer chipset, {SSDT_AWAC} clock patch required"),
                    )
                }
                Some(label) => Finding::new(component, Tier::Compatible, label.to_string()),
            }
        }),
        Component::Storage => {
            if d.storage.is_empty() {
                return None;
            }
            let identified = d
                .storage
                .iter()
                .filter(|s| s.model.is_known() || s.kind.is_known())
                .count();
            Some(if identified == 0 {
                Finding::new(component, Tier::Unknown, "no identifiable storage device")
            } else if d.has_nvme() {
                Finding::new(
                    component,
                    Tier::Compatible,
                    format!("{identified} device(s); NVMe present, {NVME_FIX} recommended"),
                )
            } else {
                Finding::new(component, Tier::Compatible, format!("{identified} device(s)"))
            })
        }
        Component::Network => d.network.as_ref().map(|net| {
            match (net.ethernet.text(), net.wifi.text()) {
                (Some(eth), _) if contains_any(eth, &["intel"]) => {
                    Finding::new(component, Tier::Compatible, format!("{eth}: supported ethernet"))
                }
                (Some(eth), _) => Finding::new(
                    component,
                    Tier::CompatibleWithCaveats,
                    format!("{eth}: may require a third-party driver"),
                ),
                (None, Some(wifi)) => Finding::new(
                    component,
                    Tier::CompatibleWithCaveats,
                    format!("{wifi}: wireless only, may require a third-party driver"),
                ),
                (None, None) => Finding::new(component, Tier::Unknown, "network adapters not reported"),
            }
        }),
    }
}

fn check_cpu(d: &HardwareDescriptor, target: TargetVersion) -> Finding {
    let component = Component::Cpu;
    let Some(cpu) = d.cpu.as_ref() else {
        return Finding::new(component, Tier::Unknown, "CPU not reported");
    };

    match cpu.vendor_class() {
        Some(CpuVendor::Intel) => {
            let Some(generation) = cpu.generation() else {
                return Finding::new(component, Tier::Unknown, "Intel CPU generation could not be determined");
            };
            let min = min_generation(target);
            if generation >= min {
                Finding::new(
                    component,
                    Tier::Compatible,
                    format!("generation {generation} meets the {target} minimum (generation {min}); ensure Hyper-Threading is enabled"),
                )
            } else if generation + CAVEAT_WINDOW >= min {
                Finding::new(
                    component,
                    Tier::CompatibleWithCaveats,
                    format!("generation {generation} is below the {target} minimum (generation {min}); expect reduced stability"),
                )
            } else {
                Finding::new(
                    component,
                    Tier::Unsupported,
                    format!("generation {generation} is too old for {target} (minimum generation {min})"),
                )
            }
        }
        Some(CpuVendor::Amd) => Finding::new(
            component,
            Tier::CompatibleWithCaveats,
            format!("AMD CPU requires the {SSDT_PLUG} power-management patch"),
        ),
        Some(CpuVendor::Other) => Finding::new(component, Tier::Unknown, "unrecognized CPU vendor"),
        None => Finding::new(component, Tier::Unknown, "CPU vendor not reported"),
    }
}

fn check_gpu(model: &str, target: TargetVersion) -> Finding {
    let component = Component::Gpu;
    let bucket = GPU_BUCKETS
        .iter()
        .find(|(_, keywords)| contains_any(model, keywords))
        .map(|(bucket, _)| *bucket);

    match bucket {
        Some(GpuBucket::NativeFull) => {
            Finding::new(component, Tier::Compatible, format!("{model}: native full support"))
        }
        Some(GpuBucket::Native) => {
            Finding::new(component, Tier::Compatible, format!("{model}: native support"))
        }
        Some(GpuBucket::Capped { max }) if target <= max => Finding::new(
            component,
            Tier::CompatibleWithCaveats,
            format!("{model}: limited support, only up to {max}"),
        ),
        Some(GpuBucket::Capped { max }) => Finding::new(
            component,
            Tier::Unsupported,
            format!("{model}: unsupported after {max}"),
        ),
        None => Finding::new(component, Tier::Unknown, format!("{model}: compatibility unknown")),
    }
}
