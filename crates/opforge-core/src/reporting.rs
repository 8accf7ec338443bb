//! Plain-text and markdown renderings of engine output.

use crate::compat::CompatibilityResult;
use crate::domain::hardware::{Attr, HardwareDescriptor};
use crate::domain::version::TargetVersion;

const OVERVIEW_STORAGE_LIMIT: usize = 3;

fn text_or<'a>(attr: &'a Attr<String>, fallback: &'a str) -> &'a str {
    attr.text().unwrap_or(fallback)
}

/// Render markdown for a compatibility evaluation.
///
/// `recommended` is usually [`crate::compat::recommended_versions`] for the
/// same descriptor.
pub fn render_compat_report_md(result: &CompatibilityResult, recommended: &[TargetVersion]) -> String {
    let mut out = String::new();
    out.push_str("# Compatibility Report\n\n");
    out.push_str(&format!(
        "- target: {}\n- overall: {}\n\n",
        result.target_version, result.tier
    ));

    out.push_str("| Component | Verdict | Note |\n");
    out.push_str("|-----------|---------|------|\n");
    for f in &result.findings {
        out.push_str(&format!("| {} | {} | {} |\n", f.component, f.verdict, f.note));
    }
    out.push('\n');

    out.push_str("## Recommendation\n");
    if recommended.is_empty() {
        out.push_str("- no version fully supports this CPU; check the hardware report\n");
    } else {
        for v in recommended {
            out.push_str(&format!("- {} ({})\n", v, v.guidance()));
        }
    }
    out
}

/// Render the short hardware overview shown after a report is loaded.
pub fn render_hardware_overview(descriptor: &HardwareDescriptor) -> String {
    let mut out = String::from("Hardware overview\n\n");

    if let Some(cpu) = &descriptor.cpu {
        out.push_str(&format!("CPU: {}\n", text_or(&cpu.model, "Unknown")));
        if let (Some(cores), Some(threads)) = (cpu.cores.value(), cpu.threads.value()) {
            out.push_str(&format!("  {cores} cores / {threads} threads\n"));
        }
    }
    if let Some(mb) = &descriptor.motherboard {
        out.push_str(&format!("Motherboard: {}\n", text_or(&mb.model, "Unknown")));
        if let Some(chipset) = mb.chipset.text() {
            out.push_str(&format!("  chipset: {chipset}\n"));
        }
    }
    if let Some(gpu) = &descriptor.gpu {
        out.push_str(&format!("GPU: {}\n", text_or(&gpu.model, "Unknown")));
    }
    if let Some(ram) = &descriptor.ram {
        out.push_str(&format!("RAM: {}", text_or(&ram.size, "Unknown")));
        if let Some(speed) = ram.speed.text() {
            out.push_str(&format!(" @ {speed}"));
        }
        out.push('\n');
    }

    if !descriptor.storage.is_empty() {
        out.push_str("Storage:\n");
        for dev in descriptor.storage.iter().take(OVERVIEW_STORAGE_LIMIT) {
            out.push_str(&format!(
                "  - {} ({})\n",
                text_or(&dev.model, "Unknown"),
                text_or(&dev.capacity, "Unknown")
            ));
        }
        let rest = descriptor.storage.len().saturating_sub(OVERVIEW_STORAGE_LIMIT);
        if rest > 0 {
            out.push_str(&format!("  ... and {rest} more\n"));
        }
    }

    if let Some(net) = &descriptor.network {
        if let Some(eth) = net.ethernet.text() {
            out.push_str(&format!("Ethernet: {eth}\n"));
        }
        if let Some(wifi) = net.wifi.text() {
            out.push_str(&format!("Wi-Fi: {wifi}\n"));
        }
    }
    out
}
