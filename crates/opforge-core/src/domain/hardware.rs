//! Normalized hardware descriptor.
//!
//! Every attribute is an explicit tri-state [`Attr`]: a usable value, a value
//! the report mentions but that is unusable (`null`, empty, `"Unknown"`, or of
//! the wrong type), or nothing at all. Recommenders branch on that state
//! instead of probing loosely typed maps, and a malformed attribute can never
//! fail a parse.

use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::error::{EngineError, Result};

/// Tri-state attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attr<T> {
    /// Present with a usable value.
    Value(T),
    /// Present in the report but unusable.
    Unknown,
    /// Not mentioned at all.
    Absent,
}

impl<T> Default for Attr<T> {
    fn default() -> Self {
        Attr::Absent
    }
}

impl<T> Attr<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Attr::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Attr::Value(_))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Attr::Unknown)
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Attr::Absent)
    }
}

impl Attr<String> {
    /// Borrow the text value, if known.
    pub fn text(&self) -> Option<&str> {
        self.value().map(String::as_str)
    }

    /// Case-insensitive substring match against any of `keywords`.
    pub fn contains_any(&self, keywords: &[&str]) -> bool {
        self.text()
            .map(|t| contains_any(t, keywords))
            .unwrap_or(false)
    }
}

impl<T> From<T> for Attr<T> {
    fn from(value: T) -> Self {
        Attr::Value(value)
    }
}

impl From<&str> for Attr<String> {
    fn from(value: &str) -> Self {
        Attr::Value(value.to_string())
    }
}

impl<T: DeserializeOwned> Attr<T> {
    /// Classify a raw JSON value.
    pub fn from_json(raw: Value) -> Self {
        match &raw {
            Value::Null => return Attr::Unknown,
            Value::String(s) if s.trim().is_empty() || s.trim().eq_ignore_ascii_case("unknown") => {
                return Attr::Unknown
            }
            _ => {}
        }

        if let Ok(v) = serde_json::from_value::<T>(raw.clone()) {
            return Attr::Value(v);
        }

        // Numbers arrive as strings ("8", "11") and text as numbers (16).
        let coerced = match &raw {
            Value::String(s) => s.trim().parse::<u64>().ok().map(Value::from),
            Value::Number(n) => Some(Value::String(n.to_string())),
            _ => None,
        };
        if let Some(v) = coerced.and_then(|c| serde_json::from_value::<T>(c).ok()) {
            return Attr::Value(v);
        }

        Attr::Unknown
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Attr<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(Attr::from_json(raw))
    }
}

impl<T: Serialize> Serialize for Attr<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Attr::Value(v) => v.serialize(serializer),
            _ => serializer.serialize_none(),
        }
    }
}

/// Case-insensitive substring match.
pub fn contains_any(haystack: &str, keywords: &[&str]) -> bool {
    let haystack = haystack.to_ascii_lowercase();
    keywords
        .iter()
        .any(|k| haystack.contains(&k.to_ascii_lowercase()))
}

/// Chassis / product identification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemSection {
    #[serde(default, alias = "form_factor", skip_serializing_if = "Attr::is_absent")]
    pub chassis: Attr<String>,
    #[serde(default, skip_serializing_if = "Attr::is_absent")]
    pub model: Attr<String>,
    #[serde(default, skip_serializing_if = "Attr::is_absent")]
    pub manufacturer: Attr<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuSection {
    #[serde(default, skip_serializing_if = "Attr::is_absent")]
    pub vendor: Attr<String>,
    #[serde(default, skip_serializing_if = "Attr::is_absent")]
    pub model: Attr<String>,
    #[serde(default, alias = "generationHint", skip_serializing_if = "Attr::is_absent")]
    pub generation_hint: Attr<u32>,
    #[serde(default, skip_serializing_if = "Attr::is_absent")]
    pub cores: Attr<u32>,
    #[serde(default, skip_serializing_if = "Attr::is_absent")]
    pub threads: Attr<u32>,
}

/// CPU vendor classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CpuVendor {
    /// Intel: generation table applies.
    Intel,
    /// AMD: supported with an extra power-management patch.
    Amd,
    Other,
}

const INTEL_KEYWORDS: &[&str] = &["intel", "genuineintel"];
const AMD_KEYWORDS: &[&str] = &["amd", "authenticamd", "ryzen"];

fn generation_regexes() -> &'static [Regex; 2] {
    static RE: OnceLock<[Regex; 2]> = OnceLock::new();
    RE.get_or_init(|| {
        [
            // "11th Gen", "8th generation"
            Regex::new(r"(?i)\b(\d{1,2})(?:st|nd|rd|th)\s*gen").expect("static regex"),
            // "i7-8700K", "i9-12900K"
            Regex::new(r"(?i)\bi[3579]-(\d{4,5})").expect("static regex"),
        ]
    })
}

impl CpuSection {
    /// Vendor from the explicit attribute, falling back to the model string.
    pub fn vendor_class(&self) -> Option<CpuVendor> {
        let classify = |s: &str| {
            if contains_any(s, INTEL_KEYWORDS) {
                Some(CpuVendor::Intel)
            } else if contains_any(s, AMD_KEYWORDS) {
                Some(CpuVendor::Amd)
            } else {
                None
            }
        };

        if let Some(v) = self.vendor.text() {
            return Some(classify(v).unwrap_or(CpuVendor::Other));
        }
        self.model.text().and_then(classify)
    }

    /// Core generation from the hint, falling back to the model string.
    pub fn generation(&self) -> Option<u32> {
        if let Some(g) = self.generation_hint.value() {
            return Some(*g);
        }
        let model = self.model.text()?;
        let [ordinal, sku] = generation_regexes();

        if let Some(caps) = ordinal.captures(model) {
            return caps[1].parse().ok();
        }
        if let Some(caps) = sku.captures(model) {
            let digits = &caps[1];
            let prefix = if digits.len() == 5 { &digits[..2] } else { &digits[..1] };
            return prefix.parse().ok();
        }
        None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuSection {
    #[serde(default, skip_serializing_if = "Attr::is_absent")]
    pub model: Attr<String>,
    #[serde(default, skip_serializing_if = "Attr::is_absent")]
    pub vram: Attr<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RamSection {
    #[serde(default, skip_serializing_if = "Attr::is_absent")]
    pub size: Attr<String>,
    #[serde(default, skip_serializing_if = "Attr::is_absent")]
    pub speed: Attr<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotherboardSection {
    #[serde(default, skip_serializing_if = "Attr::is_absent")]
    pub model: Attr<String>,
    #[serde(default, skip_serializing_if = "Attr::is_absent")]
    pub chipset: Attr<String>,
}

const NEWER_CHIPSETS: &[&str] = &[
    "z390", "z490", "z590", "z690", "b360", "b460", "b560", "b660",
];

impl MotherboardSection {
    /// 300-series and later boards that ship an AWAC clock instead of RTC.
    pub fn is_newer_chipset(&self) -> bool {
        self.chipset.contains_any(NEWER_CHIPSETS) || self.model.contains_any(NEWER_CHIPSETS)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDevice {
    #[serde(default, skip_serializing_if = "Attr::is_absent")]
    pub model: Attr<String>,
    #[serde(default, skip_serializing_if = "Attr::is_absent")]
    pub capacity: Attr<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Attr::is_absent")]
    pub kind: Attr<String>,
}

impl StorageDevice {
    pub fn is_nvme(&self) -> bool {
        self.kind.contains_any(&["nvme"]) || self.model.contains_any(&["nvme"])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSection {
    #[serde(default, skip_serializing_if = "Attr::is_absent")]
    pub ethernet: Attr<String>,
    #[serde(default, skip_serializing_if = "Attr::is_absent")]
    pub wifi: Attr<String>,
}

/// Normalized hardware report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<CpuSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<GpuSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ram: Option<RamSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motherboard: Option<MotherboardSection>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub storage: Vec<StorageDevice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkSection>,
}

impl HardwareDescriptor {
    /// Build a descriptor from a parsed report document.
    ///
    /// The document must be a JSON object; section contents are lenient.
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(EngineError::InvalidHardwareData {
                rule: "report",
                reason: "hardware report must be a JSON object".to_string(),
            });
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(s)?;
        Self::from_value(value)
    }

    /// No sections at all.
    pub fn is_empty(&self) -> bool {
        self.system.is_none()
            && self.cpu.is_none()
            && self.gpu.is_none()
            && self.ram.is_none()
            && self.motherboard.is_none()
            && self.storage.is_empty()
            && self.network.is_none()
    }

    /// A CPU or motherboard section is present.
    pub fn has_anchor(&self) -> bool {
        self.cpu.is_some() || self.motherboard.is_some()
    }

    pub fn cpu_vendor(&self) -> Option<CpuVendor> {
        self.cpu.as_ref().and_then(CpuSection::vendor_class)
    }

    /// Whether the chassis (or, failing that, the product model) names a portable.
    pub fn is_laptop(&self) -> bool {
        const LAPTOP_KEYWORDS: &[&str] = &["laptop", "notebook"];
        let Some(system) = &self.system else {
            return false;
        };
        match &system.chassis {
            Attr::Value(c) => contains_any(c, LAPTOP_KEYWORDS),
            _ => system.model.contains_any(LAPTOP_KEYWORDS),
        }
    }

    pub fn has_nvme(&self) -> bool {
        self.storage.iter().any(StorageDevice::is_nvme)
    }

    pub fn has_intel_ethernet(&self) -> bool {
        self.network
            .as_ref()
            .map(|n| n.ethernet.contains_any(&["intel"]))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attr_tri_state_from_json() {
        let d = HardwareDescriptor::from_value(json!({
            "cpu": { "model": "Intel Core i7", "vendor": null, "cores": "eight" }
        }))
        .unwrap();
        let cpu = d.cpu.unwrap();
        assert_eq!(cpu.model.text(), Some("Intel Core i7"));
        assert!(cpu.vendor.is_unknown());
        assert!(cpu.cores.is_unknown());
        assert!(cpu.threads.is_absent());
    }

    #[test]
    fn test_unknown_literal_is_unknown() {
        let d = HardwareDescriptor::from_value(json!({ "ram": { "size": "Unknown" } })).unwrap();
        assert!(d.ram.unwrap().size.is_unknown());
    }

    #[test]
    fn test_numeric_string_is_accepted() {
        let d =
            HardwareDescriptor::from_value(json!({ "cpu": { "generationHint": "10" } })).unwrap();
        assert_eq!(d.cpu.unwrap().generation(), Some(10));
    }

    #[test]
    fn test_non_object_report_rejected() {
        let err = HardwareDescriptor::from_value(json!(["cpu"])).unwrap_err();
        assert!(matches!(err, EngineError::InvalidHardwareData { .. }));
    }

    #[test]
    fn test_generation_from_model_strings() {
        let cpu = |m: &str| CpuSection {
            model: m.into(),
            ..Default::default()
        };
        assert_eq!(cpu("Intel Core i7 11th Gen").generation(), Some(11));
        assert_eq!(cpu("Intel(R) Core(TM) i7-8700K").generation(), Some(8));
        assert_eq!(cpu("Intel Core i9-12900K").generation(), Some(12));
        assert_eq!(cpu("Intel Core i7").generation(), None);
    }

    #[test]
    fn test_vendor_class() {
        let explicit = CpuSection {
            vendor: "GenuineIntel".into(),
            ..Default::default()
        };
        assert_eq!(explicit.vendor_class(), Some(CpuVendor::Intel));

        let inferred = CpuSection {
            model: "AMD Ryzen 7 5800X".into(),
            ..Default::default()
        };
        assert_eq!(inferred.vendor_class(), Some(CpuVendor::Amd));

        let other = CpuSection {
            vendor: "VIA".into(),
            ..Default::default()
        };
        assert_eq!(other.vendor_class(), Some(CpuVendor::Other));

        assert_eq!(CpuSection::default().vendor_class(), None);
    }

    #[test]
    fn test_newer_chipset_from_chipset_or_model() {
        let by_chipset = MotherboardSection {
            chipset: "Intel Z490".into(),
            ..Default::default()
        };
        assert!(by_chipset.is_newer_chipset());

        let by_model = MotherboardSection {
            chipset: Attr::Unknown,
            model: "ASUS PRIME B460M-A".into(),
        };
        assert!(by_model.is_newer_chipset());

        let older = MotherboardSection {
            chipset: "Z370".into(),
            ..Default::default()
        };
        assert!(!older.is_newer_chipset());
        assert!(!MotherboardSection::default().is_newer_chipset());
    }

    #[test]
    fn test_empty_and_anchor() {
        let empty = HardwareDescriptor::default();
        assert!(empty.is_empty());
        assert!(!empty.has_anchor());

        let gpu_only = HardwareDescriptor::from_value(json!({ "gpu": { "model": "Radeon" } })).unwrap();
        assert!(!gpu_only.is_empty());
        assert!(!gpu_only.has_anchor());
    }

    #[test]
    fn test_laptop_detection_prefers_chassis() {
        let by_chassis =
            HardwareDescriptor::from_value(json!({ "system": { "chassis": "Laptop" } })).unwrap();
        assert!(by_chassis.is_laptop());

        let by_model = HardwareDescriptor::from_value(
            json!({ "system": { "model": "Dell XPS Notebook" } }),
        )
        .unwrap();
        assert!(by_model.is_laptop());

        let desktop = HardwareDescriptor::from_value(
            json!({ "system": { "chassis": "Desktop", "model": "Notebook-branded tower" } }),
        )
        .unwrap();
        assert!(!desktop.is_laptop());
    }

    #[test]
    fn test_serialize_skips_absent_and_nulls_unknown() {
        let d = HardwareDescriptor::from_value(json!({ "ram": { "size": null, "speed": "3200MHz" } }))
            .unwrap();
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v, json!({ "ram": { "size": null, "speed": "3200MHz" } }));
    }
}
