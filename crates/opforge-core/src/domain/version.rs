//! Target OS versions and device models.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::EngineError;

/// A selectable macOS release, ordered oldest to newest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TargetVersion {
    Mojave,
    Catalina,
    BigSur,
    Monterey,
    Ventura,
    Sonoma,
}

impl TargetVersion {
    /// Newest first, as presented for selection.
    pub const ALL: [TargetVersion; 6] = [
        TargetVersion::Sonoma,
        TargetVersion::Ventura,
        TargetVersion::Monterey,
        TargetVersion::BigSur,
        TargetVersion::Catalina,
        TargetVersion::Mojave,
    ];

    /// Version number string ("14", "10.15").
    pub fn number(&self) -> &'static str {
        match self {
            TargetVersion::Sonoma => "14",
            TargetVersion::Ventura => "13",
            TargetVersion::Monterey => "12",
            TargetVersion::BigSur => "11",
            TargetVersion::Catalina => "10.15",
            TargetVersion::Mojave => "10.14",
        }
    }

    pub fn marketing_name(&self) -> &'static str {
        match self {
            TargetVersion::Sonoma => "Sonoma",
            TargetVersion::Ventura => "Ventura",
            TargetVersion::Monterey => "Monterey",
            TargetVersion::BigSur => "Big Sur",
            TargetVersion::Catalina => "Catalina",
            TargetVersion::Mojave => "Mojave",
        }
    }

    /// Short guidance shown next to the version.
    pub fn guidance(&self) -> &'static str {
        match self {
            TargetVersion::Sonoma => "Recommended for newer hardware",
            TargetVersion::Ventura => "Widely compatible",
            TargetVersion::Monterey => "Good stability",
            TargetVersion::BigSur => "Supports older hardware",
            TargetVersion::Catalina => "Supports legacy hardware",
            TargetVersion::Mojave => "Last release with NVIDIA web drivers",
        }
    }
}

impl fmt::Display for TargetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "macOS {} ({})", self.marketing_name(), self.number())
    }
}

impl FromStr for TargetVersion {
    type Err = EngineError;

    /// Accepts "14", "sonoma", "macOS Sonoma (14)" and similar.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        let needle = needle.strip_prefix("macos").unwrap_or(&needle).trim();

        for v in TargetVersion::ALL {
            let name = v.marketing_name().to_ascii_lowercase();
            let number = v.number();
            let full = format!("{} ({})", name, number);
            if needle == number
                || needle == name
                || needle == name.replace(' ', "")
                || needle == full
            {
                return Ok(v);
            }
        }
        Err(EngineError::UnknownTargetVersion(s.to_string()))
    }
}

/// SMBIOS device model an identity is generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceModel {
    #[serde(rename = "MacBookPro16,1")]
    MacBookPro16_1,
    #[serde(rename = "MacBookPro16,4")]
    MacBookPro16_4,
    #[serde(rename = "Macmini9,1")]
    Macmini9_1,
    #[serde(rename = "iMac20,1")]
    IMac20_1,
    #[serde(rename = "MacPro7,1")]
    MacPro7_1,
}

impl DeviceModel {
    pub const ALL: [DeviceModel; 5] = [
        DeviceModel::MacBookPro16_1,
        DeviceModel::MacBookPro16_4,
        DeviceModel::Macmini9_1,
        DeviceModel::IMac20_1,
        DeviceModel::MacPro7_1,
    ];

    pub fn identifier(&self) -> &'static str {
        match self {
            DeviceModel::MacBookPro16_1 => "MacBookPro16,1",
            DeviceModel::MacBookPro16_4 => "MacBookPro16,4",
            DeviceModel::Macmini9_1 => "Macmini9,1",
            DeviceModel::IMac20_1 => "iMac20,1",
            DeviceModel::MacPro7_1 => "MacPro7,1",
        }
    }
}

impl fmt::Display for DeviceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

impl FromStr for DeviceModel {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        DeviceModel::ALL
            .into_iter()
            .find(|m| m.identifier().eq_ignore_ascii_case(needle))
            .ok_or_else(|| EngineError::UnknownDeviceModel(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target_version_forms() {
        assert_eq!("14".parse::<TargetVersion>().unwrap(), TargetVersion::Sonoma);
        assert_eq!("sonoma".parse::<TargetVersion>().unwrap(), TargetVersion::Sonoma);
        assert_eq!(
            "macOS Big Sur (11)".parse::<TargetVersion>().unwrap(),
            TargetVersion::BigSur
        );
        assert_eq!("bigsur".parse::<TargetVersion>().unwrap(), TargetVersion::BigSur);
        assert_eq!("10.15".parse::<TargetVersion>().unwrap(), TargetVersion::Catalina);
        assert!("15".parse::<TargetVersion>().is_err());
    }

    #[test]
    fn test_target_version_ordering() {
        assert!(TargetVersion::Sonoma > TargetVersion::Ventura);
        assert!(TargetVersion::Mojave < TargetVersion::Catalina);
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for v in TargetVersion::ALL {
            assert_eq!(v.to_string().parse::<TargetVersion>().unwrap(), v);
        }
    }

    #[test]
    fn test_parse_device_model() {
        assert_eq!(
            "imac20,1".parse::<DeviceModel>().unwrap(),
            DeviceModel::IMac20_1
        );
        assert!(matches!(
            "iMac99,9".parse::<DeviceModel>(),
            Err(EngineError::UnknownDeviceModel(_))
        ));
    }
}
