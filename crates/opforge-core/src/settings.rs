//! Process-level settings read from the environment.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default name of the packaged output directory.
pub const DEFAULT_ARTIFACT_NAME: &str = "OpenCore-EFI";

/// Defaults for builds started from this process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgeSettings {
    /// Output destination used when none is given explicitly.
    pub output_dir: Option<PathBuf>,
    /// Directory name the packaged artifact gets under the destination.
    pub artifact_name: String,
    /// Wall-clock limit for a build; `None` means no limit.
    pub build_timeout: Option<Duration>,
    /// Emit newline-delimited JSON logs.
    pub json_logs: bool,
}

impl Default for ForgeSettings {
    fn default() -> Self {
        ForgeSettings {
            output_dir: std::env::var_os("OPFORGE_OUTPUT_DIR")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            artifact_name: std::env::var("OPFORGE_ARTIFACT_NAME")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_ARTIFACT_NAME.to_string()),
            build_timeout: std::env::var("OPFORGE_BUILD_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            json_logs: std::env::var("OPFORGE_LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        }
    }
}

impl ForgeSettings {
    /// Read settings from environment variables.
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn with_artifact_name(mut self, name: &str) -> Self {
        self.artifact_name = name.to_string();
        self
    }

    /// Zero clears the limit.
    pub fn with_build_timeout(mut self, timeout: Duration) -> Self {
        self.build_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }
}
