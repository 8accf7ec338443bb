//! Engine-level error taxonomy for opforge.

use std::fmt;

/// Which fixed catalog a lookup was made against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogKind {
    Patch,
    Module,
}

impl fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogKind::Patch => write!(f, "patch"),
            CatalogKind::Module => write!(f, "module"),
        }
    }
}

/// Errors produced by the recommendation engine and configuration assembly.
///
/// None of these abort an in-flight build; they are local to the call that
/// produced them and the caller is expected to re-prompt or correct input.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("insufficient hardware data ({rule}): {reason}")]
    InvalidHardwareData { rule: &'static str, reason: String },

    #[error("unknown {kind} '{name}' is not in the {kind} catalog")]
    UnknownCatalogEntry { kind: CatalogKind, name: String },

    #[error("build configuration is missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid identity field {field}: {reason}")]
    InvalidIdentity { field: &'static str, reason: String },

    #[error("randomness source failed: {0}")]
    RandomSource(String),

    #[error("unknown target version: {0}")]
    UnknownTargetVersion(String),

    #[error("unknown device model: {0}")]
    UnknownDeviceModel(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Short status line suitable for a status bar.
    pub fn status(&self) -> &'static str {
        match self {
            EngineError::InvalidHardwareData { .. } => "hardware report is incomplete",
            EngineError::UnknownCatalogEntry { .. } => "unknown catalog entry",
            EngineError::MissingField(_) => "configuration incomplete",
            EngineError::InvalidIdentity { .. } => "identity record rejected",
            EngineError::RandomSource(_) => "identity generation failed",
            EngineError::UnknownTargetVersion(_) => "unknown target version",
            EngineError::UnknownDeviceModel(_) => "unknown device model",
            EngineError::Serialization(_) => "serialization failed",
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
