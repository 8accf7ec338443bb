//! Domain models for opforge.
//!
//! Canonical definitions for the engine's inputs:
//! - `HardwareDescriptor`: normalized hardware report with tri-state attributes
//! - `PatchRecord` / `ModuleRecord`: fixed, versioned catalogs
//! - `TargetVersion` / `DeviceModel`: the user's OS and identity choices

pub mod catalog;
pub mod error;
pub mod hardware;
pub mod version;

pub use catalog::{
    Catalog, ModuleRecord, Named, PatchRecord, Priority, MODULE_CATALOG, PATCH_CATALOG,
};
pub use error::{CatalogKind, EngineError, Result};
pub use hardware::{
    Attr, CpuSection, CpuVendor, GpuSection, HardwareDescriptor, MotherboardSection,
    NetworkSection, RamSection, StorageDevice, SystemSection,
};
pub use version::{DeviceModel, TargetVersion};
