//! Workspace discovery and version checks

pub mod manifest_reader;
pub mod version_validator;

pub use manifest_reader::CargoWorkspace;
pub use version_validator::VersionValidator;
