//! Shared data model for supervisor layer reconciliation.

#![deny(clippy::all)]

mod error;
mod layer;
mod settings;
mod version;

pub use error::{LayerError, Result};
pub use layer::{LayerDescriptor, LayerRecord, LayerVersionInfo, NO_LAYER_VERSION};
pub use settings::{
    SupervisorRelease, SupervisorSettings, DEFAULT_ORGANIZATION, DEFAULT_PROJECT,
};
pub use version::{compare_versions, SupervisorVersion, VersionRequest, LATEST_TAG};
