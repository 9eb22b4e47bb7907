//! Supervisor layer registry access and reconciliation.

#![deny(clippy::all)]

mod api;
mod config;
mod reconcile;
mod registry;

pub use api::{HttpLayerApi, LayerApi, LocalLayerApi, LAYERS_API_VERSION};
pub use config::{
    ArtifactConfig, Config, EnvSnapshot, RegistryConfig, CONFIG_FILE_NAME, DEFAULT_TOKEN_ENV,
};
pub use reconcile::{layer_state, LayerReconciler, LayerState, Reconciliation};
pub use registry::LayerRegistry;

pub use lyr_domain::{
    LayerDescriptor, LayerError, LayerRecord, LayerVersionInfo, Result, SupervisorSettings,
};
pub use lyr_store::{GithubSource, PackagedLayer, SourceOptions, SupervisorSource};
