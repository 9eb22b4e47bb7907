//! Platform layer-version API backends.

use lyr_domain::{LayerDescriptor, LayerRecord, LayerVersionInfo};

mod http;
mod local;

pub use http::{HttpLayerApi, LAYERS_API_VERSION};
pub use local::LocalLayerApi;

/// Raw access to the platform's layer-version API.
///
/// Errors are opaque transport failures; [`crate::LayerRegistry`] turns them
/// into registry errors.
pub trait LayerApi: Send + Sync {
    fn list_layers(&self) -> anyhow::Result<Vec<LayerRecord>>;
    /// Always creates a new version; existing versions are never modified.
    fn publish_layer_version(&self, layer: &LayerDescriptor) -> anyhow::Result<LayerVersionInfo>;
    fn delete_layer_version(&self, layer_name: &str, version: i64) -> anyhow::Result<()>;
}
