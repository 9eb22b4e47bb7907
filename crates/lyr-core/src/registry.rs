use std::sync::Arc;

use lyr_domain::{
    LayerDescriptor, LayerError, LayerRecord, LayerVersionInfo, Result, NO_LAYER_VERSION,
};
use tracing::{info, warn};

use crate::api::LayerApi;

/// Name-keyed view over the platform layer API.
#[derive(Clone)]
pub struct LayerRegistry {
    api: Arc<dyn LayerApi>,
}

impl LayerRegistry {
    pub fn new(api: Arc<dyn LayerApi>) -> Self {
        Self { api }
    }

    /// # Errors
    /// Returns [`LayerError::Registry`] when the backend call fails.
    pub fn list(&self) -> Result<Vec<LayerRecord>> {
        self.api.list_layers().map_err(backend_error)
    }

    /// Returns the record whose name matches `layer_name` exactly.
    ///
    /// # Errors
    /// Returns [`LayerError::Registry`] when listing fails.
    pub fn find(&self, layer_name: &str) -> Result<Option<LayerRecord>> {
        Ok(self
            .list()?
            .into_iter()
            .find(|layer| layer.layer_name == layer_name))
    }

    /// Latest matching version of `layer_name`, if the layer exists.
    ///
    /// # Errors
    /// Returns [`LayerError::Registry`] when listing fails.
    pub fn latest_info(&self, layer_name: &str) -> Result<Option<LayerVersionInfo>> {
        Ok(self
            .find(layer_name)?
            .and_then(|layer| layer.latest_matching_version))
    }

    /// # Errors
    /// Returns [`LayerError::Registry`] when listing fails.
    pub fn exists(&self, layer_name: &str) -> Result<bool> {
        Ok(self.find(layer_name)?.is_some())
    }

    /// Publishes `layer` as a new version.
    ///
    /// # Errors
    /// Returns [`LayerError::Registry`] when the backend rejects the version.
    pub fn publish(&self, layer: &LayerDescriptor) -> Result<LayerVersionInfo> {
        let info = self
            .api
            .publish_layer_version(layer)
            .map_err(backend_error)?;
        info!(
            layer = %layer.name,
            version = info.version,
            arn = %info.layer_version_arn,
            "published layer version"
        );
        Ok(info)
    }

    /// Deletes `version` of `layer_name`, or its latest version when `None`.
    ///
    /// When no version is given and the layer does not exist, the call is
    /// still issued with [`NO_LAYER_VERSION`] and the backend decides.
    /// Returns the version number the delete was issued for.
    ///
    /// # Errors
    /// Returns [`LayerError::Registry`] when a backend call fails.
    pub fn delete(&self, layer_name: &str, version: Option<i64>) -> Result<i64> {
        let version = match version {
            Some(version) => version,
            None => match self.latest_info(layer_name)? {
                Some(info) => info.version,
                None => {
                    warn!(layer = layer_name, "no published version found to delete");
                    NO_LAYER_VERSION
                }
            },
        };
        self.api
            .delete_layer_version(layer_name, version)
            .map_err(backend_error)?;
        info!(layer = layer_name, version, "deleted layer version");
        Ok(version)
    }
}

fn backend_error(err: anyhow::Error) -> LayerError {
    LayerError::registry(format!("{err:#}"))
}
