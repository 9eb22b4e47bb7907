use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use lyr_domain::{LayerDescriptor, LayerRecord, LayerVersionInfo};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use super::LayerApi;

const INDEX_FILENAME: &str = "index.json";

/// Directory-backed layer registry.
///
/// Keeps an `index.json` with every published version and stores each
/// version's content as `{layer}/{version}.zip`. Versions are append-only and
/// numbered from 1 per layer, never reused after deletion.
pub struct LocalLayerApi {
    root: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LocalIndex {
    #[serde(default)]
    layers: BTreeMap<String, LocalLayer>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LocalLayer {
    last_version: i64,
    #[serde(default)]
    versions: Vec<LayerVersionInfo>,
}

impl LocalLayerApi {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of the stored content for one layer version.
    #[must_use]
    pub fn content_path(&self, layer_name: &str, version: i64) -> PathBuf {
        self.root.join(layer_name).join(format!("{version}.zip"))
    }

    /// Every stored version of `layer_name`, oldest first.
    ///
    /// # Errors
    /// Returns an error when the index cannot be read.
    pub fn versions(&self, layer_name: &str) -> Result<Vec<LayerVersionInfo>> {
        let index = self.load()?;
        Ok(index
            .layers
            .get(layer_name)
            .map(|layer| layer.versions.clone())
            .unwrap_or_default())
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILENAME)
    }

    fn load(&self) -> Result<LocalIndex> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(LocalIndex::default());
        }
        let contents =
            fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("corrupt registry index {}", path.display()))
    }

    fn save(&self, index: &LocalIndex) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create {}", self.root.display()))?;
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(serde_json::to_string_pretty(index)?.as_bytes())?;
        tmp.persist(self.index_path())
            .map_err(|err| anyhow!("failed to persist registry index: {}", err.error))?;
        Ok(())
    }

    fn arn(layer_name: &str, version: i64) -> String {
        format!("arn:lyr:local:layer:{layer_name}:{version}")
    }
}

impl LayerApi for LocalLayerApi {
    fn list_layers(&self) -> Result<Vec<LayerRecord>> {
        let index = self.load()?;
        Ok(index
            .layers
            .into_iter()
            .filter_map(|(name, layer)| {
                let latest = layer.versions.into_iter().max_by_key(|info| info.version)?;
                Some(LayerRecord {
                    layer_arn: Some(format!("arn:lyr:local:layer:{name}")),
                    layer_name: name,
                    latest_matching_version: Some(latest),
                })
            })
            .collect())
    }

    fn publish_layer_version(&self, layer: &LayerDescriptor) -> Result<LayerVersionInfo> {
        if layer.name.is_empty() || layer.name.contains(['/', '\\']) || layer.name.starts_with('.')
        {
            return Err(anyhow!("invalid layer name '{}'", layer.name));
        }
        let mut index = self.load()?;
        let entry = index.layers.entry(layer.name.clone()).or_default();
        let version = entry.last_version + 1;

        let content_path = self.content_path(&layer.name, version);
        if let Some(parent) = content_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&content_path, &layer.content)
            .with_context(|| format!("failed to write {}", content_path.display()))?;

        let info = LayerVersionInfo {
            version,
            description: Some(layer.description.clone()),
            layer_version_arn: Self::arn(&layer.name, version),
            created_date: OffsetDateTime::now_utc().format(&Rfc3339).ok(),
            code_sha256: Some(STANDARD.encode(Sha256::digest(&layer.content))),
        };
        entry.last_version = version;
        entry.versions.push(info.clone());
        self.save(&index)?;
        Ok(info)
    }

    fn delete_layer_version(&self, layer_name: &str, version: i64) -> Result<()> {
        let mut index = self.load()?;
        let layer = index
            .layers
            .get_mut(layer_name)
            .ok_or_else(|| anyhow!("layer {layer_name} not found"))?;
        let before = layer.versions.len();
        layer.versions.retain(|info| info.version != version);
        if layer.versions.len() == before {
            return Err(anyhow!("layer version {layer_name}:{version} not found"));
        }
        let content_path = self.content_path(layer_name, version);
        if content_path.exists() {
            fs::remove_file(&content_path)
                .with_context(|| format!("failed to remove {}", content_path.display()))?;
        }
        self.save(&index)
    }
}
