use serde::{Deserialize, Serialize};

/// Version number sent to the registry when a delete resolves no layer.
pub const NO_LAYER_VERSION: i64 = -1;

/// Layer payload handed to the registry on publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerDescriptor {
    pub name: String,
    /// Supervisor version the content was built from.
    pub description: String,
    pub content: Vec<u8>,
    pub license_info: String,
}

/// One published layer version as reported by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LayerVersionInfo {
    pub version: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub layer_version_arn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_sha256: Option<String>,
}

/// A layer entry from the registry listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LayerRecord {
    pub layer_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_matching_version: Option<LayerVersionInfo>,
}
