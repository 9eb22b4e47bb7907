use std::str::FromStr;

use crate::error::{LayerError, Result};
use crate::version::VersionRequest;

pub const DEFAULT_ORGANIZATION: &str = "grycap";
pub const DEFAULT_PROJECT: &str = "faas-supervisor";

/// Desired state of the supervisor layer.
///
/// All three fields are required; construction fails on the first missing or
/// malformed one instead of letting the reconciler trip over it later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorSettings {
    layer_name: String,
    version: VersionRequest,
    license_info: String,
}

impl SupervisorSettings {
    /// # Errors
    /// Returns [`LayerError::Config`] when a field is empty or the version does
    /// not parse.
    pub fn new(layer_name: &str, version: &str, license_info: &str) -> Result<Self> {
        let layer_name = required("layer_name", layer_name)?;
        let version = VersionRequest::from_str(required("version", version)?.as_str())?;
        let license_info = required("license_info", license_info)?;
        Ok(Self {
            layer_name,
            version,
            license_info,
        })
    }

    #[must_use]
    pub fn layer_name(&self) -> &str {
        &self.layer_name
    }

    #[must_use]
    pub fn version(&self) -> &VersionRequest {
        &self.version
    }

    #[must_use]
    pub fn license_info(&self) -> &str {
        &self.license_info
    }
}

fn required(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LayerError::config(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

/// Upstream supervisor source release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorRelease {
    pub organization: String,
    pub project: String,
    pub tag: String,
}

impl SupervisorRelease {
    #[must_use]
    pub fn new(organization: &str, project: &str, tag: &str) -> Self {
        Self {
            organization: organization.to_string(),
            project: project.to_string(),
            tag: tag.to_string(),
        }
    }

    /// Source archive path relative to the repository host.
    #[must_use]
    pub fn archive_path(&self) -> String {
        format!(
            "{}/{}/archive/{}.zip",
            self.organization, self.project, self.tag
        )
    }

    /// Path of the newest-release lookup relative to the API host.
    #[must_use]
    pub fn latest_release_path(&self) -> String {
        format!(
            "repos/{}/{}/releases/latest",
            self.organization, self.project
        )
    }
}
