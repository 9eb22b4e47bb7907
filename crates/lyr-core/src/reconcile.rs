use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use lyr_domain::{
    compare_versions, LayerDescriptor, LayerError, LayerVersionInfo, Result, SupervisorRelease,
    SupervisorSettings, SupervisorVersion, VersionRequest, LATEST_TAG,
};
use lyr_store::{assemble, package, PackagedLayer, SupervisorSource, Workspace};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::registry::LayerRegistry;

/// Published state of the supervisor layer relative to the desired version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LayerState {
    /// No usable record: missing layer or a version without description.
    Absent,
    Stale,
    Current,
}

/// Outcome of [`LayerReconciler::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    Created(LayerVersionInfo),
    Updated(LayerVersionInfo),
    Current(LayerVersionInfo),
}

impl Reconciliation {
    /// State observed before any action was taken.
    #[must_use]
    pub fn state(&self) -> LayerState {
        match self {
            Self::Created(_) => LayerState::Absent,
            Self::Updated(_) => LayerState::Stale,
            Self::Current(_) => LayerState::Current,
        }
    }

    /// Version that is current after reconciliation.
    #[must_use]
    pub fn info(&self) -> &LayerVersionInfo {
        match self {
            Self::Created(info) | Self::Updated(info) | Self::Current(info) => info,
        }
    }

    #[must_use]
    pub fn published(&self) -> bool {
        !matches!(self, Self::Current(_))
    }
}

/// Classifies the latest published version against `desired`.
///
/// A description that does not parse as a version cannot be shown to be
/// current, so it counts as stale.
#[must_use]
pub fn layer_state(latest: Option<&LayerVersionInfo>, desired: &SupervisorVersion) -> LayerState {
    let Some(description) = latest.and_then(|info| info.description.as_deref()) else {
        return LayerState::Absent;
    };
    match compare_versions(description, desired.as_str()) {
        Some(Ordering::Less) => LayerState::Stale,
        Some(_) => LayerState::Current,
        None => {
            warn!(description, "published layer description is not a version");
            LayerState::Stale
        }
    }
}

/// Keeps the supervisor layer published at (or above) the desired version.
pub struct LayerReconciler<'a> {
    settings: SupervisorSettings,
    organization: String,
    project: String,
    registry: LayerRegistry,
    source: &'a dyn SupervisorSource,
    tmp_root: PathBuf,
}

impl<'a> LayerReconciler<'a> {
    pub fn new(
        settings: SupervisorSettings,
        registry: LayerRegistry,
        source: &'a dyn SupervisorSource,
    ) -> Self {
        Self {
            settings,
            organization: lyr_domain::DEFAULT_ORGANIZATION.to_string(),
            project: lyr_domain::DEFAULT_PROJECT.to_string(),
            registry,
            source,
            tmp_root: std::env::temp_dir(),
        }
    }

    /// Overrides the repository coordinates of the supervisor project.
    #[must_use]
    pub fn with_project(mut self, organization: &str, project: &str) -> Self {
        self.organization = organization.to_string();
        self.project = project.to_string();
        self
    }

    /// Directory under which per-attempt workspaces are created.
    #[must_use]
    pub fn with_tmp_root(mut self, tmp_root: impl Into<PathBuf>) -> Self {
        self.tmp_root = tmp_root.into();
        self
    }

    /// Creates the layer when absent, republishes it when stale, and leaves
    /// it alone when current.
    ///
    /// # Errors
    /// Propagates fetch, archive, filesystem, and registry failures unchanged.
    pub fn check(&self) -> Result<Reconciliation> {
        let desired = self.desired_version()?;
        let name = self.settings.layer_name();
        let latest = self.registry.latest_info(name)?;
        match (layer_state(latest.as_ref(), &desired), latest) {
            (LayerState::Current, Some(info)) => {
                info!("Using existent '{name}' layer.");
                Ok(Reconciliation::Current(info))
            }
            (LayerState::Stale, _) => {
                info!("Updating '{name}' layer.");
                let info = self.publish_release(&desired)?;
                info!("'{name}' layer updated.");
                Ok(Reconciliation::Updated(info))
            }
            _ => {
                info!("Creating '{name}' layer.");
                let info = self.publish_release(&desired)?;
                info!("'{name}' layer created.");
                Ok(Reconciliation::Created(info))
            }
        }
    }

    /// ARN of the latest published layer version, or an empty string.
    ///
    /// # Errors
    /// Returns [`LayerError::Registry`] when listing fails.
    pub fn latest_arn(&self) -> Result<String> {
        Ok(self
            .registry
            .latest_info(self.settings.layer_name())?
            .map(|info| info.layer_version_arn)
            .unwrap_or_default())
    }

    /// Builds the layer archive for the desired version into `output`
    /// without publishing it.
    ///
    /// # Errors
    /// Propagates fetch, archive, and filesystem failures.
    pub fn build(&self, output: &Path) -> Result<PackagedLayer> {
        let desired = self.desired_version()?;
        let workspace = Workspace::new_in(&self.tmp_root, self.settings.layer_name())?;
        let packaged = self.build_into(&workspace, &desired, output)?;
        workspace.release()?;
        Ok(packaged)
    }

    /// Resolves `latest` to the newest upstream release.
    ///
    /// # Errors
    /// Returns [`LayerError::Fetch`] when the lookup fails and
    /// [`LayerError::Config`] when the upstream tag is not a version.
    pub fn desired_version(&self) -> Result<SupervisorVersion> {
        match self.settings.version() {
            VersionRequest::Exact(version) => Ok(version.clone()),
            VersionRequest::Latest => {
                let tag = self.source.resolve_tag(&self.release(LATEST_TAG))?;
                SupervisorVersion::from_str(&tag)
            }
        }
    }

    fn release(&self, tag: &str) -> SupervisorRelease {
        SupervisorRelease::new(&self.organization, &self.project, tag)
    }

    fn publish_release(&self, version: &SupervisorVersion) -> Result<LayerVersionInfo> {
        let workspace = Workspace::new_in(&self.tmp_root, self.settings.layer_name())?;
        let packaged = self.build_into(&workspace, version, workspace.archive_path())?;
        let content = fs::read(&packaged.path).map_err(|err| LayerError::fs(&packaged.path, err))?;
        let info = self.registry.publish(&LayerDescriptor {
            name: self.settings.layer_name().to_string(),
            description: version.to_string(),
            content,
            license_info: self.settings.license_info().to_string(),
        })?;
        workspace.release()?;
        Ok(info)
    }

    fn build_into(
        &self,
        workspace: &Workspace,
        version: &SupervisorVersion,
        output: &Path,
    ) -> Result<PackagedLayer> {
        let release = self.release(version.as_str());
        let extract_dir = workspace.extract_dir();
        let code_dir = workspace.code_dir();
        let fetched = self.source.fetch(&release, &extract_dir)?;
        let assembled = assemble(&extract_dir, &fetched.top_folder, &code_dir)?;
        debug!(
            supervisor = %assembled.supervisor_dir.display(),
            archives = assembled.expanded_archives,
            downloaded = fetched.size,
            "assembled layer tree"
        );
        package(&code_dir, output)
    }
}
