use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use lyr_domain::{
    LayerError, Result, SupervisorSettings, DEFAULT_ORGANIZATION, DEFAULT_PROJECT,
};
use lyr_store::{GithubSource, SourceOptions, SupervisorSource, DEFAULT_API_BASE, DEFAULT_ARCHIVE_BASE};
use serde::Deserialize;
use tracing::debug;

use crate::api::{HttpLayerApi, LayerApi, LocalLayerApi};
use crate::reconcile::LayerReconciler;
use crate::registry::LayerRegistry;

pub const CONFIG_FILE_NAME: &str = "lyr.toml";
pub const DEFAULT_TOKEN_ENV: &str = "LYR_REGISTRY_TOKEN";

/// Process environment captured once so configuration is reproducible.
#[derive(Debug, Clone)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    #[must_use]
    pub fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    /// Non-empty value of `key`, if any.
    #[must_use]
    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    #[must_use]
    pub fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    lambda: LambdaSection,
    #[serde(default)]
    artifact: ArtifactSection,
    #[serde(default)]
    registry: RegistrySection,
    #[serde(default)]
    workspace: WorkspaceSection,
}

#[derive(Debug, Default, Deserialize)]
struct LambdaSection {
    #[serde(default)]
    supervisor: SupervisorSection,
}

#[derive(Debug, Default, Deserialize)]
struct SupervisorSection {
    layer_name: Option<String>,
    version: Option<String>,
    license_info: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ArtifactSection {
    organization: Option<String>,
    project: Option<String>,
    archive_base: Option<String>,
    api_base: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RegistrySection {
    endpoint: Option<String>,
    local_path: Option<PathBuf>,
    token_env: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct WorkspaceSection {
    tmp_root: Option<PathBuf>,
}

/// Where supervisor releases are downloaded from.
#[derive(Debug, Clone)]
pub struct ArtifactConfig {
    pub organization: String,
    pub project: String,
    pub source: SourceOptions,
}

/// Which layer API backend to talk to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryConfig {
    Http {
        endpoint: String,
        token: Option<String>,
        /// `None` leaves layer API calls unbounded.
        timeout: Option<Duration>,
    },
    Local {
        path: PathBuf,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    supervisor: SupervisorSettings,
    artifact: ArtifactConfig,
    registry: Option<RegistryConfig>,
    tmp_root: PathBuf,
}

impl Config {
    /// Loads configuration from `path` (or the default locations) and the
    /// process environment.
    ///
    /// # Errors
    /// Returns [`LayerError::Config`] when the file is unreadable or invalid,
    /// or a required setting is missing.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env = EnvSnapshot::capture();
        let path = match path {
            Some(explicit) => Some(explicit.to_path_buf()),
            None => default_config_path(),
        };
        let contents = match &path {
            Some(path) => {
                debug!(config = %path.display(), "loading configuration");
                Some(fs::read_to_string(path).map_err(|err| {
                    LayerError::config(format!("failed to read {}: {err}", path.display()))
                })?)
            }
            None => None,
        };
        Self::from_sources(contents.as_deref(), &env)
    }

    /// Builds configuration from TOML text and an environment snapshot;
    /// environment values win over the file.
    ///
    /// # Errors
    /// Returns [`LayerError::Config`] on invalid TOML or settings.
    pub fn from_sources(contents: Option<&str>, env: &EnvSnapshot) -> Result<Self> {
        let file: ConfigFile = match contents {
            Some(text) => toml_edit::de::from_str(text)
                .map_err(|err| LayerError::config(format!("invalid configuration file: {err}")))?,
            None => ConfigFile::default(),
        };
        let pick = |key: &str, value: Option<String>| -> Option<String> {
            env.var(key).map(ToOwned::to_owned).or(value)
        };

        let supervisor_section = file.lambda.supervisor;
        let supervisor = SupervisorSettings::new(
            &pick("LYR_LAYER_NAME", supervisor_section.layer_name).unwrap_or_default(),
            &pick("LYR_SUPERVISOR_VERSION", supervisor_section.version).unwrap_or_default(),
            &pick("LYR_LICENSE_INFO", supervisor_section.license_info).unwrap_or_default(),
        )?;

        let artifact_section = file.artifact;
        let artifact = ArtifactConfig {
            organization: artifact_section
                .organization
                .unwrap_or_else(|| DEFAULT_ORGANIZATION.to_string()),
            project: artifact_section
                .project
                .unwrap_or_else(|| DEFAULT_PROJECT.to_string()),
            source: SourceOptions {
                archive_base: pick("LYR_ARCHIVE_BASE", artifact_section.archive_base)
                    .unwrap_or_else(|| DEFAULT_ARCHIVE_BASE.to_string()),
                api_base: pick("LYR_API_BASE", artifact_section.api_base)
                    .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
                timeout: artifact_section.timeout_secs.map(Duration::from_secs),
            },
        };

        let registry_section = file.registry;
        let from_env = select_backend(
            env.var("LYR_REGISTRY_ENDPOINT").map(ToOwned::to_owned),
            env.var("LYR_REGISTRY_PATH").map(PathBuf::from),
            "LYR_REGISTRY_ENDPOINT and LYR_REGISTRY_PATH",
        )?;
        let from_file = select_backend(
            registry_section.endpoint,
            registry_section.local_path,
            "registry.endpoint and registry.local_path",
        )?;
        let token_env = registry_section
            .token_env
            .unwrap_or_else(|| DEFAULT_TOKEN_ENV.to_string());
        let registry = from_env.or(from_file).map(|backend| match backend {
            Backend::Endpoint(endpoint) => RegistryConfig::Http {
                endpoint,
                token: env.var(&token_env).map(ToOwned::to_owned),
                timeout: registry_section.timeout_secs.map(Duration::from_secs),
            },
            Backend::Path(path) => RegistryConfig::Local { path },
        });

        let tmp_root = env
            .var("LYR_TMP_ROOT")
            .map(PathBuf::from)
            .or(file.workspace.tmp_root)
            .unwrap_or_else(env::temp_dir);

        Ok(Self {
            supervisor,
            artifact,
            registry,
            tmp_root,
        })
    }

    #[must_use]
    pub fn supervisor(&self) -> &SupervisorSettings {
        &self.supervisor
    }

    #[must_use]
    pub fn artifact(&self) -> &ArtifactConfig {
        &self.artifact
    }

    #[must_use]
    pub fn registry_config(&self) -> Option<&RegistryConfig> {
        self.registry.as_ref()
    }

    #[must_use]
    pub fn tmp_root(&self) -> &Path {
        &self.tmp_root
    }

    /// Connects to the configured layer API.
    ///
    /// # Errors
    /// Returns [`LayerError::Config`] when no backend is configured or it
    /// cannot be initialised.
    pub fn registry(&self) -> Result<LayerRegistry> {
        let api: Arc<dyn LayerApi> = match &self.registry {
            Some(RegistryConfig::Http {
                endpoint,
                token,
                timeout,
            }) => Arc::new(
                HttpLayerApi::new(endpoint, token.clone(), *timeout)
                    .map_err(|err| LayerError::config(format!("{err:#}")))?,
            ),
            Some(RegistryConfig::Local { path }) => Arc::new(LocalLayerApi::new(path.clone())),
            None => {
                return Err(LayerError::config(
                    "no layer registry configured; set registry.endpoint or registry.local_path",
                ))
            }
        };
        Ok(LayerRegistry::new(api))
    }

    /// # Errors
    /// Returns [`LayerError::Config`] when the artifact URLs are invalid.
    pub fn source(&self) -> Result<GithubSource> {
        GithubSource::new(&self.artifact.source)
    }

    /// Wires a reconciler for the configured layer around `source`.
    ///
    /// # Errors
    /// Returns [`LayerError::Config`] when no registry is configured.
    pub fn reconciler<'a>(&self, source: &'a dyn SupervisorSource) -> Result<LayerReconciler<'a>> {
        Ok(
            LayerReconciler::new(self.supervisor.clone(), self.registry()?, source)
                .with_project(&self.artifact.organization, &self.artifact.project)
                .with_tmp_root(&self.tmp_root),
        )
    }
}

/// Registry backend selected by one configuration source.
enum Backend {
    Endpoint(String),
    Path(PathBuf),
}

fn select_backend(
    endpoint: Option<String>,
    path: Option<PathBuf>,
    names: &str,
) -> Result<Option<Backend>> {
    match (endpoint, path) {
        (Some(_), Some(_)) => Err(LayerError::config(format!(
            "{names} are mutually exclusive"
        ))),
        (Some(endpoint), None) => Ok(Some(Backend::Endpoint(endpoint))),
        (None, Some(path)) => Ok(Some(Backend::Path(path))),
        (None, None) => Ok(None),
    }
}

fn default_config_path() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }
    dirs_next::config_dir()
        .map(|dir| dir.join("lyr").join(CONFIG_FILE_NAME))
        .filter(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const SAMPLE: &str = r#"
[lambda.supervisor]
layer_name = "faas-supervisor"
version = "1.5.0"
license_info = "Apache 2.0"

[artifact]
organization = "example"
timeout_secs = 30

[registry]
local_path = "/var/lib/lyr"

[workspace]
tmp_root = "/scratch"
"#;

    #[test]
    fn reads_nested_supervisor_section() {
        let config = Config::from_sources(Some(SAMPLE), &EnvSnapshot::testing(&[])).expect("config");
        assert_eq!(config.supervisor().layer_name(), "faas-supervisor");
        assert_eq!(config.supervisor().version().tag(), "1.5.0");
        assert_eq!(config.supervisor().license_info(), "Apache 2.0");
        assert_eq!(config.artifact().organization, "example");
        assert_eq!(config.artifact().project, DEFAULT_PROJECT);
        assert_eq!(config.artifact().source.timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.artifact().source.archive_base, DEFAULT_ARCHIVE_BASE);
        assert_eq!(
            config.registry_config(),
            Some(&RegistryConfig::Local {
                path: PathBuf::from("/var/lib/lyr")
            })
        );
        assert_eq!(config.tmp_root(), Path::new("/scratch"));
    }

    #[test]
    fn environment_overrides_file() {
        let env = EnvSnapshot::testing(&[
            ("LYR_SUPERVISOR_VERSION", "1.6.0"),
            ("LYR_REGISTRY_PATH", "/elsewhere"),
            ("LYR_TMP_ROOT", "/fast-disk"),
        ]);
        let config = Config::from_sources(Some(SAMPLE), &env).expect("config");
        assert_eq!(config.supervisor().version().tag(), "1.6.0");
        assert_eq!(
            config.registry_config(),
            Some(&RegistryConfig::Local {
                path: PathBuf::from("/elsewhere")
            })
        );
        assert_eq!(config.tmp_root(), Path::new("/fast-disk"));
    }

    #[test]
    fn missing_required_field_is_rejected_up_front() {
        let text = r#"
[lambda.supervisor]
layer_name = "faas-supervisor"
version = "1.5.0"
"#;
        let err = Config::from_sources(Some(text), &EnvSnapshot::testing(&[]))
            .expect_err("must reject");
        assert_eq!(err, LayerError::config("license_info is required"));
    }

    #[test]
    fn env_only_configuration_is_enough() {
        let env = EnvSnapshot::testing(&[
            ("LYR_LAYER_NAME", "supervisor"),
            ("LYR_SUPERVISOR_VERSION", "latest"),
            ("LYR_LICENSE_INFO", "MIT"),
            ("LYR_REGISTRY_ENDPOINT", "http://127.0.0.1:9001"),
            ("LYR_REGISTRY_TOKEN", "t0ken"),
        ]);
        let config = Config::from_sources(None, &env).expect("config");
        assert_eq!(config.supervisor().version().tag(), "latest");
        assert_eq!(
            config.registry_config(),
            Some(&RegistryConfig::Http {
                endpoint: "http://127.0.0.1:9001".into(),
                token: Some("t0ken".into()),
                timeout: None,
            })
        );
        assert!(config.registry().is_ok());
    }

    #[test]
    fn conflicting_registries_in_one_source_are_rejected() {
        let both_in_file = SAMPLE.replace(
            "[registry]\n",
            "[registry]\nendpoint = \"http://127.0.0.1:9001\"\n",
        );
        let err = Config::from_sources(Some(&both_in_file), &EnvSnapshot::testing(&[]))
            .expect_err("file conflict must fail");
        assert!(matches!(err, LayerError::Config(message) if message.contains("registry.endpoint")));

        let env = EnvSnapshot::testing(&[
            ("LYR_REGISTRY_ENDPOINT", "http://127.0.0.1:9001"),
            ("LYR_REGISTRY_PATH", "/elsewhere"),
        ]);
        let err = Config::from_sources(Some(SAMPLE), &env).expect_err("env conflict must fail");
        assert!(matches!(err, LayerError::Config(message) if message.contains("LYR_REGISTRY_PATH")));
    }

    #[test]
    fn env_backend_replaces_file_backend() {
        let env = EnvSnapshot::testing(&[("LYR_REGISTRY_ENDPOINT", "http://127.0.0.1:9001")]);
        let config = Config::from_sources(Some(SAMPLE), &env).expect("config");
        assert!(matches!(
            config.registry_config(),
            Some(RegistryConfig::Http { endpoint, .. }) if endpoint == "http://127.0.0.1:9001"
        ));

        let text = "[lambda.supervisor]\nlayer_name = \"l\"\nversion = \"1.5.0\"\nlicense_info = \"MIT\"\n\n[registry]\nendpoint = \"http://127.0.0.1:9001\"\n";
        let env = EnvSnapshot::testing(&[("LYR_REGISTRY_PATH", "/elsewhere")]);
        let config = Config::from_sources(Some(text), &env).expect("config");
        assert_eq!(
            config.registry_config(),
            Some(&RegistryConfig::Local {
                path: PathBuf::from("/elsewhere")
            })
        );
    }

    #[test]
    fn registry_timeout_is_separate_from_artifact_timeout() {
        let text = SAMPLE.replace(
            "local_path = \"/var/lib/lyr\"\n",
            "endpoint = \"http://127.0.0.1:9001\"\ntimeout_secs = 5\n",
        );
        let config = Config::from_sources(Some(&text), &EnvSnapshot::testing(&[])).expect("config");
        assert_eq!(config.artifact().source.timeout, Some(Duration::from_secs(30)));
        assert!(matches!(
            config.registry_config(),
            Some(RegistryConfig::Http { timeout: Some(timeout), .. }) if *timeout == Duration::from_secs(5)
        ));
    }

    #[test]
    fn registry_is_required_only_when_used() {
        let env = EnvSnapshot::testing(&[
            ("LYR_LAYER_NAME", "supervisor"),
            ("LYR_SUPERVISOR_VERSION", "1.5.0"),
            ("LYR_LICENSE_INFO", "MIT"),
        ]);
        let config = Config::from_sources(None, &env).expect("config");
        assert!(config.source().is_ok());
        assert!(matches!(config.registry(), Err(LayerError::Config(_))));
    }

    #[test]
    fn unknown_sections_fail_loudly() {
        let text = format!("{SAMPLE}\n[registy]\nendpoint = \"typo\"\n");
        let err = Config::from_sources(Some(&text), &EnvSnapshot::testing(&[]))
            .expect_err("must reject");
        assert!(matches!(err, LayerError::Config(_)));
    }

    #[test]
    #[serial]
    fn load_reads_explicit_path_and_process_env() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, SAMPLE).expect("write config");
        let previous = env::var_os("LYR_LICENSE_INFO");
        env::set_var("LYR_LICENSE_INFO", "MIT");
        let loaded = Config::load(Some(&path));
        match previous {
            Some(value) => env::set_var("LYR_LICENSE_INFO", value),
            None => env::remove_var("LYR_LICENSE_INFO"),
        }
        let config = loaded.expect("config");
        assert_eq!(config.supervisor().license_info(), "MIT");
    }

    #[test]
    #[serial]
    fn load_reports_unreadable_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = Config::load(Some(&temp.path().join("missing.toml"))).expect_err("must fail");
        assert!(matches!(err, LayerError::Config(message) if message.contains("missing.toml")));
    }
}
