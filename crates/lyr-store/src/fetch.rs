use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use lyr_domain::{LayerError, Result, SupervisorRelease, LATEST_TAG};
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;
use zip::ZipArchive;

use crate::archive::{unpack_zip, EXTRA_DIR, SUPERVISOR_PACKAGE_DIR};

const USER_AGENT: &str = concat!("lyr-store/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_ARCHIVE_BASE: &str = "https://github.com";
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Result of fetching a release into an extraction directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedArtifact {
    /// Folder every archive entry is rooted under, e.g. `faas-supervisor-1.5.0`.
    pub top_folder: String,
    /// Files written below `extract_dir/top_folder`.
    pub extracted: usize,
    pub size: u64,
}

/// Where supervisor releases come from.
pub trait SupervisorSource {
    /// Turns a tag request into a concrete release tag.
    ///
    /// # Errors
    /// Returns [`LayerError::Fetch`] when the repository cannot be queried.
    fn resolve_tag(&self, release: &SupervisorRelease) -> Result<String>;

    /// Downloads `release` and extracts its relevant entries into `extract_dir`.
    ///
    /// # Errors
    /// Returns [`LayerError::Fetch`] on download failures and
    /// [`LayerError::ArchiveFormat`] when the archive layout is unexpected.
    fn fetch(&self, release: &SupervisorRelease, extract_dir: &Path) -> Result<FetchedArtifact>;
}

#[derive(Debug, Clone)]
pub struct SourceOptions {
    pub archive_base: String,
    pub api_base: String,
    /// `None` leaves requests unbounded.
    pub timeout: Option<Duration>,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            archive_base: DEFAULT_ARCHIVE_BASE.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: None,
        }
    }
}

/// Fetches source archives from a GitHub-style repository host.
pub struct GithubSource {
    client: Client,
    archive_base: Url,
    api_base: Url,
}

#[derive(Deserialize)]
struct ReleaseResponse {
    tag_name: String,
}

impl GithubSource {
    /// # Errors
    /// Returns [`LayerError::Config`] when a base URL is invalid or the HTTP
    /// client cannot be built.
    pub fn new(options: &SourceOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(options.timeout)
            .build()
            .map_err(|err| LayerError::config(format!("failed to build http client: {err}")))?;
        Ok(Self {
            client,
            archive_base: base_url(&options.archive_base)?,
            api_base: base_url(&options.api_base)?,
        })
    }

    /// Location of the source archive for `release`.
    ///
    /// # Errors
    /// Returns [`LayerError::Config`] when the path cannot be joined.
    pub fn archive_url(&self, release: &SupervisorRelease) -> Result<Url> {
        join(&self.archive_base, &release.archive_path())
    }

    fn get(&self, url: &Url) -> Result<reqwest::blocking::Response> {
        self.client
            .get(url.clone())
            .send()
            .map_err(|err| LayerError::fetch(url.as_str(), err))?
            .error_for_status()
            .map_err(|err| LayerError::fetch(url.as_str(), err))
    }

    fn download(&self, url: &Url) -> Result<Vec<u8>> {
        let response = self.get(url)?;
        let bytes = response
            .bytes()
            .map_err(|err| LayerError::fetch(url.as_str(), err))?;
        Ok(bytes.to_vec())
    }
}

impl SupervisorSource for GithubSource {
    fn resolve_tag(&self, release: &SupervisorRelease) -> Result<String> {
        if release.tag != LATEST_TAG {
            return Ok(release.tag.clone());
        }
        let url = join(&self.api_base, &release.latest_release_path())?;
        let response = self.get(&url)?;
        let payload: ReleaseResponse = response
            .json()
            .map_err(|err| LayerError::fetch(url.as_str(), err))?;
        info!(project = %release.project, tag = %payload.tag_name, "resolved latest release");
        Ok(payload.tag_name)
    }

    fn fetch(&self, release: &SupervisorRelease, extract_dir: &Path) -> Result<FetchedArtifact> {
        let url = self.archive_url(release)?;
        debug!(%url, "downloading supervisor release");
        let bytes = self.download(&url)?;
        let size = bytes.len() as u64;
        let (top_folder, extracted) = extract_supervisor_entries(&bytes, extract_dir)?;
        Ok(FetchedArtifact {
            top_folder,
            extracted,
            size,
        })
    }
}

/// Extracts the `extra/` and `faassupervisor/` entries of a release archive.
///
/// Returns the archive's top-level folder and the number of files written.
/// Entries keep their full in-archive path, so they land under
/// `dest/{top_folder}/`.
///
/// # Errors
/// Returns [`LayerError::ArchiveFormat`] when the bytes are not a zip archive
/// or the entries are not rooted under exactly one folder.
pub fn extract_supervisor_entries(bytes: &[u8], dest: &Path) -> Result<(String, usize)> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|err| LayerError::archive(format!("release is not a zip archive: {err}")))?;
    let top_folder = top_level_folder(archive.file_names())?;
    let prefixes = [
        format!("{top_folder}/{SUPERVISOR_PACKAGE_DIR}/"),
        format!("{top_folder}/{EXTRA_DIR}/"),
    ];
    let extracted = unpack_zip(&mut archive, dest, |name| {
        prefixes.iter().any(|prefix| name.starts_with(prefix.as_str()))
    })?;
    debug!(%top_folder, extracted, "extracted supervisor entries");
    Ok((top_folder, extracted))
}

fn top_level_folder<'a>(names: impl Iterator<Item = &'a str>) -> Result<String> {
    let mut top: Option<&str> = None;
    for name in names {
        let Some((folder, _)) = name.split_once('/') else {
            return Err(LayerError::archive(format!(
                "entry '{name}' is not inside a top-level folder"
            )));
        };
        if folder.is_empty() {
            return Err(LayerError::archive(format!("entry '{name}' is absolute")));
        }
        match top {
            None => top = Some(folder),
            Some(existing) if existing == folder => {}
            Some(existing) => {
                return Err(LayerError::archive(format!(
                    "entries are rooted under both '{existing}' and '{folder}'"
                )))
            }
        }
    }
    top.map(ToOwned::to_owned)
        .ok_or_else(|| LayerError::archive("archive has no entries"))
}

fn base_url(raw: &str) -> Result<Url> {
    let mut normalized = raw.trim().to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    Url::parse(&normalized).map_err(|err| LayerError::config(format!("invalid url '{raw}': {err}")))
}

fn join(base: &Url, path: &str) -> Result<Url> {
    base.join(path)
        .map_err(|err| LayerError::config(format!("invalid path '{path}' for {base}: {err}")))
}
