use std::fs;
use std::path::{Path, PathBuf};

use lyr_domain::{LayerError, Result};
use tracing::debug;

const WORKSPACE_PREFIX: &str = "lyr-";

/// Scratch space for one packaging attempt.
///
/// Holds the raw extraction directory, the assembled layer tree, and the
/// final archive path. Everything lives under one private temp directory that
/// is removed on drop, so failures cannot leak the archive.
pub struct Workspace {
    inner: Option<tempfile::TempDir>,
    root: PathBuf,
    archive_path: PathBuf,
}

impl Workspace {
    /// Creates a fresh workspace under `tmp_root` for `layer_name`.
    ///
    /// # Errors
    /// Returns [`LayerError::FileSystem`] when the directories cannot be created.
    pub fn new_in(tmp_root: &Path, layer_name: &str) -> Result<Self> {
        fs::create_dir_all(tmp_root).map_err(|err| LayerError::fs(tmp_root, err))?;
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(tmp_root)
            .map_err(|err| LayerError::fs(tmp_root, err))?;
        let root = dir.path().to_path_buf();
        for sub in [root.join("extract"), root.join("code")] {
            fs::create_dir(&sub).map_err(|err| LayerError::fs(&sub, err))?;
        }
        let archive_path = root.join(format!("{layer_name}.zip"));
        debug!(workspace = %root.display(), "allocated layer workspace");
        Ok(Self {
            inner: Some(dir),
            root,
            archive_path,
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory receiving the filtered release entries.
    #[must_use]
    pub fn extract_dir(&self) -> PathBuf {
        self.root.join("extract")
    }

    /// Directory holding the layer tree as it will appear in the archive.
    #[must_use]
    pub fn code_dir(&self) -> PathBuf {
        self.root.join("code")
    }

    #[must_use]
    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    /// Removes the workspace now, reporting failures instead of ignoring them.
    ///
    /// # Errors
    /// Returns [`LayerError::FileSystem`] when the tree cannot be removed.
    pub fn release(mut self) -> Result<()> {
        let Some(dir) = self.inner.take() else {
            return Ok(());
        };
        let path = dir.keep();
        remove_dir_all_writable(&path)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let Some(dir) = self.inner.take() else {
            return;
        };
        let path = dir.keep();
        let _ = remove_dir_all_writable(&path);
    }
}

/// Best-effort recursive chmod; extracted release files may be read-only.
#[cfg(unix)]
fn make_writable_recursive(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let Ok(meta) = fs::symlink_metadata(path) else {
        return;
    };
    if meta.file_type().is_symlink() {
        return;
    }
    let mode = if meta.is_dir() { 0o755 } else { 0o644 };
    let _ = fs::set_permissions(path, fs::Permissions::from_mode(mode));
    if meta.is_dir() {
        if let Ok(entries) = fs::read_dir(path) {
            for entry in entries.flatten() {
                make_writable_recursive(&entry.path());
            }
        }
    }
}

#[cfg(not(unix))]
fn make_writable_recursive(path: &Path) {
    let Ok(meta) = fs::symlink_metadata(path) else {
        return;
    };
    let mut perms = meta.permissions();
    if perms.readonly() {
        perms.set_readonly(false);
        let _ = fs::set_permissions(path, perms);
    }
    if meta.is_dir() {
        if let Ok(entries) = fs::read_dir(path) {
            for entry in entries.flatten() {
                make_writable_recursive(&entry.path());
            }
        }
    }
}

fn remove_dir_all_writable(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(LayerError::fs(path, err)),
    }
    make_writable_recursive(path);
    fs::remove_dir_all(path).map_err(|err| LayerError::fs(path, err))
}
