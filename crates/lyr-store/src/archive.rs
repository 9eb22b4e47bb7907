use std::fs::{self, File};
use std::io::{self, Read, Seek};
use std::path::Path;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use lyr_domain::{LayerError, Result};
use sha2::{Digest, Sha256};
use tracing::debug;
use zip::ZipArchive;

/// Release subtree holding the supervisor Python package.
pub const SUPERVISOR_PACKAGE_DIR: &str = "faassupervisor";
/// Release subtree holding bundled dependency archives.
pub const EXTRA_DIR: &str = "extra";

const ZIP_MAGIC: [&[u8; 4]; 2] = [b"PK\x03\x04", b"PK\x05\x06"];

/// Unpacks the entries of `archive` accepted by `keep` into `dest`.
///
/// Entries whose names would escape `dest` are skipped. Returns the number of
/// files written.
pub(crate) fn unpack_zip<R, F>(archive: &mut ZipArchive<R>, dest: &Path, mut keep: F) -> Result<usize>
where
    R: Read + Seek,
    F: FnMut(&str) -> bool,
{
    let mut written = 0;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| LayerError::archive(format!("unreadable entry #{i}: {err}")))?;
        if !keep(entry.name()) {
            continue;
        }
        let Some(enclosed) = entry.enclosed_name().map(|p| dest.join(p)) else {
            debug!(entry = entry.name(), "skipping entry outside destination");
            continue;
        };
        if entry.name().ends_with('/') || entry.is_dir() {
            fs::create_dir_all(&enclosed).map_err(|err| LayerError::fs(&enclosed, err))?;
            continue;
        }
        if let Some(parent) = enclosed.parent() {
            fs::create_dir_all(parent).map_err(|err| LayerError::fs(parent, err))?;
        }
        // Later archives replace earlier files, even read-only ones.
        if fs::symlink_metadata(&enclosed).is_ok_and(|meta| !meta.is_dir()) {
            fs::remove_file(&enclosed).map_err(|err| LayerError::fs(&enclosed, err))?;
        }
        let mut outfile = File::create(&enclosed).map_err(|err| LayerError::fs(&enclosed, err))?;
        io::copy(&mut entry, &mut outfile).map_err(|err| LayerError::fs(&enclosed, err))?;
        #[cfg(unix)]
        {
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&enclosed, fs::Permissions::from_mode(mode))
                    .map_err(|err| LayerError::fs(&enclosed, err))?;
            }
        }
        written += 1;
    }
    Ok(written)
}

/// Reports whether the file at `path` starts with a zip signature.
///
/// # Errors
/// Returns [`LayerError::FileSystem`] when the file cannot be read.
pub fn is_zip_archive(path: &Path) -> Result<bool> {
    let mut file = File::open(path).map_err(|err| LayerError::fs(path, err))?;
    let mut magic = [0_u8; 4];
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(ZIP_MAGIC.iter().any(|sig| **sig == magic)),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(err) => Err(LayerError::fs(path, err)),
    }
}

pub(crate) fn compute_sha256(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|err| LayerError::fs(path, err))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0_u8; 32 * 1024];
    loop {
        let read = file.read(&mut buf).map_err(|err| LayerError::fs(path, err))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}
