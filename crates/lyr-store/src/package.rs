use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use lyr_domain::{LayerError, Result};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::{write::FileOptions, CompressionMethod, ZipArchive, ZipWriter};

use crate::archive::{compute_sha256, is_zip_archive, unpack_zip, EXTRA_DIR, SUPERVISOR_PACKAGE_DIR};

/// Reserved prefix the runtime imports layer code from.
pub const PYTHON_DIR: &str = "python";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledLayer {
    pub supervisor_dir: PathBuf,
    /// Nested archives from `extra/` expanded into the layer root.
    pub expanded_archives: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedLayer {
    pub path: PathBuf,
    pub size: u64,
    pub entries: usize,
    pub sha256: String,
}

/// Builds the layer tree in `code_dir` from an extracted release.
///
/// The supervisor package moves to `python/faassupervisor`; every zip found
/// under `extra/` is expanded into the root of `code_dir`.
///
/// # Errors
/// Returns [`LayerError::ArchiveFormat`] when the release carries no
/// supervisor package or a bundled archive is corrupt, and
/// [`LayerError::FileSystem`] for IO failures.
pub fn assemble(extract_dir: &Path, top_folder: &str, code_dir: &Path) -> Result<AssembledLayer> {
    let release_root = extract_dir.join(top_folder);
    let supervisor_src = release_root.join(SUPERVISOR_PACKAGE_DIR);
    if !supervisor_src.is_dir() {
        return Err(LayerError::archive(format!(
            "release '{top_folder}' has no {SUPERVISOR_PACKAGE_DIR}/ package"
        )));
    }
    let python_dir = code_dir.join(PYTHON_DIR);
    fs::create_dir_all(&python_dir).map_err(|err| LayerError::fs(&python_dir, err))?;
    let supervisor_dir = python_dir.join(SUPERVISOR_PACKAGE_DIR);
    fs::rename(&supervisor_src, &supervisor_dir)
        .map_err(|err| LayerError::fs(&supervisor_dir, err))?;

    let expanded_archives = expand_extra_archives(&release_root.join(EXTRA_DIR), code_dir)?;
    Ok(AssembledLayer {
        supervisor_dir,
        expanded_archives,
    })
}

fn expand_extra_archives(extra_dir: &Path, code_dir: &Path) -> Result<usize> {
    if !extra_dir.is_dir() {
        return Ok(0);
    }
    let mut expanded = 0;
    for entry in WalkDir::new(extra_dir).sort_by_file_name() {
        let entry = entry.map_err(|err| LayerError::fs(extra_dir, err))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if !is_zip_archive(path)? {
            debug!(file = %path.display(), "skipping non-archive extra file");
            continue;
        }
        let file = File::open(path).map_err(|err| LayerError::fs(path, err))?;
        let mut archive = ZipArchive::new(file).map_err(|err| {
            LayerError::archive(format!("bundled archive {} is corrupt: {err}", path.display()))
        })?;
        let files = unpack_zip(&mut archive, code_dir, |_| true)?;
        debug!(archive = %path.display(), files, "expanded bundled archive");
        expanded += 1;
    }
    Ok(expanded)
}

/// Zips the whole `code_dir` tree into `output`.
///
/// The archive is written to a sibling temp file first and moved into place,
/// so an existing `output` is never left half-written.
///
/// # Errors
/// Returns [`LayerError::FileSystem`] when the tree cannot be read or the
/// archive cannot be written.
pub fn package(code_dir: &Path, output: &Path) -> Result<PackagedLayer> {
    let parent = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|err| LayerError::fs(parent, err))?;
    let mut tmp = NamedTempFile::new_in(parent).map_err(|err| LayerError::fs(parent, err))?;
    let entries = write_tree(code_dir, tmp.as_file_mut(), output)?;
    tmp.persist(output)
        .map_err(|err| LayerError::fs(output, err.error))?;

    let size = fs::metadata(output)
        .map_err(|err| LayerError::fs(output, err))?
        .len();
    let sha256 = compute_sha256(output)?;
    info!(archive = %output.display(), entries, size, "packaged layer archive");
    Ok(PackagedLayer {
        path: output.to_path_buf(),
        size,
        entries,
        sha256,
    })
}

fn write_tree(code_dir: &Path, sink: &mut File, output: &Path) -> Result<usize> {
    let zip_err = |err: zip::result::ZipError| LayerError::fs(output, err);
    let mut zip = ZipWriter::new(sink);
    let mut entries = 0;
    for entry in WalkDir::new(code_dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|err| LayerError::fs(code_dir, err))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let name = archive_name(code_dir, path)?;
        let mut options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        #[cfg(unix)]
        {
            let mode = entry
                .metadata()
                .map_err(|err| LayerError::fs(path, err))?
                .permissions()
                .mode();
            options = options.unix_permissions(mode);
        }
        zip.start_file(name, options).map_err(zip_err)?;
        let mut file = File::open(path).map_err(|err| LayerError::fs(path, err))?;
        io::copy(&mut file, &mut zip).map_err(|err| LayerError::fs(path, err))?;
        entries += 1;
    }
    zip.finish().map_err(zip_err)?;
    Ok(entries)
}

fn archive_name(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|err| LayerError::fs(path, err))?;
    let parts: Vec<String> = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}
