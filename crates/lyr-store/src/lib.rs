//! Supervisor artifact retrieval and layer archive assembly.

#![deny(clippy::all)]

mod archive;
mod fetch;
mod package;
mod workspace;

pub use archive::{is_zip_archive, EXTRA_DIR, SUPERVISOR_PACKAGE_DIR};
pub use fetch::{
    extract_supervisor_entries, FetchedArtifact, GithubSource, SourceOptions, SupervisorSource,
    DEFAULT_API_BASE, DEFAULT_ARCHIVE_BASE,
};
pub use package::{assemble, package, AssembledLayer, PackagedLayer, PYTHON_DIR};
pub use workspace::Workspace;
