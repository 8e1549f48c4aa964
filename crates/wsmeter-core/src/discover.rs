//! Workspace discovery.
//!
//! Every immediate subdirectory of the monitored root is one workspace,
//! named after the directory. Discovery re-lists the root on every call.

use std::fs::{self, ReadDir};
use std::path::{Path, PathBuf};

use tracing::{trace, warn};

/// Error type for discovery failures. Both are configuration errors.
#[derive(Debug)]
pub enum DiscoverError {
    /// Root does not exist or is not a directory.
    NotADirectory(PathBuf),
    /// Root could not be listed.
    Io(PathBuf, std::io::Error),
}

impl std::fmt::Display for DiscoverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoverError::NotADirectory(path) => {
                write!(f, "{} is not a directory", path.display())
            }
            DiscoverError::Io(path, e) => write!(f, "cannot list {}: {}", path.display(), e),
        }
    }
}

impl std::error::Error for DiscoverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DiscoverError::Io(_, e) => Some(e),
            DiscoverError::NotADirectory(_) => None,
        }
    }
}

/// Request to sample one workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRequest {
    /// Workspace name (directory basename).
    pub workspace: String,
    /// Path of the workspace directory.
    pub path: PathBuf,
}

impl SampleRequest {
    pub fn new(workspace: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            path: path.into(),
        }
    }
}

/// Lazy iterator over the workspaces under a root.
#[derive(Debug)]
pub struct Workspaces {
    root: PathBuf,
    entries: ReadDir,
}

impl Iterator for Workspaces {
    type Item = SampleRequest;

    fn next(&mut self) -> Option<SampleRequest> {
        for entry in self.entries.by_ref() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry in {}: {}", self.root.display(), e);
                    continue;
                }
            };

            let path = entry.path();
            if !path.is_dir() {
                trace!("Skipping non-directory {}", path.display());
                continue;
            }

            let workspace = entry.file_name().to_string_lossy().into_owned();
            return Some(SampleRequest { workspace, path });
        }
        None
    }
}

/// Lists the workspaces under `root`.
///
/// Fails fast if `root` is not an existing directory.
pub fn discover(root: &Path) -> Result<Workspaces, DiscoverError> {
    if !root.is_dir() {
        return Err(DiscoverError::NotADirectory(root.to_path_buf()));
    }
    let entries = fs::read_dir(root).map_err(|e| DiscoverError::Io(root.to_path_buf(), e))?;
    Ok(Workspaces {
        root: root.to_path_buf(),
        entries,
    })
}
