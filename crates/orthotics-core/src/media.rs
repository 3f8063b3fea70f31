//! Storage for uploaded scans and attachments.

use std::io;
use std::path::{Component, Path, PathBuf};

use strict_path::{PathBoundary, StrictPath, StrictPathError};
use thiserror::Error;

/// Media storage errors.
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Path escapes the media root: {0}")]
    InvalidPath(String),
}

pub type MediaResult<T> = Result<T, MediaError>;

/// Where uploaded files live. Paths are relative media paths such as
/// `scans/left/<id>_left.stl`.
pub trait MediaStore: Send + Sync {
    fn save(&self, path: &str, content: &[u8]) -> MediaResult<()>;

    /// Remove a stored file. Removing a missing file is not an error.
    fn delete(&self, path: &str) -> MediaResult<()>;
}

/// Files under a root directory on the local filesystem. Every path is
/// canonicalized against the root, so symlinks cannot lead outside it.
#[derive(Debug, Clone)]
pub struct FsMediaStore {
    root: PathBuf,
}

impl FsMediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn boundary(&self) -> MediaResult<PathBoundary> {
        PathBoundary::try_new_create(&self.root).map_err(|e| match e {
            StrictPathError::InvalidRestriction { source, .. } => MediaError::Io(source),
            other => MediaError::InvalidPath(other.to_string()),
        })
    }

    /// Resolve a media path inside the root. Only plain relative paths
    /// naming something below the root are accepted.
    pub fn resolve(&self, path: &str) -> MediaResult<StrictPath> {
        let names_a_file = Path::new(path)
            .components()
            .any(|component| matches!(component, Component::Normal(_)));
        if !names_a_file || Path::new(path).is_absolute() {
            return Err(MediaError::InvalidPath(path.to_string()));
        }

        self.boundary()?.strict_join(path).map_err(|e| {
            log::warn!("Rejected media path {}: {}", path, e);
            MediaError::InvalidPath(path.to_string())
        })
    }
}

impl MediaStore for FsMediaStore {
    fn save(&self, path: &str, content: &[u8]) -> MediaResult<()> {
        let target = self.resolve(path)?;
        target.create_parent_dir_all()?;
        target.write(content)?;
        log::debug!("Stored {} ({} bytes)", path, content.len());
        Ok(())
    }

    fn delete(&self, path: &str) -> MediaResult<()> {
        let target = self.resolve(path)?;
        match target.remove_file() {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
