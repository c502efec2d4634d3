//! Source tree anchoring and path relativization

use std::path::{Path, PathBuf};

use color_eyre::Result;
use color_eyre::eyre::eyre;

/// An absolute anchor for a source tree: the parent location plus the name
/// of the topmost directory.
///
/// For `/a/b/c/r` the location is `/a/b/c` and the root dir is `r`. All
/// relative paths handed around elsewhere start with the root dir name, so
/// states recorded against different absolute locations stay comparable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Root {
    location: PathBuf,
    root_dir: PathBuf,
}

impl Root {
    /// Build a root from an absolute directory path.
    ///
    /// # Errors
    /// Returns an error if the path is relative or has no final component.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_absolute() {
            return Err(eyre!("root must be absolute: {}", path.display()));
        }
        let root_dir = path
            .file_name()
            .map(PathBuf::from)
            .ok_or_else(|| eyre!("root has no directory name: {}", path.display()))?;
        let location = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| eyre!("root has no parent: {}", path.display()))?;
        Ok(Self { location, root_dir })
    }

    /// The parent of the root directory; relative paths resolve against this
    #[must_use]
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Name of the topmost directory
    #[must_use]
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Absolute path of the root directory itself
    #[must_use]
    pub fn path_to_root_dir(&self) -> PathBuf {
        self.location.join(&self.root_dir)
    }

    /// Relativize an absolute path against this root's location. The result
    /// starts with the root dir name.
    ///
    /// # Errors
    /// Returns an error if `abs` does not lie beneath the location.
    pub fn relativize(&self, abs: &Path) -> Result<PathBuf> {
        abs.strip_prefix(&self.location)
            .map(Path::to_path_buf)
            .map_err(|_| {
                eyre!(
                    "path {} is outside of {}",
                    abs.display(),
                    self.location.display()
                )
            })
    }
}
