//! Filesystem access boundary
//!
//! The diff engine and copy actions touch the filesystem only through
//! [`FileSystemAccessor`]. Implementations may be backed by OS calls, an
//! in-memory map, or a recording mock, which keeps the engine deterministic
//! under test.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use color_eyre::Result;
use ignore::WalkBuilder;

use crate::checksum::Checksum;

/// Iterator over the absolute paths of regular files beneath a directory.
///
/// Finite and single-pass; callers that need two passes must collect first.
pub type FileIter = Box<dyn Iterator<Item = Result<PathBuf>>>;

/// Abstract filesystem operations needed by diffing and copying.
///
/// All methods may fail with an I/O error.
pub trait FileSystemAccessor {
    /// Enumerate regular files beneath `dir`. Order is unspecified.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be listed. Individual
    /// entries may also fail while the iterator is drained.
    fn find_files(&self, dir: &Path) -> Result<FileIter>;

    /// Modification time of the file at `path`
    ///
    /// # Errors
    /// Returns an error if the file cannot be inspected
    fn last_modified(&self, path: &Path) -> Result<SystemTime>;

    /// Stream the file at `path` and compare its digest against `expected`
    ///
    /// # Errors
    /// Returns an error if the file cannot be read
    fn checksums_equal(&self, expected: &Checksum, path: &Path) -> Result<bool>;

    /// Stream the file at `path` and return its digest
    ///
    /// # Errors
    /// Returns an error if the file cannot be read
    fn compute_checksum(&self, path: &Path) -> Result<Checksum>;

    /// Create `path` and all missing parent directories
    ///
    /// # Errors
    /// Returns an error if a directory cannot be created
    fn create_directories(&self, path: &Path) -> Result<()>;

    /// Create a symbolic link at `link` pointing at `target`
    ///
    /// # Errors
    /// Returns an error if the link cannot be created
    fn create_symbolic_link(&self, link: &Path, target: &Path) -> Result<()>;

    /// Open the file at `path` for reading
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened
    fn open_input(&self, path: &Path) -> Result<Box<dyn Read>>;

    /// Create the file at `path` and open it for writing
    ///
    /// # Errors
    /// Returns an error if the file cannot be created
    fn open_output(&self, path: &Path) -> Result<Box<dyn Write>>;
}

/// Accessor backed by the real filesystem.
///
/// Walks with every ignore filter disabled: a snapshot must see hidden and
/// gitignored files alike.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsAccessor;

impl OsAccessor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl FileSystemAccessor for OsAccessor {
    fn find_files(&self, dir: &Path) -> Result<FileIter> {
        let mut builder = WalkBuilder::new(dir);
        builder
            .hidden(false)
            .ignore(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .parents(false)
            .require_git(false);

        let iter = builder.build().filter_map(|entry| match entry {
            Ok(entry) => {
                if entry.file_type().is_some_and(|t| t.is_file()) {
                    Some(Ok(entry.into_path()))
                } else {
                    None
                }
            }
            Err(e) => Some(Err(e.into())),
        });
        Ok(Box::new(iter))
    }

    fn last_modified(&self, path: &Path) -> Result<SystemTime> {
        Ok(std::fs::metadata(path)?.modified()?)
    }

    fn checksums_equal(&self, expected: &Checksum, path: &Path) -> Result<bool> {
        Ok(self.compute_checksum(path)? == *expected)
    }

    fn compute_checksum(&self, path: &Path) -> Result<Checksum> {
        Checksum::from_reader(File::open(path)?)
    }

    fn create_directories(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)?;
        Ok(())
    }

    fn create_symbolic_link(&self, link: &Path, target: &Path) -> Result<()> {
        #[cfg(unix)]
        std::os::unix::fs::symlink(target, link)?;

        #[cfg(windows)]
        if target.is_dir() {
            std::os::windows::fs::symlink_dir(target, link)?;
        } else {
            std::os::windows::fs::symlink_file(target, link)?;
        }

        Ok(())
    }

    fn open_input(&self, path: &Path) -> Result<Box<dyn Read>> {
        Ok(Box::new(File::open(path)?))
    }

    fn open_output(&self, path: &Path) -> Result<Box<dyn Write>> {
        Ok(Box::new(File::create(path)?))
    }
}
