//! Copy actions materializing a planned snapshot

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use color_eyre::Result;

use crate::accessor::FileSystemAccessor;
use crate::checksum::Checksum;
use crate::state::FileState;

/// A single planned materialization step.
///
/// Equality and ordering are structural on the variant and all three paths,
/// so plans compare as sets.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CopyAction {
    /// Stream the current file's bytes into the destination
    Plain {
        source_root: PathBuf,
        destination_root: PathBuf,
        path: PathBuf,
    },
    /// Point a symbolic link at the same path inside the previous snapshot
    Symlink {
        source_root: PathBuf,
        destination_root: PathBuf,
        path: PathBuf,
    },
}

impl CopyAction {
    #[must_use]
    pub fn plain(source_root: &Path, destination_root: &Path, path: PathBuf) -> Self {
        Self::Plain {
            source_root: source_root.to_path_buf(),
            destination_root: destination_root.to_path_buf(),
            path,
        }
    }

    #[must_use]
    pub fn symlink(source_root: &Path, destination_root: &Path, path: PathBuf) -> Self {
        Self::Symlink {
            source_root: source_root.to_path_buf(),
            destination_root: destination_root.to_path_buf(),
            path,
        }
    }

    /// The relative path this action realizes
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Plain { path, .. } | Self::Symlink { path, .. } => path,
        }
    }

    /// Absolute path this action creates
    #[must_use]
    pub fn destination(&self) -> PathBuf {
        match self {
            Self::Plain {
                destination_root,
                path,
                ..
            }
            | Self::Symlink {
                destination_root,
                path,
                ..
            } => destination_root.join(path),
        }
    }

    /// Execute against `fsa`: ensure parent directories exist, then perform
    /// the single primitive.
    ///
    /// A plain copy returns the state of the file it produced; a symlink
    /// returns `None`, since files covered by an alias inherit their prior
    /// states.
    ///
    /// # Errors
    /// Returns an error if any filesystem operation fails.
    pub fn execute(&self, fsa: &dyn FileSystemAccessor) -> Result<Option<FileState>> {
        match self {
            Self::Plain {
                source_root,
                destination_root,
                path,
            } => {
                let source = source_root.join(path);
                let destination = destination_root.join(path);
                create_parent_dirs(&destination, fsa)?;

                let modified = fsa.last_modified(&source)?;
                let mut input = fsa.open_input(&source)?;
                let mut output = fsa.open_output(&destination)?;
                let checksum = copy_and_hash(input.as_mut(), output.as_mut())?;

                Ok(Some(FileState::new(path.clone(), modified, checksum)))
            }
            Self::Symlink {
                source_root,
                destination_root,
                path,
            } => {
                let target = source_root.join(path);
                let link = destination_root.join(path);
                create_parent_dirs(&link, fsa)?;
                fsa.create_symbolic_link(&link, &target)?;
                Ok(None)
            }
        }
    }
}

fn create_parent_dirs(path: &Path, fsa: &dyn FileSystemAccessor) -> Result<()> {
    if let Some(parent) = path.parent() {
        fsa.create_directories(parent)?;
    }
    Ok(())
}

/// Stream `input` into `output`, digesting the bytes on the way through.
fn copy_and_hash(input: &mut dyn Read, output: &mut dyn Write) -> Result<Checksum> {
    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0u8; 64 * 1024];

    loop {
        let bytes_read = input.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
        output.write_all(&buffer[..bytes_read])?;
    }
    output.flush()?;

    Ok(Checksum::from_raw(*hasher.finalize().as_bytes()))
}
