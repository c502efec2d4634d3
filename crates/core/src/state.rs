//! Recorded file system state
//!
//! Tracks `(relative path, mtime, checksum)` per file, anchored at an
//! absolute location. The recorded state of the previous snapshot is what
//! the diff engine compares the live tree against.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rkyv::rancor::Error as RkyvError;
use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use serde::{Deserialize, Serialize};

use crate::checksum::Checksum;

/// State of one regular file at one point in time. Equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileState {
    /// Path relative to the owning state's location, starting with the root
    /// dir name
    pub path: PathBuf,
    /// Modification time observed when the state was recorded
    pub modified: SystemTime,
    /// Content checksum
    pub checksum: Checksum,
}

impl FileState {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, modified: SystemTime, checksum: Checksum) -> Self {
        Self {
            path: path.into(),
            modified,
            checksum,
        }
    }
}

/// Recorded state of a whole tree: one [`FileState`] per relative path.
///
/// Paths are pairwise unique. Built through [`Builder`] and immutable
/// afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSystemState {
    location: PathBuf,
    files: HashMap<PathBuf, FileState>,
}

impl FileSystemState {
    /// An empty state anchored at `location`
    #[must_use]
    pub fn empty(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            files: HashMap::new(),
        }
    }

    /// Start building a state anchored at `location`
    #[must_use]
    pub fn builder(location: impl Into<PathBuf>) -> Builder {
        Builder {
            location: location.into(),
            files: HashMap::new(),
        }
    }

    /// Absolute location the relative paths resolve against
    #[must_use]
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Look up the state recorded for a relative path
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&FileState> {
        self.files.get(path)
    }

    /// Number of recorded files
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Iterate over all recorded file states
    pub fn iter(&self) -> impl Iterator<Item = &FileState> {
        self.files.values()
    }

    /// The same file set anchored at a different absolute location.
    ///
    /// Used when persisting a finished snapshot: entries stay relative, the
    /// anchor becomes the snapshot directory they were materialized into.
    #[must_use]
    pub fn relocated(self, location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            files: self.files,
        }
    }

    /// Load a previously saved state. Returns `None` when no state file
    /// exists at `path`.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> color_eyre::Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let bytes = std::fs::read(path)?;
        let archived = rkyv::access::<ArchivedStoredState, RkyvError>(&bytes)
            .map_err(|e| color_eyre::eyre::eyre!("failed to access archived state: {e}"))?;
        let stored: StoredState = rkyv::deserialize::<StoredState, RkyvError>(archived)
            .map_err(|e| color_eyre::eyre::eyre!("failed to deserialize state: {e}"))?;

        let files = stored
            .files
            .into_iter()
            .map(|(path, state)| {
                let path = PathBuf::from(path);
                let file_state = FileState::new(
                    path.clone(),
                    decode_mtime(state.mtime_secs, state.mtime_nanos),
                    Checksum::from_raw(state.checksum),
                );
                (path, file_state)
            })
            .collect();

        Ok(Some(Self {
            location: PathBuf::from(stored.location),
            files,
        }))
    }

    /// Save the state to a file, creating parent directories as needed.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> color_eyre::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let stored = StoredState {
            location: self.location.to_string_lossy().into_owned(),
            files: self
                .files
                .iter()
                .map(|(path, state)| {
                    let (mtime_secs, mtime_nanos) = encode_mtime(state.modified);
                    (
                        path.to_string_lossy().into_owned(),
                        StoredFileState {
                            checksum: *state.checksum.as_bytes(),
                            mtime_secs,
                            mtime_nanos,
                        },
                    )
                })
                .collect(),
        };

        let bytes = rkyv::to_bytes::<RkyvError>(&stored)
            .map_err(|e| color_eyre::eyre::eyre!("failed to serialize state: {e}"))?;
        std::fs::write(path, &bytes)?;
        Ok(())
    }
}

/// Add-only builder; [`Builder::build`] freezes the state.
#[derive(Debug)]
pub struct Builder {
    location: PathBuf,
    files: HashMap<PathBuf, FileState>,
}

impl Builder {
    /// Record a file state. A later add for the same path replaces the
    /// earlier one.
    pub fn add(&mut self, state: FileState) {
        self.files.insert(state.path.clone(), state);
    }

    #[must_use]
    pub fn build(self) -> FileSystemState {
        FileSystemState {
            location: self.location,
            files: self.files,
        }
    }
}

/// On-disk record of one file (rkyv archive)
#[derive(Archive, RkyvSerialize, RkyvDeserialize, Debug, Clone, PartialEq, Eq)]
#[rkyv(derive(Debug))]
struct StoredFileState {
    checksum: [u8; 32],
    /// Seconds since UNIX epoch; pre-epoch mtimes clamp to zero
    mtime_secs: i64,
    mtime_nanos: u32,
}

/// On-disk record of a whole state (rkyv archive)
#[derive(Archive, RkyvSerialize, RkyvDeserialize, Debug, Clone, Default)]
#[rkyv(derive(Debug))]
struct StoredState {
    location: String,
    /// Relative path (as string) -> recorded file state
    files: HashMap<String, StoredFileState>,
}

fn encode_mtime(modified: SystemTime) -> (i64, u32) {
    modified
        .duration_since(UNIX_EPOCH)
        .map(|d| (d.as_secs() as i64, d.subsec_nanos()))
        .unwrap_or((0, 0))
}

fn decode_mtime(secs: i64, nanos: u32) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs as u64, nanos)
    } else {
        UNIX_EPOCH - Duration::from_secs((-secs) as u64)
    }
}
