//! Snapshot repository layout and configuration
//!
//! A repository is a directory holding `copysnap.toml`, the recorded state
//! of the latest snapshot, and one `snap-<unix seconds>` directory per
//! snapshot taken.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use color_eyre::Result;
use color_eyre::eyre::{bail, eyre};
use serde::{Deserialize, Serialize};

use copysnap_core::FileSystemState;

/// Repository config file name
pub const CONFIG_FILE: &str = "copysnap.toml";
/// Recorded state of the latest snapshot
pub const STATE_FILE: &str = "state.rkyv";

#[derive(Debug, Serialize, Deserialize)]
struct Config {
    /// Absolute path of the directory being snapshotted
    source: PathBuf,
}

/// An opened snapshot repository.
#[derive(Debug)]
pub struct Context {
    repository: PathBuf,
    source: PathBuf,
}

impl Context {
    /// Create a repository directory with a fresh config.
    ///
    /// # Errors
    /// Returns an error if the source is not an accessible directory or the
    /// repository is already initialized.
    pub fn init(source: &Path, repository: &Path) -> Result<Self> {
        let source = source
            .canonicalize()
            .map_err(|e| eyre!("source {} is not accessible: {e}", source.display()))?;
        if !source.is_dir() {
            bail!("source {} is not a directory", source.display());
        }

        std::fs::create_dir_all(repository)?;
        // Symlink targets are built from this path, so it must be absolute
        let repository = repository.canonicalize()?;
        let config_path = repository.join(CONFIG_FILE);
        if config_path.exists() {
            bail!("repository already initialized: {}", config_path.display());
        }

        let config = Config {
            source: source.clone(),
        };
        std::fs::write(&config_path, toml::to_string_pretty(&config)?)?;

        Ok(Self { repository, source })
    }

    /// Open an existing repository.
    ///
    /// # Errors
    /// Returns an error if no config exists or it cannot be parsed.
    pub fn load(repository: &Path) -> Result<Self> {
        let repository = repository
            .canonicalize()
            .map_err(|e| eyre!("no snapshot repository at {}: {e}", repository.display()))?;
        let config_path = repository.join(CONFIG_FILE);
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| eyre!("no snapshot repository at {}: {e}", repository.display()))?;
        let config: Config = toml::from_str(&content)?;

        Ok(Self {
            repository,
            source: config.source,
        })
    }

    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    #[must_use]
    pub fn repository(&self) -> &Path {
        &self.repository
    }

    fn state_path(&self) -> PathBuf {
        self.repository.join(STATE_FILE)
    }

    /// Latest recorded state, or an empty state before the first snapshot.
    ///
    /// # Errors
    /// Returns an error if the state file exists but cannot be read.
    pub fn load_state(&self) -> Result<FileSystemState> {
        Ok(FileSystemState::load(&self.state_path())?
            .unwrap_or_else(|| FileSystemState::empty(&self.repository)))
    }

    /// Persist the state of the latest snapshot.
    ///
    /// # Errors
    /// Returns an error if the state file cannot be written.
    pub fn save_state(&self, state: &FileSystemState) -> Result<()> {
        state.save(&self.state_path())
    }

    /// Allocate a fresh `snap-<unix seconds>` directory.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn new_snapshot_dir(&self) -> Result<PathBuf> {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let mut dir = self.repository.join(format!("snap-{secs}"));
        let mut bump = 0u32;
        while dir.exists() {
            bump += 1;
            dir = self.repository.join(format!("snap-{secs}-{bump}"));
        }
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}
