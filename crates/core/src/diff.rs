//! Tree differencing against a recorded state
//!
//! Walks the current source tree and classifies every file against the
//! recorded state of the previous snapshot. Matching mtimes short-circuit
//! content hashing; otherwise the content decides.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use color_eyre::Result;

use crate::accessor::FileSystemAccessor;
use crate::plan::CopyPlan;
use crate::root::Root;
use crate::state::{FileState, FileSystemState};

/// How a single path relates to the prior state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// No prior record exists
    New,
    /// Content differs from the prior record
    Changed,
    /// Mtime matches the prior record; content taken as identical
    Unchanged,
    /// Mtime moved but content is identical; unchanged for planning purposes
    UnchangedButTouched,
    /// Present in the prior state, absent from the current tree
    Removed,
    /// Could not be classified; dropped from the new state
    Error,
}

impl Classification {
    /// Whether an aliasing symlink may cover this entry
    #[must_use]
    pub fn is_unchanged(self) -> bool {
        matches!(self, Self::Unchanged | Self::UnchangedButTouched)
    }
}

/// Per-file counters of one diff run. Reporting only; the planner derives
/// nothing from these.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffCounts {
    /// Files that failed to classify
    pub errors: usize,
    /// Prior files no longer present
    pub removed: usize,
    /// Files needing a plain copy
    pub new_or_changed: usize,
    /// Files coverable by symlink aliases
    pub unchanged: usize,
    /// Reserved reporting slot, kept at zero
    pub reserved: usize,
}

/// Computes diffs through a [`FileSystemAccessor`].
pub struct DiffEngine<'a, A: FileSystemAccessor + ?Sized> {
    fsa: &'a A,
}

impl<'a, A: FileSystemAccessor + ?Sized> DiffEngine<'a, A> {
    #[must_use]
    pub fn new(fsa: &'a A) -> Self {
        Self { fsa }
    }

    /// Classify every file under `source_root` against `prior`.
    ///
    /// A failure to classify a single file is counted and the path dropped
    /// from the new state; the run continues. Prior paths never seen during
    /// enumeration come out as [`Classification::Removed`].
    ///
    /// # Errors
    /// Returns an error if the source root cannot be enumerated.
    pub fn compute_diff(
        &self,
        source_root: &Root,
        prior: &FileSystemState,
    ) -> Result<FileSystemDiff> {
        let mut entries: BTreeMap<PathBuf, Classification> = BTreeMap::new();
        let mut builder = FileSystemState::builder(source_root.location());
        let mut counts = DiffCounts::default();

        for found in self.fsa.find_files(&source_root.path_to_root_dir())? {
            let abs = found?;
            let rel = source_root.relativize(&abs)?;

            match self.classify(&abs, &rel, prior) {
                Ok((classification, state)) => {
                    match classification {
                        Classification::New | Classification::Changed => {
                            counts.new_or_changed += 1;
                        }
                        _ => counts.unchanged += 1,
                    }
                    entries.insert(rel, classification);
                    builder.add(state);
                }
                Err(_) => {
                    counts.errors += 1;
                    entries.insert(rel, Classification::Error);
                }
            }
        }

        for prior_state in prior.iter() {
            if !entries.contains_key(&prior_state.path) {
                entries.insert(prior_state.path.clone(), Classification::Removed);
                counts.removed += 1;
            }
        }

        Ok(FileSystemDiff {
            source_location: source_root.location().to_path_buf(),
            prior_location: prior.location().to_path_buf(),
            entries,
            new_state: builder.build(),
            counts,
        })
    }

    fn classify(
        &self,
        abs: &Path,
        rel: &Path,
        prior: &FileSystemState,
    ) -> Result<(Classification, FileState)> {
        let Some(prior_state) = prior.get(rel) else {
            let checksum = self.fsa.compute_checksum(abs)?;
            let modified = self.fsa.last_modified(abs)?;
            return Ok((
                Classification::New,
                FileState::new(rel.to_path_buf(), modified, checksum),
            ));
        };

        let modified = self.fsa.last_modified(abs)?;
        if modified == prior_state.modified {
            // Content is not re-read on a matching mtime
            return Ok((Classification::Unchanged, prior_state.clone()));
        }

        if self.fsa.checksums_equal(&prior_state.checksum, abs)? {
            Ok((
                Classification::UnchangedButTouched,
                FileState::new(rel.to_path_buf(), modified, prior_state.checksum),
            ))
        } else {
            let checksum = self.fsa.compute_checksum(abs)?;
            Ok((
                Classification::Changed,
                FileState::new(rel.to_path_buf(), modified, checksum),
            ))
        }
    }
}

/// Outcome of one diff run: per-path classifications, the fresh state of
/// everything that currently exists, and counters.
#[derive(Debug)]
pub struct FileSystemDiff {
    source_location: PathBuf,
    prior_location: PathBuf,
    entries: BTreeMap<PathBuf, Classification>,
    new_state: FileSystemState,
    counts: DiffCounts,
}

impl FileSystemDiff {
    /// Counters of the run
    #[must_use]
    pub fn counts(&self) -> DiffCounts {
        self.counts
    }

    /// State of every file that currently exists under the source root
    #[must_use]
    pub fn new_state(&self) -> &FileSystemState {
        &self.new_state
    }

    /// Consume the diff, keeping only the new state
    #[must_use]
    pub fn into_new_state(self) -> FileSystemState {
        self.new_state
    }

    /// Absolute location current files are relative to
    #[must_use]
    pub fn source_location(&self) -> &Path {
        &self.source_location
    }

    /// Absolute location of the previous snapshot
    #[must_use]
    pub fn prior_location(&self) -> &Path {
        &self.prior_location
    }

    /// Classification of a single relative path, if it was part of the run
    #[must_use]
    pub fn classification(&self, path: &Path) -> Option<Classification> {
        self.entries.get(path).copied()
    }

    /// All classified paths, ordered
    pub fn entries(&self) -> impl Iterator<Item = (&Path, Classification)> {
        self.entries.iter().map(|(path, c)| (path.as_path(), *c))
    }

    /// Plan the minimal action set that materializes the current tree at
    /// `destination`.
    #[must_use]
    pub fn compute_copy_actions(&self, destination: &Path) -> CopyPlan {
        CopyPlan::compute(self, destination)
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;
    use crate::accessor::mock::MockAccessor;
    use crate::checksum::Checksum;

    fn secs(s: u64) -> std::time::SystemTime {
        UNIX_EPOCH + Duration::from_secs(s)
    }

    #[test]
    fn test_new_file_gets_fresh_checksum() {
        let root = Root::new("/x/y/z/r").unwrap();
        let checksum = Checksum::from_bytes(b"fresh");
        let fsa = MockAccessor::default()
            .with_listing("/x/y/z/r", vec![PathBuf::from("/x/y/z/r/f")])
            .with_file("/x/y/z/r/f", secs(100), checksum);

        let prior = FileSystemState::empty("/p/q/rold");
        let diff = DiffEngine::new(&fsa).compute_diff(&root, &prior).unwrap();

        assert_eq!(
            diff.classification(Path::new("r/f")),
            Some(Classification::New)
        );
        let state = diff.new_state().get(Path::new("r/f")).unwrap();
        assert_eq!(state.checksum, checksum);
        assert_eq!(state.modified, secs(100));
    }

    #[test]
    fn test_matching_mtime_skips_content_read() {
        let root = Root::new("/x/y/z/r").unwrap();
        let prior_checksum = Checksum::from_bytes(b"recorded");
        // No checksum registered for the file: any content read would error
        let mut fsa = MockAccessor::default()
            .with_listing("/x/y/z/r", vec![PathBuf::from("/x/y/z/r/f")]);
        fsa.mtimes.insert(PathBuf::from("/x/y/z/r/f"), secs(100));

        let mut builder = FileSystemState::builder("/p/q/rold");
        builder.add(FileState::new(
            PathBuf::from("r/f"),
            secs(100),
            prior_checksum,
        ));
        let prior = builder.build();

        let diff = DiffEngine::new(&fsa).compute_diff(&root, &prior).unwrap();

        assert_eq!(
            diff.classification(Path::new("r/f")),
            Some(Classification::Unchanged)
        );
        let state = diff.new_state().get(Path::new("r/f")).unwrap();
        assert_eq!(state.checksum, prior_checksum);
    }

    #[test]
    fn test_touched_file_keeps_prior_checksum() {
        let root = Root::new("/x/y/z/r").unwrap();
        let checksum = Checksum::from_bytes(b"same content");
        let fsa = MockAccessor::default()
            .with_listing("/x/y/z/r", vec![PathBuf::from("/x/y/z/r/f")])
            .with_file("/x/y/z/r/f", secs(101), checksum);

        let mut builder = FileSystemState::builder("/p/q/rold");
        builder.add(FileState::new(PathBuf::from("r/f"), secs(100), checksum));
        let prior = builder.build();

        let diff = DiffEngine::new(&fsa).compute_diff(&root, &prior).unwrap();

        assert_eq!(
            diff.classification(Path::new("r/f")),
            Some(Classification::UnchangedButTouched)
        );
        // Mtime refreshed, checksum reused
        let state = diff.new_state().get(Path::new("r/f")).unwrap();
        assert_eq!(state.modified, secs(101));
        assert_eq!(state.checksum, checksum);
        assert_eq!(diff.counts().unchanged, 1);
    }

    #[test]
    fn test_changed_file_recorded_with_new_checksum() {
        let root = Root::new("/x/y/z/r").unwrap();
        let new_checksum = Checksum::from_bytes(b"after");
        let fsa = MockAccessor::default()
            .with_listing("/x/y/z/r", vec![PathBuf::from("/x/y/z/r/f")])
            .with_file("/x/y/z/r/f", secs(101), new_checksum);

        let mut builder = FileSystemState::builder("/p/q/rold");
        builder.add(FileState::new(
            PathBuf::from("r/f"),
            secs(100),
            Checksum::from_bytes(b"before"),
        ));
        let prior = builder.build();

        let diff = DiffEngine::new(&fsa).compute_diff(&root, &prior).unwrap();

        assert_eq!(
            diff.classification(Path::new("r/f")),
            Some(Classification::Changed)
        );
        let state = diff.new_state().get(Path::new("r/f")).unwrap();
        assert_eq!(state.checksum, new_checksum);
        assert_eq!(diff.counts().new_or_changed, 1);
    }

    #[test]
    fn test_missing_prior_file_marked_removed() {
        let root = Root::new("/x/y/z/r").unwrap();
        let fsa = MockAccessor::default().with_listing("/x/y/z/r", vec![]);

        let mut builder = FileSystemState::builder("/p/q/rold");
        builder.add(FileState::new(
            PathBuf::from("r/gone.txt"),
            secs(100),
            Checksum::from_bytes(b"x"),
        ));
        let prior = builder.build();

        let diff = DiffEngine::new(&fsa).compute_diff(&root, &prior).unwrap();

        assert_eq!(
            diff.classification(Path::new("r/gone.txt")),
            Some(Classification::Removed)
        );
        assert_eq!(diff.counts().removed, 1);
        assert!(diff.new_state().is_empty());
    }

    #[test]
    fn test_unreadable_file_counts_as_error_and_run_continues() {
        let root = Root::new("/x/y/z/r").unwrap();
        let good = Checksum::from_bytes(b"good");
        // r/bad has a listing entry but no mtime or checksum behind it
        let fsa = MockAccessor::default()
            .with_listing(
                "/x/y/z/r",
                vec![PathBuf::from("/x/y/z/r/bad"), PathBuf::from("/x/y/z/r/ok")],
            )
            .with_file("/x/y/z/r/ok", secs(100), good);

        let prior = FileSystemState::empty("/p/q/rold");
        let diff = DiffEngine::new(&fsa).compute_diff(&root, &prior).unwrap();

        assert_eq!(
            diff.classification(Path::new("r/bad")),
            Some(Classification::Error)
        );
        assert_eq!(
            diff.classification(Path::new("r/ok")),
            Some(Classification::New)
        );
        assert_eq!(diff.counts().errors, 1);
        assert!(diff.new_state().get(Path::new("r/bad")).is_none());
        assert!(diff.new_state().get(Path::new("r/ok")).is_some());
    }

    #[test]
    fn test_enumeration_failure_is_fatal() {
        let root = Root::new("/x/y/z/r").unwrap();
        let fsa = MockAccessor::default(); // no listing for the root

        let prior = FileSystemState::empty("/p/q/rold");
        assert!(DiffEngine::new(&fsa).compute_diff(&root, &prior).is_err());
    }

    #[test]
    fn test_diff_is_deterministic() {
        let root = Root::new("/x/y/z/r").unwrap();
        let fsa = MockAccessor::default()
            .with_listing(
                "/x/y/z/r",
                vec![PathBuf::from("/x/y/z/r/a"), PathBuf::from("/x/y/z/r/b")],
            )
            .with_file("/x/y/z/r/a", secs(100), Checksum::from_bytes(b"a"))
            .with_file("/x/y/z/r/b", secs(100), Checksum::from_bytes(b"b"));

        let prior = FileSystemState::empty("/p/q/rold");
        let engine = DiffEngine::new(&fsa);
        let first = engine.compute_diff(&root, &prior).unwrap();
        let second = engine.compute_diff(&root, &prior).unwrap();

        assert_eq!(first.counts(), second.counts());
        assert_eq!(
            first.compute_copy_actions(Path::new("/p/q/rnew")),
            second.compute_copy_actions(Path::new("/p/q/rnew"))
        );
    }
}
