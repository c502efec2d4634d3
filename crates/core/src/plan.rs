//! Copy planning with subtree alias promotion
//!
//! Turns a classified diff into the smallest action set that materializes
//! the current tree at a destination: whole purely-unchanged subtrees
//! collapse into a single symlink into the previous snapshot, everything
//! else is copied or aliased file by file.

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::path::Path;

use crate::action::CopyAction;
use crate::diff::{Classification, FileSystemDiff};

/// Planned actions, ordered by variant and path. No two actions share a
/// destination path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CopyPlan {
    actions: BTreeSet<CopyAction>,
}

impl CopyPlan {
    pub(crate) fn compute(diff: &FileSystemDiff, destination: &Path) -> Self {
        let mut tree = DirNode::default();
        for (path, classification) in diff.entries() {
            tree.insert(path, classification);
        }

        let ctx = PlanContext {
            source_location: diff.source_location(),
            prior_location: diff.prior_location(),
            destination,
        };
        let mut actions = BTreeSet::new();
        tree.emit(Path::new(""), &ctx, &mut actions);
        Self { actions }
    }

    /// The planned actions as an ordered set
    #[must_use]
    pub fn actions(&self) -> &BTreeSet<CopyAction> {
        &self.actions
    }

    pub fn iter(&self) -> impl Iterator<Item = &CopyAction> {
        self.actions.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

struct PlanContext<'a> {
    source_location: &'a Path,
    prior_location: &'a Path,
    destination: &'a Path,
}

/// One directory in the union of the current and the prior tree.
#[derive(Debug, Default)]
struct DirNode {
    dirs: BTreeMap<OsString, DirNode>,
    files: BTreeMap<OsString, Classification>,
}

impl DirNode {
    fn insert(&mut self, path: &Path, classification: Classification) {
        let mut node = self;
        let mut components = path.components().peekable();
        while let Some(component) = components.next() {
            let name = component.as_os_str().to_os_string();
            if components.peek().is_some() {
                node = node.dirs.entry(name).or_default();
            } else {
                node.files.insert(name, classification);
            }
        }
    }

    /// A subtree may collapse into one symlink only if every file it ever
    /// contained is still present and unchanged.
    fn purely_unchanged(&self) -> bool {
        self.files.values().all(|c| c.is_unchanged())
            && self.dirs.values().all(Self::purely_unchanged)
    }

    fn emit(&self, rel: &Path, ctx: &PlanContext<'_>, actions: &mut BTreeSet<CopyAction>) {
        for (name, child) in &self.dirs {
            let child_rel = rel.join(name);
            if child.purely_unchanged() {
                actions.insert(CopyAction::symlink(
                    ctx.prior_location,
                    ctx.destination,
                    child_rel,
                ));
            } else {
                child.emit(&child_rel, ctx, actions);
            }
        }
        for (name, classification) in &self.files {
            match classification {
                Classification::New | Classification::Changed => {
                    actions.insert(CopyAction::plain(
                        ctx.source_location,
                        ctx.destination,
                        rel.join(name),
                    ));
                }
                Classification::Unchanged | Classification::UnchangedButTouched => {
                    actions.insert(CopyAction::symlink(
                        ctx.prior_location,
                        ctx.destination,
                        rel.join(name),
                    ));
                }
                Classification::Removed | Classification::Error => {}
            }
        }
    }
}
