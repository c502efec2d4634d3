//! End-to-end snapshot runs against the real filesystem.
//!
//! Exercises the full pipeline: enumerate, classify, plan, execute, persist
//! state, and diff again against the materialized snapshot.

#![cfg(unix)]

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use copysnap_core::{
    CopyAction, CopyPlan, DiffEngine, FileSystemState, OsAccessor, Root,
};

struct Repo {
    _dir: tempfile::TempDir,
    source: PathBuf,
    snapshots: PathBuf,
}

fn setup() -> Repo {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("r");
    fs::create_dir_all(source.join("sub")).unwrap();
    fs::write(source.join("a.txt"), "alpha").unwrap();
    fs::write(source.join("sub/b.txt"), "beta").unwrap();
    let snapshots = dir.path().join("snapshots");
    fs::create_dir_all(&snapshots).unwrap();
    Repo {
        source,
        snapshots,
        _dir: dir,
    }
}

fn take_snapshot(
    repo: &Repo,
    prior: &FileSystemState,
    name: &str,
) -> (CopyPlan, FileSystemState) {
    let fsa = OsAccessor::new();
    let root = Root::new(&repo.source).unwrap();
    let destination = repo.snapshots.join(name);
    fs::create_dir_all(&destination).unwrap();

    let diff = DiffEngine::new(&fsa).compute_diff(&root, prior).unwrap();
    let plan = diff.compute_copy_actions(&destination);
    for action in plan.iter() {
        action.execute(&fsa).unwrap();
    }
    (plan, diff.into_new_state().relocated(destination))
}

#[test]
fn test_first_snapshot_copies_everything() {
    let repo = setup();
    let prior = FileSystemState::empty(&repo.snapshots);

    let (plan, state) = take_snapshot(&repo, &prior, "snap-1");

    assert_eq!(plan.len(), 2);
    assert!(
        plan.iter()
            .all(|action| matches!(action, CopyAction::Plain { .. }))
    );

    let dest = repo.snapshots.join("snap-1");
    assert_eq!(fs::read_to_string(dest.join("r/a.txt")).unwrap(), "alpha");
    assert_eq!(
        fs::read_to_string(dest.join("r/sub/b.txt")).unwrap(),
        "beta"
    );
    assert_eq!(state.len(), 2);

    // Persisted state survives a round trip
    let state_file = repo.snapshots.join("state.rkyv");
    state.save(&state_file).unwrap();
    let loaded = FileSystemState::load(&state_file).unwrap().unwrap();
    assert_eq!(loaded.location(), dest);
    assert_eq!(loaded.len(), 2);
}

#[test]
fn test_unchanged_tree_collapses_to_root_alias() {
    let repo = setup();
    let prior = FileSystemState::empty(&repo.snapshots);
    let (_, state1) = take_snapshot(&repo, &prior, "snap-1");

    let (plan, state2) = take_snapshot(&repo, &state1, "snap-2");

    let expected = CopyAction::symlink(
        &repo.snapshots.join("snap-1"),
        &repo.snapshots.join("snap-2"),
        PathBuf::from("r"),
    );
    assert_eq!(plan.iter().collect::<Vec<_>>(), vec![&expected]);

    // The alias resolves to the previous snapshot's bytes
    let dest = repo.snapshots.join("snap-2");
    assert_eq!(fs::read_to_string(dest.join("r/a.txt")).unwrap(), "alpha");
    assert_eq!(state2.len(), 2);
}

#[test]
fn test_changed_file_recopied_unchanged_sibling_aliased() {
    let repo = setup();
    let prior = FileSystemState::empty(&repo.snapshots);
    let (_, state1) = take_snapshot(&repo, &prior, "snap-1");

    // let the mtime tick
    std::thread::sleep(std::time::Duration::from_millis(20));
    fs::write(repo.source.join("sub/b.txt"), "beta v2").unwrap();

    let (plan, state2) = take_snapshot(&repo, &state1, "snap-2");

    let snap1 = repo.snapshots.join("snap-1");
    let snap2 = repo.snapshots.join("snap-2");
    let expected: BTreeSet<CopyAction> = [
        CopyAction::plain(
            repo.source.parent().unwrap(),
            &snap2,
            PathBuf::from("r/sub/b.txt"),
        ),
        CopyAction::symlink(&snap1, &snap2, PathBuf::from("r/a.txt")),
    ]
    .into();
    assert_eq!(*plan.actions(), expected);

    assert_eq!(fs::read_to_string(snap2.join("r/a.txt")).unwrap(), "alpha");
    assert_eq!(
        fs::read_to_string(snap2.join("r/sub/b.txt")).unwrap(),
        "beta v2"
    );
    assert_eq!(state2.len(), 2);
}

#[test]
fn test_third_run_after_no_changes_is_single_alias_again() {
    let repo = setup();
    let prior = FileSystemState::empty(&repo.snapshots);
    let (_, state1) = take_snapshot(&repo, &prior, "snap-1");
    let (_, state2) = take_snapshot(&repo, &state1, "snap-2");

    let (plan, _) = take_snapshot(&repo, &state2, "snap-3");

    assert_eq!(plan.len(), 1);
    let action = plan.iter().next().unwrap();
    assert!(matches!(action, CopyAction::Symlink { .. }));
    assert_eq!(action.path(), Path::new("r"));
}

#[test]
fn test_removed_file_is_absent_from_next_snapshot() {
    let repo = setup();
    let prior = FileSystemState::empty(&repo.snapshots);
    let (_, state1) = take_snapshot(&repo, &prior, "snap-1");

    fs::remove_file(repo.source.join("sub/b.txt")).unwrap();

    let (plan, state2) = take_snapshot(&repo, &state1, "snap-2");

    // sub lost a file, so a.txt gets a file-level alias and sub/ nothing
    let snap2 = repo.snapshots.join("snap-2");
    assert_eq!(plan.len(), 1);
    assert_eq!(fs::read_to_string(snap2.join("r/a.txt")).unwrap(), "alpha");
    assert!(!snap2.join("r/sub").exists());
    assert_eq!(state2.len(), 1);
}
