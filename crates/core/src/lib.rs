//! copysnap-core: Incremental snapshot engine
//!
//! Walks a source tree, classifies every file against the recorded state of
//! the previous snapshot, and plans the minimal set of plain copies and
//! symlink aliases that materializes the next snapshot.

pub mod accessor;
pub mod action;
pub mod checksum;
pub mod diff;
pub mod plan;
pub mod root;
pub mod state;

pub use accessor::{FileSystemAccessor, OsAccessor};
pub use action::CopyAction;
pub use checksum::Checksum;
pub use diff::{Classification, DiffCounts, DiffEngine, FileSystemDiff};
pub use plan::CopyPlan;
pub use root::Root;
pub use state::{FileState, FileSystemState};
