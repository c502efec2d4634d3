//! copysnap: incremental filesystem snapshots
//!
//! Records the state of a source tree and materializes each new snapshot
//! from it: changed files are copied, unchanged subtrees become symbolic
//! links into the previous snapshot, so a snapshot costs only the bytes
//! that actually changed.

mod context;
mod status;

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::builder::styling::{AnsiColor, Effects};
use clap::{Parser, Subcommand, builder::Styles};
use color_eyre::Result;
use tracing::{debug, info};

use copysnap_core::{CopyAction, DiffEngine, FileSystemState, OsAccessor, Root};

use crate::context::Context;

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default())
    .valid(AnsiColor::Green.on_default())
    .invalid(AnsiColor::Red.on_default());

#[derive(Parser)]
#[command(name = "copysnap")]
#[command(version)]
#[command(styles = STYLES)]
#[command(about = "Incremental snapshots that reuse unchanged subtrees via symlinks")]
#[command(long_about = r#"
copysnap takes checksum-verified snapshots of a directory tree.

Each snapshot directory contains the full tree, but unchanged subtrees are
symbolic links into the previous snapshot, so only changed bytes are stored
again.

Examples:
  copysnap init ~/documents ~/backups/documents   Set up a snapshot repository
  copysnap snapshot ~/backups/documents           Take a snapshot
  copysnap status ~/backups/documents             Preview what a snapshot would do
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a snapshot repository for a source directory
    Init {
        /// Directory to snapshot
        source: PathBuf,

        /// Repository directory that will hold the snapshots
        repository: PathBuf,
    },

    /// Take a new snapshot into the repository
    Snapshot {
        /// Repository directory
        repository: PathBuf,
    },

    /// Show what a snapshot would copy or alias, without writing anything
    Status {
        /// Repository directory
        repository: PathBuf,
    },

    /// Scan a directory and print its state
    Scan {
        /// Directory to scan
        path: PathBuf,

        /// Output format (json, summary)
        #[arg(short, long, default_value = "summary")]
        format: String,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Init { source, repository } => init_command(&source, &repository),
        Commands::Snapshot { repository } => snapshot_command(&repository),
        Commands::Status { repository } => status_command(&repository),
        Commands::Scan { path, format } => scan_command(&path, &format),
    }
}

fn init_command(source: &Path, repository: &Path) -> Result<()> {
    let ctx = Context::init(source, repository)?;
    status::success(&format!(
        "Initialized snapshot repository for {} at {}",
        ctx.source().display(),
        ctx.repository().display()
    ));
    Ok(())
}

fn snapshot_command(repository: &Path) -> Result<()> {
    let ctx = Context::load(repository)?;
    let root = Root::new(ctx.source())?;
    let prior = ctx.load_state()?;
    let fsa = OsAccessor::new();

    debug!(
        "diffing {} against state of {}",
        root.path_to_root_dir().display(),
        prior.location().display()
    );

    let spinner = status::Spinner::new("Scanning source tree...");
    let diff = match DiffEngine::new(&fsa).compute_diff(&root, &prior) {
        Ok(diff) => diff,
        Err(e) => {
            spinner.finish_error("Scan failed");
            return Err(e);
        }
    };
    let counts = diff.counts();
    spinner.finish_success(&format!(
        "Classified {} files",
        counts.new_or_changed + counts.unchanged
    ));
    if counts.errors > 0 {
        status::warn(&format!(
            "{} files could not be read and were skipped",
            counts.errors
        ));
    }

    let destination = ctx.new_snapshot_dir()?;
    let plan = diff.compute_copy_actions(&destination);

    let start = Instant::now();
    let mut copied = 0usize;
    let mut linked = 0usize;
    let mut bytes = 0u64;
    for action in plan.iter() {
        debug!("executing {action:?}");
        action.execute(&fsa)?;
        match action {
            CopyAction::Plain {
                source_root, path, ..
            } => {
                copied += 1;
                bytes += std::fs::metadata(source_root.join(path))
                    .map(|m| m.len())
                    .unwrap_or(0);
            }
            CopyAction::Symlink { .. } => linked += 1,
        }
    }

    let new_state = diff.into_new_state().relocated(&destination);
    ctx.save_state(&new_state)?;

    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    status::snapshot_summary(&name, copied, bytes, linked, start.elapsed());
    Ok(())
}

fn status_command(repository: &Path) -> Result<()> {
    let ctx = Context::load(repository)?;
    let root = Root::new(ctx.source())?;
    let prior = ctx.load_state()?;
    let fsa = OsAccessor::new();

    let diff = DiffEngine::new(&fsa).compute_diff(&root, &prior)?;
    let counts = diff.counts();
    // Planned against a placeholder destination; only relative paths are shown
    let plan = diff.compute_copy_actions(&ctx.repository().join("next"));

    status::info(&format!(
        "{} new or changed, {} unchanged, {} removed",
        counts.new_or_changed, counts.unchanged, counts.removed
    ));
    for action in plan.iter() {
        match action {
            CopyAction::Plain { path, .. } => status::file_copy(&path.display().to_string()),
            CopyAction::Symlink { path, .. } => status::file_link(&path.display().to_string()),
        }
    }
    if counts.errors > 0 {
        status::warn(&format!("{} files could not be read", counts.errors));
    }
    Ok(())
}

fn scan_command(path: &Path, format: &str) -> Result<()> {
    info!("Scanning {}...", path.display());

    let canonical = path.canonicalize()?;
    let root = Root::new(canonical)?;
    let fsa = OsAccessor::new();
    let diff =
        DiffEngine::new(&fsa).compute_diff(&root, &FileSystemState::empty(root.location()))?;
    let state = diff.into_new_state();

    match format {
        "json" => {
            let json = serde_json::to_string_pretty(&state)?;
            println!("{json}");
        }
        _ => {
            eprintln!("Files: {}", state.len());
            if state.len() <= 20 {
                let mut files: Vec<_> = state.iter().collect();
                files.sort_by(|a, b| a.path.cmp(&b.path));
                eprintln!("\nFiles:");
                for file in files {
                    eprintln!("  {} ({})", file.path.display(), file.checksum);
                }
            }
        }
    }

    Ok(())
}
