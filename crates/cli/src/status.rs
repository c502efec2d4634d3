//! ANSI status output for copysnap
//!
//! Status lines with icons and a braille spinner for long scans.
//!
//! Example output:
//! ```text
//! ⠋ Scanning source tree...
//! ✓ Classified 542 files
//!   → docs/report.odt
//!   ○ photos
//! ✓ Snapshot snap-1722550000: 3 copied (1.2 MiB), 2 linked in 0.8s
//! ```

use std::io::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// ANSI escape sequences for terminal control
mod ansi {
    pub const HIDE_CURSOR: &str = "\x1b[?25l";
    pub const SHOW_CURSOR: &str = "\x1b[?25h";
    pub const CLEAR_LINE: &str = "\x1b[2K\r";
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const CYAN: &str = "\x1b[36m";
}

/// Unicode icons for status messages
mod icon {
    pub const SUCCESS: &str = "✓";
    pub const ERROR: &str = "✗";
    pub const ARROW: &str = "→";
    pub const CIRCLE: &str = "○";
    pub const WARN: &str = "!";
}

/// Spinner animation frames (braille dots)
const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Get terminal width, defaulting to 80 if unavailable
fn terminal_width() -> usize {
    console::Term::stderr().size().1 as usize
}

/// Truncate text to fit within max_width, adding "..." if truncated
fn truncate_to_width(text: &str, max_width: usize) -> std::borrow::Cow<'_, str> {
    let text_width = console::measure_text_width(text);
    if text_width <= max_width {
        return std::borrow::Cow::Borrowed(text);
    }
    let target_width = max_width.saturating_sub(3);
    let truncated = console::truncate_str(text, target_width, "...");
    std::borrow::Cow::Owned(truncated.to_string())
}

/// Print success message: ✓ {msg} (green)
pub fn success(msg: &str) {
    let available = terminal_width().saturating_sub(3);
    let msg = truncate_to_width(msg, available);
    eprintln!(
        "{}{}{} {}{}",
        ansi::GREEN,
        ansi::BOLD,
        icon::SUCCESS,
        msg,
        ansi::RESET
    );
}

/// Print info message: → {msg} (cyan)
pub fn info(msg: &str) {
    let available = terminal_width().saturating_sub(3);
    let msg = truncate_to_width(msg, available);
    eprintln!("{}{} {}{}", ansi::CYAN, icon::ARROW, msg, ansi::RESET);
}

/// Print warning message: ! {msg} (yellow)
pub fn warn(msg: &str) {
    let available = terminal_width().saturating_sub(3);
    let msg = truncate_to_width(msg, available);
    eprintln!(
        "{}{}{} {}{}",
        ansi::YELLOW,
        ansi::BOLD,
        icon::WARN,
        msg,
        ansi::RESET
    );
}

/// Print error message: ✗ {msg} (red)
pub fn error(msg: &str) {
    let available = terminal_width().saturating_sub(3);
    let msg = truncate_to_width(msg, available);
    eprintln!(
        "{}{}{} {}{}",
        ansi::RED,
        ansi::BOLD,
        icon::ERROR,
        msg,
        ansi::RESET
    );
}

/// Print indented copy line:   → {msg} (blue)
pub fn file_copy(msg: &str) {
    let available = terminal_width().saturating_sub(5);
    let msg = truncate_to_width(msg, available);
    eprintln!("{}  {} {}{}", ansi::BLUE, icon::ARROW, msg, ansi::RESET);
}

/// Print indented alias line:   ○ {msg} (dim)
pub fn file_link(msg: &str) {
    let available = terminal_width().saturating_sub(5);
    let msg = truncate_to_width(msg, available);
    eprintln!("{}  {} {}{}", ansi::DIM, icon::CIRCLE, msg, ansi::RESET);
}

/// Show the final snapshot summary.
pub fn snapshot_summary(name: &str, copied: usize, bytes: u64, linked: usize, elapsed: Duration) {
    let size = humansize::format_size(bytes, humansize::BINARY);
    let elapsed_str = if elapsed.as_secs() >= 1 {
        format!("{:.2}s", elapsed.as_secs_f64())
    } else {
        format!("{}ms", elapsed.as_millis())
    };
    success(&format!(
        "Snapshot {name}: {copied} copied ({size}), {linked} linked in {elapsed_str}"
    ));
}

/// Animated spinner for indeterminate operations.
///
/// Runs in a background thread, updating every 80ms. Call `finish_success()`
/// or `finish_error()` to stop and print the final status.
pub struct Spinner {
    running: Arc<AtomicBool>,
    message: Arc<std::sync::Mutex<String>>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl Spinner {
    /// Create and start a new spinner with the given message.
    pub fn new(message: &str) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let message = Arc::new(std::sync::Mutex::new(message.to_string()));

        let running_clone = Arc::clone(&running);
        let message_clone = Arc::clone(&message);

        eprint!("{}", ansi::HIDE_CURSOR);
        let _ = std::io::stderr().flush();

        let handle = std::thread::spawn(move || {
            let mut frame = 0usize;
            while running_clone.load(Ordering::Relaxed) {
                let msg = message_clone.lock().unwrap().clone();
                let spinner_char = SPINNER_FRAMES[frame % SPINNER_FRAMES.len()];

                eprint!(
                    "{}{}{} {}{}",
                    ansi::CLEAR_LINE,
                    ansi::CYAN,
                    spinner_char,
                    msg,
                    ansi::RESET
                );
                let _ = std::io::stderr().flush();

                frame += 1;
                std::thread::sleep(std::time::Duration::from_millis(80));
            }
        });

        Self {
            running,
            message,
            handle: Some(handle),
        }
    }

    /// Update the spinner message without stopping it.
    pub fn set_message(&self, message: &str) {
        if let Ok(mut msg) = self.message.lock() {
            *msg = message.to_string();
        }
    }

    /// Stop the spinner and print a success message.
    pub fn finish_success(self, message: &str) {
        self.stop();
        eprint!("{}", ansi::CLEAR_LINE);
        success(message);
    }

    /// Stop the spinner and print an error message.
    pub fn finish_error(self, message: &str) {
        self.stop();
        eprint!("{}", ansi::CLEAR_LINE);
        error(message);
    }

    fn stop(mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        eprint!("{}", ansi::SHOW_CURSOR);
        let _ = std::io::stderr().flush();
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        if self.running.load(Ordering::Relaxed) {
            self.running.store(false, Ordering::Relaxed);
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
            eprint!("{}{}", ansi::CLEAR_LINE, ansi::SHOW_CURSOR);
            let _ = std::io::stderr().flush();
        }
    }
}
