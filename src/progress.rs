//! Progress reporting for the checker
//!
//! Provides real-time progress display using indicatif spinners and a
//! colored summary once the check is over.

use crate::walker::{FsckProgress, FsckResult};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

/// Progress reporter that displays check status
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        // The template is a literal, parsing can only fail on a typo
        if let Ok(spinner) = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
        {
            bar.set_style(spinner.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
        }

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update the progress display
    pub fn update(&self, progress: &FsckProgress) {
        self.bar.set_message(progress_message(progress));
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Finish and clear the progress display
    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn progress_message(progress: &FsckProgress) -> String {
    format!(
        "Dirs: {} | Queued: {} | Checked: {} | Broken: {} | Rate: {:.0}/s | Workers: {}",
        format_number(progress.dirs),
        format_number(progress.queued),
        format_number(progress.checked),
        format_number(progress.broken as u64),
        progress.files_per_second(),
        progress.total_workers,
    )
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let groups: Vec<String> = bytes
        .chunks(3)
        .map(|group| group.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    groups.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a summary of the check results
pub fn print_summary(result: &FsckResult, block_size: u32, fail_record: &Path) {
    let duration_secs = result.duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        result.verify.files_checked as f64 / duration_secs
    } else {
        0.0
    };
    // Upper bound, the last block of a slice is usually short
    let checked_bytes = format_size(result.verify.blocks_checked * block_size as u64, BINARY);

    println!();
    if result.is_clean() {
        println!("{}", style("Check Complete").green().bold());
    } else {
        println!("{}", style("Check Found Broken Files").red().bold());
    }
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {}",
        style("Directories:").bold(),
        format_number(result.dirs)
    );
    println!(
        "  {} {}",
        style("Files:").bold(),
        format_number(result.verify.files_checked)
    );
    println!(
        "  {} {} (up to {})",
        style("Blocks:").bold(),
        format_number(result.verify.blocks_checked),
        checked_bytes
    );
    if result.files_too_old > 0 {
        println!(
            "  {} {}",
            style("Skipped (ctime):").bold(),
            format_number(result.files_too_old)
        );
    }
    if result.verify.files_deleted > 0 {
        println!(
            "  {} {}",
            style("Pending deletion:").bold(),
            format_number(result.verify.files_deleted)
        );
    }
    println!(
        "  {} {:.1}s ({:.0} files/sec)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );
    if result.errors > 0 {
        println!(
            "  {} {}",
            style("Errors:").yellow().bold(),
            format_number(result.errors)
        );
    }
    if result.is_clean() {
        println!("  {} 0", style("Broken files:").bold());
    } else {
        println!(
            "  {} {} ({} missing blocks)",
            style("Broken files:").red().bold(),
            format_number(result.broken.len() as u64),
            format_number(result.verify.blocks_missing)
        );
    }
    if result.report_written {
        println!(
            "  {} {}",
            style("Fail record:").bold(),
            fail_record.display()
        );
    }
    if !result.completed {
        println!("  {}", style("Check was interrupted").yellow());
    }
    println!();
}

/// Print a header at the start of the check
pub fn print_header(meta: &str, path: &str, workers: usize) {
    println!();
    println!(
        "{} {}",
        style("pfsck").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Meta:").bold(), meta);
    println!("  {} {}", style("Path:").bold(), path);
    println!("  {} {}", style("Workers:").bold(), workers);
    println!();
}
