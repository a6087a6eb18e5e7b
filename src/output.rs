//! Console output for the archiver.
//!
//! Everything the user sees on stdout goes through [`OutputFormatter`]:
//! colored status lines, the progress spinner and the end-of-run summary.
//! Diagnostics go through `tracing` instead.

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

/// Styled console output.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use mediasort::output::OutputFormatter;
    /// OutputFormatter::success("Archive complete");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red to stderr.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// A spinner that counts finished files while the total is still unknown.
    ///
    /// ```no_run
    /// use mediasort::output::OutputFormatter;
    /// let pb = OutputFormatter::create_spinner();
    /// pb.inc(1);
    /// pb.finish_and_clear();
    /// ```
    pub fn create_spinner() -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {pos} files {msg}") {
            pb.set_style(style);
        }
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    }

    /// Prints one row per outcome and a total.
    ///
    /// Rows keep the order given; zero counts are left out.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use mediasort::output::OutputFormatter;
    ///
    /// OutputFormatter::summary_table(&[("moved", 12), ("duplicate removed", 3), ("unresolved", 0)]);
    /// ```
    pub fn summary_table(rows: &[(&str, usize)]) {
        Self::header("SUMMARY");

        let rows: Vec<_> = rows.iter().filter(|(_, count)| *count > 0).collect();
        let width = rows
            .iter()
            .map(|(name, _)| name.len())
            .max()
            .unwrap_or(0)
            .max(7);

        println!("{:<width$} | {}", "Outcome".bold(), "Files".bold());
        println!("{}", "-".repeat(width + 10));

        for (outcome, count) in &rows {
            let count = if matches!(*outcome, "fatal" | "failed") {
                count.to_string().red()
            } else {
                count.to_string().green()
            };
            println!("{:<width$} | {}", outcome, count);
        }

        let total: usize = rows.iter().map(|(_, count)| count).sum();
        println!("{}", "-".repeat(width + 10));
        println!(
            "{:<width$} | {} {}",
            "Total".bold(),
            total.to_string().green().bold(),
            if total == 1 { "file" } else { "files" },
        );
    }

    /// Prints a dry-run notice message.
    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }

    /// Prints one set of identical files under its content hash.
    pub fn duplicate_group(hash: &str, paths: &[PathBuf]) {
        println!("Found duplicate for hash {}:", hash.yellow());
        for path in paths {
            println!("   {}", path.display());
        }
    }
}
