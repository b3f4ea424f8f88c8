//! Output formatting and styling module.
//!
//! Provides a centralized interface for all terminal output: colored status
//! messages, the apply progress bar, and bucket summary tables.

use crate::apply::ApplyResult;
use crate::catalog::Item;
use crate::label::{Buckets, Label};
use crate::session::LabelSession;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

/// Manages all CLI output with consistent styling and formatting.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use binsort::output::OutputFormatter;
    /// OutputFormatter::success("Moved 3 images");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn plain(message: &str) {
        println!("{}", message);
    }

    /// Prints a section header.
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Prints a dry-run notice message.
    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }

    /// Creates a progress bar for an apply batch.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use binsort::output::OutputFormatter;
    /// let pb = OutputFormatter::create_progress_bar(10);
    /// pb.inc(1);
    /// pb.finish_with_message("done");
    /// ```
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        pb.set_style(style);
        pb
    }

    /// Colored bucket name for a label.
    pub fn label_tag(buckets: &Buckets, label: Label) -> ColoredString {
        let name = buckets.dir_name(label);
        match label {
            Label::Positive => name.green(),
            Label::Negative => name.red(),
        }
    }

    /// One line describing an item, e.g. `> 3/40 cat.png  center -> not_center`.
    pub fn item_line(
        index: usize,
        total: usize,
        item: &Item,
        buckets: &Buckets,
        selected: bool,
    ) -> String {
        let marker = if selected { ">" } else { " " };
        let position = format!("{}/{}", index + 1, total);
        let label = if item.is_pending() {
            format!(
                "{} -> {}",
                Self::label_tag(buckets, item.original_label()),
                Self::label_tag(buckets, item.current_label()).bold()
            )
        } else {
            Self::label_tag(buckets, item.current_label()).to_string()
        };
        format!("{} {:>9} {}  {}", marker, position, item.name(), label)
    }

    /// Prints a table of item counts per bucket, by current label, plus pending changes.
    pub fn summary_table(session: &LabelSession) {
        Self::header("SUMMARY");

        let buckets = session.buckets();
        let counts = session.counts();
        let width = Label::ALL
            .iter()
            .map(|label| buckets.dir_name(*label).len())
            .max()
            .unwrap_or(0)
            .max(8);

        println!("{:<width$} | {}", "Bucket".bold(), "Images".bold(), width = width);
        println!("{}", "-".repeat(width + 10));
        for label in Label::ALL {
            let count = counts.get(label);
            println!(
                "{:<width$} | {} {}",
                buckets.dir_name(label),
                count.to_string().green(),
                if count == 1 { "image" } else { "images" },
                width = width
            );
        }
        println!("{}", "-".repeat(width + 10));
        println!(
            "{:<width$} | {} {}",
            "Total".bold(),
            session.len().to_string().green().bold(),
            if session.len() == 1 { "image" } else { "images" },
            width = width
        );

        let pending = session.pending_count();
        if pending > 0 {
            println!("{}", format!("{} changes pending", pending).yellow());
        }
    }

    /// Prints the outcome of an apply batch.
    pub fn apply_report(result: &ApplyResult) {
        Self::header("APPLY");
        Self::success(&format!("Moved: {}", result.moved));

        if !result.failed.is_empty() {
            Self::error(&format!("Failed: {}", result.failed.len()));
            for failed in &result.failed {
                eprintln!("    - {}: {}", failed.item.name(), failed.error);
            }
            Self::warning("Failed items are still pending and will be retried on the next apply.");
        }

        if result.cancelled {
            Self::warning("Apply was stopped early; remaining changes are still pending.");
        }

        if let Some(log_error) = &result.log_error {
            Self::warning(&format!(
                "Files were moved, but the activity log could not be saved: {}",
                log_error
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::path::PathBuf;

    #[test]
    fn test_item_line_marks_selection_and_pending() {
        colored::control::set_override(false);
        let buckets = Buckets::default();
        let item = Item::new(
            PathBuf::from("/root/center/cat.png"),
            OsString::from("cat.png"),
            Label::Positive,
        );

        let line = OutputFormatter::item_line(0, 4, &item, &buckets, true);
        assert!(line.starts_with('>'));
        assert!(line.contains("1/4"));
        assert!(line.contains("cat.png"));
        assert!(line.ends_with("center"));

        let line = OutputFormatter::item_line(2, 4, &item, &buckets, false);
        assert!(line.starts_with(' '));
        assert!(!line.contains("->"));
    }
}
