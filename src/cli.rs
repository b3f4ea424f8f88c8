//! Command-line front end for binsort.
//!
//! This module handles all CLI-related functionality including:
//! - Command parsing
//! - Loading configuration and opening a review session
//! - The interactive review loop
//! - Batch label assignment and apply
//! - Printing the persisted activity log

use crate::activity_log::{ActionKind, JsonLogFile, LogStore};
use crate::apply::{self, ApplyEngine, ApplyResult};
use crate::config::{ReviewConfig, Settings};
use crate::label::Label;
use crate::output::OutputFormatter;
use crate::session::LabelSession;
use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::io::BufRead;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "binsort", version)]
#[command(about = "Sort images between two label folders and commit the moves", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to .binsortrc.toml, then ~/.config/binsort/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: ReviewCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ReviewCommand {
    /// Show how many images each bucket holds
    Status {
        /// Root folder containing the two bucket folders
        root: PathBuf,
    },
    /// Review images interactively and apply label changes
    Review {
        root: PathBuf,
    },
    /// Assign a label to images by file name and apply the moves
    Assign {
        root: PathBuf,

        /// Target label: positive or negative
        #[arg(long)]
        to: Label,

        /// File names to relabel
        #[arg(required = true)]
        files: Vec<String>,

        /// Show the moves without performing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the activity log of a root folder
    Log {
        root: PathBuf,

        /// Number of most recent entries to show (0 for all)
        #[arg(long, default_value_t = 20)]
        tail: usize,
    },
}

/// Runs the CLI application.
///
/// # Examples
///
/// ```no_run
/// use binsort::cli::{Cli, ReviewCommand, run_cli};
/// use std::path::PathBuf;
///
/// let cli = Cli {
///     config: None,
///     command: ReviewCommand::Status { root: PathBuf::from("/photos") },
/// };
/// if let Err(e) = run_cli(cli) {
///     eprintln!("Error: {:#}", e);
/// }
/// ```
pub fn run_cli(cli: Cli) -> anyhow::Result<()> {
    let settings = load_settings(cli.config.as_deref())?;

    match cli.command {
        ReviewCommand::Status { root } => show_status(&root, settings),
        ReviewCommand::Review { root } => {
            let mut session = open_session(&root, settings)?;
            let stdin = std::io::stdin();
            review_loop(&mut session, stdin.lock())
        }
        ReviewCommand::Assign {
            root,
            to,
            files,
            dry_run,
        } => assign_labels(&root, settings, to, &files, dry_run).map(|_| ()),
        ReviewCommand::Log { root, tail } => print_log(&root, &settings, tail),
    }
}

/// Loads and compiles the review configuration.
pub fn load_settings(config_path: Option<&Path>) -> anyhow::Result<Settings> {
    let config = ReviewConfig::load(config_path).context("Error loading configuration")?;
    config.compile().context("Error compiling configuration")
}

fn open_session(root: &Path, settings: Settings) -> anyhow::Result<LabelSession> {
    let session = LabelSession::open(root, settings)
        .with_context(|| format!("Cannot load images from {}", root.display()))?;
    OutputFormatter::info(&format!(
        "Loaded {} images from {}",
        session.len(),
        session.root().display()
    ));
    Ok(session)
}

fn show_status(root: &Path, settings: Settings) -> anyhow::Result<()> {
    let session = open_session(root, settings)?;
    OutputFormatter::summary_table(&session);
    OutputFormatter::plain(&format!("Activity log: {}", session.log_path().display()));
    Ok(())
}

/// Sets `label` on every item named in `files`, then applies (or, for a dry
/// run, prints the planned moves).
///
/// Unknown file names are reported and logged. Returns the apply result, or
/// `None` for a dry run.
///
/// # Errors
///
/// Fails if the root cannot be loaded, or if any move failed.
pub fn assign_labels(
    root: &Path,
    settings: Settings,
    label: Label,
    files: &[String],
    dry_run: bool,
) -> anyhow::Result<Option<ApplyResult>> {
    let mut session = open_session(root, settings)?;

    for name in files {
        let indices = session.find_by_name(name);
        if indices.is_empty() {
            OutputFormatter::error(&format!("No image named '{}' in either bucket", name));
            session.log_mut().append(
                ActionKind::Error,
                json!({ "message": format!("no image named '{}'", name) }),
            );
            continue;
        }
        for index in indices {
            session.set_label(index, label)?;
        }
    }

    if dry_run {
        let plan = apply::plan(&session);
        OutputFormatter::dry_run_notice(&format!("{} moves would be applied", plan.len()));
        for planned in &plan {
            OutputFormatter::plain(&format!(
                " - {}\n   → Would move to {}",
                planned.from.display(),
                planned.to.display()
            ));
        }
        OutputFormatter::dry_run_notice("No files were modified.");
        return Ok(None);
    }

    let result = apply_changes(&mut session);
    if !result.failed.is_empty() {
        bail!("{} of the requested moves failed", result.failed.len());
    }
    Ok(Some(result))
}

/// Applies pending changes with a progress bar and prints the outcome.
pub fn apply_changes(session: &mut LabelSession) -> ApplyResult {
    let total = session.pending_count();
    if total == 0 {
        OutputFormatter::info("No pending changes to apply.");
    }

    let mut engine = ApplyEngine::for_session(session);
    let pb = OutputFormatter::create_progress_bar(total as u64);
    let result = engine.apply_with_progress(session, |progress| {
        pb.set_message(progress.file_name.clone());
        pb.inc(1);
        ControlFlow::Continue(())
    });
    pb.finish_and_clear();

    OutputFormatter::apply_report(&result);
    result
}

fn print_log(root: &Path, settings: &Settings, tail: usize) -> anyhow::Result<()> {
    let store = JsonLogFile::new(settings.log_path(root));
    let entries = store.entries()?;

    if entries.is_empty() {
        OutputFormatter::info(&format!("No activity logged at {}", store.path().display()));
        return Ok(());
    }

    let skip = if tail == 0 {
        0
    } else {
        entries.len().saturating_sub(tail)
    };
    for entry in &entries[skip..] {
        OutputFormatter::plain(&entry.to_string());
    }
    Ok(())
}

/// One command of the interactive review loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewAction {
    Assign(Label),
    Toggle,
    Next,
    Previous,
    Goto(usize),
    ListPending,
    Discard,
    Apply,
    Quit { force: bool },
    Help,
    Unknown(String),
}

/// Parses one input line. An empty line toggles the selected image.
pub fn parse_action(line: &str) -> ReviewAction {
    let line = line.trim();
    let mut parts = line.split_whitespace();
    let command = parts.next().unwrap_or("").to_ascii_lowercase();

    match command.as_str() {
        "" | "t" | "toggle" => ReviewAction::Toggle,
        "d" | "right" => ReviewAction::Assign(Label::Positive),
        "a" | "left" => ReviewAction::Assign(Label::Negative),
        "n" | "j" | "down" => ReviewAction::Next,
        "p" | "k" | "up" => ReviewAction::Previous,
        "g" | "goto" => match parts.next().and_then(|n| n.parse::<usize>().ok()) {
            Some(position) if position > 0 => ReviewAction::Goto(position - 1),
            _ => ReviewAction::Unknown(line.to_string()),
        },
        "l" | "list" => ReviewAction::ListPending,
        "x" | "discard" => ReviewAction::Discard,
        "s" | "apply" => ReviewAction::Apply,
        "q" | "quit" => ReviewAction::Quit { force: false },
        "q!" => ReviewAction::Quit { force: true },
        "h" | "?" | "help" => ReviewAction::Help,
        _ => ReviewAction::Unknown(line.to_string()),
    }
}

fn print_help(session: &LabelSession) {
    let buckets = session.buckets();
    OutputFormatter::header("Commands");
    OutputFormatter::plain(&format!(
        "  d / right    label {}\n  a / left     label {}\n  t / <enter>  toggle label\n  \
         n / j        next image\n  p / k        previous image\n  g <n>        go to image n\n  \
         l            list pending changes\n  x            discard pending changes\n  \
         s            apply pending changes\n  q / q!       quit / quit without applying\n  \
         h            this help",
        buckets.positive, buckets.negative
    ));
}

fn show_selected(session: &LabelSession) {
    if let (Some(index), Some(item)) = (session.cursor(), session.selected()) {
        OutputFormatter::plain(&OutputFormatter::item_line(
            index,
            session.len(),
            item,
            session.buckets(),
            true,
        ));
    }
    let pending = session.pending_count();
    if pending > 0 {
        OutputFormatter::plain(&format!("  {} changes pending", pending));
    }
}

/// Runs the interactive review loop, reading one command per line from `input`.
///
/// The loop ends on `q` (refused while changes are pending), `q!`, or end of
/// input. Buffered log entries are saved on exit.
pub fn review_loop<R: BufRead>(session: &mut LabelSession, input: R) -> anyhow::Result<()> {
    if session.is_empty() {
        OutputFormatter::warning("No compatible images found in either bucket.");
    }
    print_help(session);
    show_selected(session);

    for line in input.lines() {
        let line = line.context("Failed to read input")?;

        match parse_action(&line) {
            ReviewAction::Assign(label) => {
                if let Err(e) = session.set_selected_label(label) {
                    OutputFormatter::warning(&e.to_string());
                }
            }
            ReviewAction::Toggle => {
                if let Err(e) = session.toggle_selected() {
                    OutputFormatter::warning(&e.to_string());
                }
            }
            ReviewAction::Next => {
                let before = session.cursor();
                if before.is_some() && session.move_cursor(1) == before {
                    OutputFormatter::info("Reached the last image.");
                }
            }
            ReviewAction::Previous => {
                let before = session.cursor();
                if before.is_some() && session.move_cursor(-1) == before {
                    OutputFormatter::info("Reached the first image.");
                }
            }
            ReviewAction::Goto(index) => {
                if let Err(e) = session.select(index) {
                    OutputFormatter::warning(&e.to_string());
                }
            }
            ReviewAction::ListPending => {
                let pending: Vec<usize> = session.pending_indices().collect();
                if pending.is_empty() {
                    OutputFormatter::info("No pending changes.");
                }
                for index in pending {
                    OutputFormatter::plain(&OutputFormatter::item_line(
                        index,
                        session.len(),
                        &session.items()[index],
                        session.buckets(),
                        session.cursor() == Some(index),
                    ));
                }
            }
            ReviewAction::Discard => {
                let reset = session.discard_changes();
                OutputFormatter::info(&format!("Discarded {} pending changes.", reset));
            }
            ReviewAction::Apply => {
                apply_changes(session);
            }
            ReviewAction::Quit { force } => {
                let pending = session.pending_count();
                if pending > 0 && !force {
                    OutputFormatter::warning(&format!(
                        "{} changes pending. Use 's' to apply or 'q!' to quit without applying.",
                        pending
                    ));
                    continue;
                }
                return finish_review(session);
            }
            ReviewAction::Help => print_help(session),
            ReviewAction::Unknown(text) => {
                OutputFormatter::warning(&format!("Unknown command '{}', 'h' for help", text));
            }
        }

        show_selected(session);
    }

    finish_review(session)
}

fn finish_review(session: &mut LabelSession) -> anyhow::Result<()> {
    let pending = session.pending_count();
    if pending > 0 {
        OutputFormatter::warning(&format!("Leaving with {} changes not applied.", pending));
    }
    if let Err(e) = session.save_log() {
        OutputFormatter::warning(&format!("Could not save activity log: {}", e));
    }
    Ok(())
}
