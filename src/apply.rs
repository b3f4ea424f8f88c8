//! Apply engine: commits pending labels by moving files between buckets.
//!
//! Each pending item is moved independently. A failed item stays pending and
//! the batch continues; successful items are marked applied immediately, so
//! the session always matches what is on disk. The activity log is flushed
//! once at the end of the batch.

use crate::activity_log::{ActionKind, JsonLogFile, LogError, LogStore};
use crate::catalog::Item;
use crate::fs::{FileSystem, RealFs};
use crate::session::LabelSession;
use serde_json::json;
use std::io;
use std::ops::ControlFlow;
use std::path::PathBuf;
use thiserror::Error;

/// A move apply would perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMove {
    /// Index of the item in the session.
    pub index: usize,
    pub from: PathBuf,
    pub to: PathBuf,
}

/// Why a single item could not be moved.
#[derive(Debug, Error)]
pub enum MoveError {
    /// A different file already occupies the destination.
    #[error("Destination {} already exists", to.display())]
    Conflict { from: PathBuf, to: PathBuf },
    #[error("Failed to move {} to {}: {source}", from.display(), to.display())]
    Filesystem {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
}

impl MoveError {
    fn filesystem(planned: &PlannedMove, source: io::Error) -> Self {
        Self::Filesystem {
            from: planned.from.clone(),
            to: planned.to.clone(),
            source,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MoveError::Conflict { .. } => "conflict",
            MoveError::Filesystem { .. } => "filesystem",
        }
    }
}

/// An item that stayed pending after apply.
#[derive(Debug)]
pub struct FailedMove {
    pub index: usize,
    pub item: Item,
    pub error: MoveError,
}

/// Outcome of one apply batch.
#[derive(Debug, Default)]
pub struct ApplyResult {
    pub moved: usize,
    pub failed: Vec<FailedMove>,
    /// True if the progress callback stopped the batch early.
    pub cancelled: bool,
    /// Set if the activity log could not be persisted. Moves are kept regardless.
    pub log_error: Option<LogError>,
}

impl ApplyResult {
    /// True if every planned move succeeded and the log was written.
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty() && !self.cancelled && self.log_error.is_none()
    }
}

/// Progress report passed to the apply callback after each item.
#[derive(Debug, Clone)]
pub struct ApplyProgress {
    pub done: usize,
    pub total: usize,
    pub file_name: String,
    pub succeeded: bool,
}

/// Lists the moves apply would attempt, in session order, without touching disk.
pub fn plan(session: &LabelSession) -> Vec<PlannedMove> {
    let (root, buckets) = (session.root(), session.buckets());
    session
        .pending_indices()
        .map(|index| {
            let item = &session.items()[index];
            PlannedMove {
                index,
                from: item.location(root, buckets),
                to: item.destination(root, buckets),
            }
        })
        .collect()
}

/// Commits pending labels through a filesystem and a log store.
pub struct ApplyEngine<F: FileSystem, S: LogStore> {
    fs: F,
    store: S,
}

impl ApplyEngine<RealFs, JsonLogFile> {
    /// Engine that moves real files and logs to the session's log file.
    pub fn for_session(session: &LabelSession) -> Self {
        Self::new(RealFs, JsonLogFile::new(session.log_path()))
    }
}

impl<F: FileSystem, S: LogStore> ApplyEngine<F, S> {
    pub fn new(fs: F, store: S) -> Self {
        Self { fs, store }
    }

    /// The moves [`apply`](Self::apply) would attempt right now.
    pub fn plan(&self, session: &LabelSession) -> Vec<PlannedMove> {
        plan(session)
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    pub fn fs_mut(&mut self) -> &mut F {
        &mut self.fs
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Applies every pending item.
    pub fn apply(&mut self, session: &mut LabelSession) -> ApplyResult {
        self.apply_with_progress(session, |_| ControlFlow::Continue(()))
    }

    /// Applies pending items, calling `progress` after each one.
    ///
    /// Returning `ControlFlow::Break` stops the batch before the next item;
    /// unprocessed items stay pending. The session is borrowed exclusively for
    /// the whole batch, so labels cannot change while moves are in flight.
    pub fn apply_with_progress(
        &mut self,
        session: &mut LabelSession,
        mut progress: impl FnMut(&ApplyProgress) -> ControlFlow<()>,
    ) -> ApplyResult {
        let plan = plan(session);
        let total = plan.len();
        let mut result = ApplyResult::default();

        for (done, planned) in plan.iter().enumerate() {
            let item = &session.items()[planned.index];
            let file_name = item.name().to_string();
            let id = item.id().display().to_string();
            let from_dir = session.buckets().dir_name(item.original_label()).to_string();
            let to_dir = session.buckets().dir_name(item.current_label()).to_string();

            let succeeded = match self.move_one(planned) {
                Ok(()) => {
                    session.mark_applied(planned.index);
                    session.log_mut().append(
                        ActionKind::ApplySuccess,
                        json!({
                            "id": id,
                            "file": file_name,
                            "from": from_dir,
                            "to": to_dir,
                        }),
                    );
                    result.moved += 1;
                    true
                }
                Err(error) => {
                    session.log_mut().append(
                        ActionKind::ApplyError,
                        json!({
                            "id": id,
                            "file": file_name,
                            "from": from_dir,
                            "to": to_dir,
                            "error": error.kind(),
                            "message": error.to_string(),
                        }),
                    );
                    result.failed.push(FailedMove {
                        index: planned.index,
                        item: session.items()[planned.index].clone(),
                        error,
                    });
                    false
                }
            };

            let report = ApplyProgress {
                done: done + 1,
                total,
                file_name,
                succeeded,
            };
            if progress(&report).is_break() && done + 1 < total {
                result.cancelled = true;
                break;
            }
        }

        let pending = session.pending_count();
        session.log_mut().append(
            ActionKind::Apply,
            json!({
                "moved": result.moved,
                "failed": result.failed.len(),
                "cancelled": result.cancelled,
                "pending": pending,
            }),
        );
        result.log_error = session.log_mut().flush(&mut self.store).err();

        result
    }

    fn move_one(&mut self, planned: &PlannedMove) -> Result<(), MoveError> {
        if !self.fs.exists(&planned.from) {
            return Err(MoveError::filesystem(
                planned,
                io::Error::new(io::ErrorKind::NotFound, "source file not found"),
            ));
        }

        if self.fs.exists(&planned.to) {
            let same = self
                .fs
                .is_same_file(&planned.from, &planned.to)
                .map_err(|e| MoveError::filesystem(planned, e))?;
            if !same {
                return Err(MoveError::Conflict {
                    from: planned.from.clone(),
                    to: planned.to.clone(),
                });
            }
            // Both bucket entries link to one file; dropping the source link
            // leaves it only under the destination.
            return self
                .fs
                .remove_file(&planned.from)
                .map_err(|e| MoveError::filesystem(planned, e));
        }

        if let Some(dest_dir) = planned.to.parent()
            && !self.fs.is_dir(dest_dir)
        {
            self.fs
                .create_dir_all(dest_dir)
                .map_err(|e| MoveError::filesystem(planned, e))?;
        }

        self.fs
            .rename(&planned.from, &planned.to)
            .map_err(|e| MoveError::filesystem(planned, e))
    }
}
