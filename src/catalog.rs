//! Catalog loading: turns the two bucket directories into an ordered list of items.

use crate::activity_log::{ActionKind, ActivityLog};
use crate::config::Settings;
use crate::fs::FileSystem;
use crate::label::{Buckets, Label};
use serde_json::{Map, json};
use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// One image file under review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    id: PathBuf,
    file_name: OsString,
    original_label: Label,
    current_label: Label,
}

impl Item {
    pub fn new(id: PathBuf, file_name: OsString, label: Label) -> Self {
        Self {
            id,
            file_name,
            original_label: label,
            current_label: label,
        }
    }

    /// Absolute path of the file when it was loaded. Never changes.
    pub fn id(&self) -> &Path {
        &self.id
    }

    pub fn file_name(&self) -> &OsStr {
        &self.file_name
    }

    /// File name for display.
    pub fn name(&self) -> Cow<'_, str> {
        self.file_name.to_string_lossy()
    }

    /// Label matching the file's location on disk.
    pub fn original_label(&self) -> Label {
        self.original_label
    }

    pub fn current_label(&self) -> Label {
        self.current_label
    }

    pub fn is_pending(&self) -> bool {
        self.current_label != self.original_label
    }

    /// Where the file is on disk right now.
    pub fn location(&self, root: &Path, buckets: &Buckets) -> PathBuf {
        buckets
            .dir_path(root, self.original_label)
            .join(&self.file_name)
    }

    /// Where the file belongs under its current label.
    pub fn destination(&self, root: &Path, buckets: &Buckets) -> PathBuf {
        buckets
            .dir_path(root, self.current_label)
            .join(&self.file_name)
    }

    pub(crate) fn set_current_label(&mut self, label: Label) {
        self.current_label = label;
    }

    /// Records that the file now lives in its current label's bucket.
    pub(crate) fn mark_applied(&mut self) {
        self.original_label = self.current_label;
    }
}

/// Errors that abort a catalog load.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Invalid root folder {}: {reason}", root.display())]
    InvalidRoot { root: PathBuf, reason: String },
    #[error("Error reading directory {}: {source}", path.display())]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Loads every recognized image from both bucket directories under `root`.
///
/// Both buckets must exist as direct subdirectories whose names match the
/// configured names exactly. Items are ordered by file name, then positive
/// label first. On success a `load` entry with per-bucket counts is appended
/// to `log`; on failure nothing is logged.
///
/// # Errors
///
/// `CatalogError::InvalidRoot` if `root` is not a directory or a bucket is
/// missing, `CatalogError::ReadDir` if a listing fails.
pub fn load(
    fs: &dyn FileSystem,
    root: &Path,
    settings: &Settings,
    log: &mut ActivityLog,
) -> Result<Vec<Item>, CatalogError> {
    let root = std::path::absolute(root).map_err(|e| CatalogError::InvalidRoot {
        root: root.to_path_buf(),
        reason: e.to_string(),
    })?;

    if !fs.is_dir(&root) {
        return Err(CatalogError::InvalidRoot {
            root,
            reason: "not a directory".to_string(),
        });
    }

    let root_entries = fs.list_dir(&root).map_err(|e| CatalogError::ReadDir {
        path: root.clone(),
        source: e,
    })?;

    let buckets = &settings.buckets;
    let missing: Vec<&str> = Label::ALL
        .iter()
        .map(|label| buckets.dir_name(*label))
        .filter(|dir_name| {
            !root_entries
                .iter()
                .any(|entry| entry.is_dir && entry.name.as_os_str() == OsStr::new(dir_name))
        })
        .collect();

    if !missing.is_empty() {
        return Err(CatalogError::InvalidRoot {
            root,
            reason: format!(
                "must contain '{}' and '{}' subdirectories (missing: {})",
                buckets.positive,
                buckets.negative,
                missing.join(", ")
            ),
        });
    }

    let mut items = Vec::new();
    let mut counts = Map::new();

    for label in Label::ALL {
        let dir_name = buckets.dir_name(label);
        let dir_path = root.join(dir_name);
        let entries = fs.list_dir(&dir_path).map_err(|e| CatalogError::ReadDir {
            path: dir_path.clone(),
            source: e,
        })?;

        let before = items.len();
        for entry in entries {
            if !entry.is_file {
                continue;
            }
            let relative = Path::new(dir_name).join(&entry.name);
            if settings.filters.should_include(&relative) {
                items.push(Item::new(dir_path.join(&entry.name), entry.name, label));
            }
        }
        counts.insert(dir_name.to_string(), json!(items.len() - before));
    }

    items.sort_by(|a, b| {
        a.file_name
            .cmp(&b.file_name)
            .then(a.original_label.cmp(&b.original_label))
    });

    log.append(
        ActionKind::Load,
        json!({
            "root": root.display().to_string(),
            "total": items.len(),
            "counts": counts,
        }),
    );

    Ok(items)
}
