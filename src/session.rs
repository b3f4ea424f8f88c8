//! The in-memory review state: items, their pending labels, and the cursor.

use crate::activity_log::{ActionKind, ActivityLog, LogError};
use crate::catalog::{self, CatalogError, Item};
use crate::config::Settings;
use crate::fs::{FileSystem, RealFs};
use crate::label::{Buckets, Label};
use serde_json::json;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Index {index} is out of range (session has {len} items)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("No item is selected")]
    NoSelection,
}

/// Item counts by current label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LabelCounts {
    pub positive: usize,
    pub negative: usize,
}

impl LabelCounts {
    pub fn get(&self, label: Label) -> usize {
        match label {
            Label::Positive => self.positive,
            Label::Negative => self.negative,
        }
    }
}

/// Review state for one root folder.
///
/// The item order is fixed at load time. The cursor is `Some` exactly when the
/// session has items.
#[derive(Debug)]
pub struct LabelSession {
    root: PathBuf,
    settings: Settings,
    items: Vec<Item>,
    cursor: Option<usize>,
    log: ActivityLog,
}

impl LabelSession {
    /// Loads the catalog under `root` from disk.
    pub fn open(root: &Path, settings: Settings) -> Result<Self, CatalogError> {
        Self::open_with(&RealFs, root, settings)
    }

    /// Loads the catalog through `fs`. The session's log starts with the `load` entry.
    pub fn open_with(
        fs: &dyn FileSystem,
        root: &Path,
        settings: Settings,
    ) -> Result<Self, CatalogError> {
        let mut log = ActivityLog::new();
        let items = catalog::load(fs, root, &settings, &mut log)?;
        let root = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());
        Ok(Self::from_parts(root, settings, items, log))
    }

    pub fn from_parts(
        root: PathBuf,
        settings: Settings,
        items: Vec<Item>,
        log: ActivityLog,
    ) -> Self {
        let cursor = if items.is_empty() { None } else { Some(0) };
        Self {
            root,
            settings,
            items,
            cursor,
            log,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn buckets(&self) -> &Buckets {
        &self.settings.buckets
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn item(&self, index: usize) -> Option<&Item> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn selected(&self) -> Option<&Item> {
        self.cursor.and_then(|index| self.items.get(index))
    }

    /// Indices of items whose file name equals `name`.
    ///
    /// The same name can appear once in each bucket, so up to two indices come back.
    pub fn find_by_name(&self, name: &str) -> Vec<usize> {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.file_name() == name)
            .map(|(index, _)| index)
            .collect()
    }

    fn check_index(&self, index: usize) -> Result<(), SessionError> {
        if index < self.items.len() {
            Ok(())
        } else {
            Err(SessionError::IndexOutOfRange {
                index,
                len: self.items.len(),
            })
        }
    }

    /// Flips the item's current label and returns the new one.
    pub fn toggle(&mut self, index: usize) -> Result<Label, SessionError> {
        self.check_index(index)?;
        let new_label = self.items[index].current_label().other();
        self.relabel(index, new_label);
        Ok(new_label)
    }

    /// Assigns `label` to the item. Returns false, and logs nothing, if the
    /// item already has that label.
    pub fn set_label(&mut self, index: usize, label: Label) -> Result<bool, SessionError> {
        self.check_index(index)?;
        if self.items[index].current_label() == label {
            return Ok(false);
        }
        self.relabel(index, label);
        Ok(true)
    }

    pub fn toggle_selected(&mut self) -> Result<Label, SessionError> {
        let index = self.cursor.ok_or(SessionError::NoSelection)?;
        self.toggle(index)
    }

    pub fn set_selected_label(&mut self, label: Label) -> Result<bool, SessionError> {
        let index = self.cursor.ok_or(SessionError::NoSelection)?;
        self.set_label(index, label)
    }

    fn relabel(&mut self, index: usize, label: Label) {
        let buckets = &self.settings.buckets;
        let item = &mut self.items[index];
        let old_label = item.current_label();
        item.set_current_label(label);

        self.log.append(
            ActionKind::Toggle,
            json!({
                "id": item.id().display().to_string(),
                "file": item.name(),
                "from": buckets.dir_name(old_label),
                "to": buckets.dir_name(label),
                "pending": item.is_pending(),
            }),
        );
    }

    /// Moves the cursor by `delta`, clamped to the item range.
    pub fn move_cursor(&mut self, delta: isize) -> Option<usize> {
        let current = self.cursor?;
        let last = self.items.len() - 1;
        let next = current.saturating_add_signed(delta).min(last);
        self.cursor = Some(next);
        self.cursor
    }

    /// Selects an item directly.
    pub fn select(&mut self, index: usize) -> Result<usize, SessionError> {
        self.check_index(index)?;
        self.cursor = Some(index);
        Ok(index)
    }

    pub fn pending_count(&self) -> usize {
        self.items.iter().filter(|item| item.is_pending()).count()
    }

    pub fn pending_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.is_pending())
            .map(|(index, _)| index)
    }

    pub fn pending_items(&self) -> impl Iterator<Item = &Item> + '_ {
        self.items.iter().filter(|item| item.is_pending())
    }

    /// Counts items by their current label.
    pub fn counts(&self) -> LabelCounts {
        self.items
            .iter()
            .fold(LabelCounts::default(), |mut counts, item| {
                match item.current_label() {
                    Label::Positive => counts.positive += 1,
                    Label::Negative => counts.negative += 1,
                }
                counts
            })
    }

    /// Resets every pending item to its on-disk label. Returns how many were reset.
    pub fn discard_changes(&mut self) -> usize {
        let pending: Vec<usize> = self.pending_indices().collect();
        for &index in &pending {
            let original = self.items[index].original_label();
            self.relabel(index, original);
        }
        pending.len()
    }

    pub(crate) fn mark_applied(&mut self, index: usize) {
        self.items[index].mark_applied();
    }

    pub fn log(&self) -> &ActivityLog {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut ActivityLog {
        &mut self.log
    }

    /// Path of the activity log file for this root.
    pub fn log_path(&self) -> PathBuf {
        self.settings.log_path(&self.root)
    }

    /// Persists buffered log entries to the root's log file.
    pub fn save_log(&mut self) -> Result<usize, LogError> {
        let log_path = self.log_path();
        self.log.flush_to(&log_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFs;

    fn session_with(files: &[&str]) -> LabelSession {
        let mut fs = MemoryFs::new();
        fs.add_dir("/root/center");
        fs.add_dir("/root/not_center");
        for file in files {
            fs.add_file(Path::new("/root").join(file));
        }
        LabelSession::open_with(&fs, Path::new("/root"), Settings::default())
            .expect("Failed to open session")
    }

    #[test]
    fn test_open_starts_with_cursor_at_first_item() {
        let session = session_with(&["center/a.png", "not_center/b.png"]);
        assert_eq!(session.len(), 2);
        assert_eq!(session.cursor(), Some(0));
        assert_eq!(session.pending_count(), 0);
        assert_eq!(session.log().pending().len(), 1);
        assert_eq!(session.settings().log_file, "image_review_log.json");
        assert_eq!(session.log_path(), Path::new("/root").join("image_review_log.json"));
    }

    #[test]
    fn test_empty_session_has_no_cursor() {
        let mut session = session_with(&[]);
        assert!(session.is_empty());
        assert_eq!(session.cursor(), None);
        assert_eq!(session.move_cursor(1), None);
        assert_eq!(session.toggle_selected(), Err(SessionError::NoSelection));
    }

    #[test]
    fn test_toggle_marks_pending_and_logs() {
        let mut session = session_with(&["center/a.png", "not_center/b.png"]);

        assert_eq!(session.toggle(0), Ok(Label::Negative));
        assert_eq!(session.pending_count(), 1);
        assert_eq!(session.item(0).unwrap().current_label(), Label::Negative);
        assert_eq!(session.item(0).unwrap().original_label(), Label::Positive);
        let pending: Vec<_> = session.pending_items().map(|item| item.name()).collect();
        assert_eq!(pending, vec!["a.png"]);

        let entry = session.log().pending().last().unwrap();
        assert_eq!(entry.kind, ActionKind::Toggle);
        assert_eq!(entry.payload["file"], "a.png");
        assert_eq!(entry.payload["from"], "center");
        assert_eq!(entry.payload["to"], "not_center");
        assert_eq!(entry.payload["pending"], true);
    }

    #[test]
    fn test_double_toggle_restores_state() {
        let mut session = session_with(&["center/a.png", "not_center/b.png"]);
        session.toggle(1).unwrap();
        let before = session.pending_count();

        session.toggle(0).unwrap();
        session.toggle(0).unwrap();

        assert_eq!(session.pending_count(), before);
        let item = session.item(0).unwrap();
        assert_eq!(item.current_label(), item.original_label());
    }

    #[test]
    fn test_toggle_out_of_range() {
        let mut session = session_with(&["center/a.png"]);
        let log_len = session.log().pending().len();

        assert_eq!(
            session.toggle(5),
            Err(SessionError::IndexOutOfRange { index: 5, len: 1 })
        );
        assert_eq!(session.log().pending().len(), log_len);
    }

    #[test]
    fn test_set_label_is_noop_when_unchanged() {
        let mut session = session_with(&["center/a.png"]);
        let log_len = session.log().pending().len();

        assert_eq!(session.set_label(0, Label::Positive), Ok(false));
        assert_eq!(session.log().pending().len(), log_len);

        assert_eq!(session.set_label(0, Label::Negative), Ok(true));
        assert_eq!(session.log().pending().len(), log_len + 1);
        assert_eq!(session.pending_count(), 1);
    }

    #[test]
    fn test_move_cursor_clamps_without_wrapping() {
        let mut session = session_with(&["center/a.png", "center/b.png", "center/c.png"]);

        assert_eq!(session.move_cursor(-1), Some(0));
        assert_eq!(session.move_cursor(1), Some(1));
        assert_eq!(session.move_cursor(10), Some(2));
        assert_eq!(session.move_cursor(1), Some(2));
        assert_eq!(session.move_cursor(-100), Some(0));
    }

    #[test]
    fn test_select_and_selected_label() {
        let mut session = session_with(&["center/a.png", "center/b.png"]);

        assert_eq!(session.select(1), Ok(1));
        assert_eq!(session.selected().unwrap().name(), "b.png");
        assert!(session.select(2).is_err());
        assert_eq!(session.cursor(), Some(1));

        assert_eq!(session.set_selected_label(Label::Negative), Ok(true));
        assert_eq!(session.item(1).unwrap().current_label(), Label::Negative);
    }

    #[test]
    fn test_discard_changes_resets_pending() {
        let mut session = session_with(&["center/a.png", "not_center/b.png", "center/c.png"]);
        session.toggle(0).unwrap();
        session.toggle(1).unwrap();

        assert_eq!(session.discard_changes(), 2);
        assert_eq!(session.pending_count(), 0);
        assert_eq!(session.discard_changes(), 0);
    }

    #[test]
    fn test_counts_follow_current_labels() {
        let mut session = session_with(&["center/a.png", "center/b.png", "not_center/c.png"]);
        assert_eq!(
            session.counts(),
            LabelCounts {
                positive: 2,
                negative: 1
            }
        );

        session.toggle(0).unwrap();
        assert_eq!(session.counts().get(Label::Positive), 1);
        assert_eq!(session.counts().get(Label::Negative), 2);
    }

    #[test]
    fn test_find_by_name_returns_both_buckets() {
        let session = session_with(&["center/a.png", "not_center/a.png", "center/b.png"]);
        assert_eq!(session.find_by_name("a.png"), vec![0, 1]);
        assert_eq!(session.find_by_name("b.png"), vec![2]);
        assert!(session.find_by_name("z.png").is_empty());
    }
}
