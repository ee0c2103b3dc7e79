use serde::{Deserialize, Serialize};

use crate::error::KbaseError;
use crate::path::VaultPath;
use crate::storage::{load_json, save_json, SharedStore};
use crate::sync::EditorKind;

const KEY_PREFIX: &str = "kbase:note-state:";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SelectionRange {
    pub anchor: usize,
    pub head: usize,
}

/// Cursor and scroll position of one editor for one note.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<SelectionRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_top: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_left: Option<f64>,
}

impl ViewState {
    /// Overlays the fields set in `update`; unset fields keep their current value.
    pub fn merge(&mut self, update: &ViewState) {
        if update.selection.is_some() {
            self.selection = update.selection;
        }
        if update.scroll_top.is_some() {
            self.scroll_top = update.scroll_top;
        }
        if update.scroll_left.is_some() {
            self.scroll_left = update.scroll_left;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteStateRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rich: Option<ViewState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plain: Option<ViewState>,
}

impl NoteStateRecord {
    pub fn get(&self, kind: EditorKind) -> Option<&ViewState> {
        match kind {
            EditorKind::Rich => self.rich.as_ref(),
            EditorKind::Plain => self.plain.as_ref(),
        }
    }

    fn slot(&mut self, kind: EditorKind) -> &mut Option<ViewState> {
        match kind {
            EditorKind::Rich => &mut self.rich,
            EditorKind::Plain => &mut self.plain,
        }
    }
}

/// Per-note, per-editor view state, one storage key per note path.
pub struct NoteStateStore {
    storage: SharedStore,
}

impl NoteStateStore {
    pub fn new(storage: SharedStore) -> Self {
        Self { storage }
    }

    fn key(path: &VaultPath) -> String {
        format!("{KEY_PREFIX}{}", path.to_url_path())
    }

    /// Merges `state` into the record for `(path, kind)`, leaving the other editor's state alone.
    pub fn save(&self, path: &VaultPath, kind: EditorKind, state: &ViewState) -> Result<(), KbaseError> {
        let mut record = self.load(path).unwrap_or_default();
        record.slot(kind).get_or_insert_with(ViewState::default).merge(state);
        save_json(self.storage.as_ref(), &Self::key(path), &record)
    }

    /// The stored record, or `None` when nothing (or nothing readable) is stored.
    pub fn load(&self, path: &VaultPath) -> Option<NoteStateRecord> {
        load_json(self.storage.as_ref(), &Self::key(path))
    }

    pub fn clear(&self, path: &VaultPath) -> Result<(), KbaseError> {
        self.storage.remove(&Self::key(path))
    }

    /// Moves state after a note is moved; a directory move rebases every note under it.
    pub fn rename(&self, from: &VaultPath, to: &VaultPath) -> Result<(), KbaseError> {
        let affected: Vec<VaultPath> = self
            .storage
            .keys()
            .iter()
            .filter_map(|key| key.strip_prefix(KEY_PREFIX))
            .filter_map(|raw| VaultPath::parse(raw).ok())
            .filter(|path| path.starts_with(from))
            .collect();

        for old in affected {
            let Some(new) = old.rebase(from, to) else {
                continue;
            };
            if let Some(record) = self.load(&old) {
                save_json(self.storage.as_ref(), &Self::key(&new), &record)?;
            }
            self.clear(&old)?;
            log::debug!("Moved view state {old} -> {new}");
        }
        Ok(())
    }
}
