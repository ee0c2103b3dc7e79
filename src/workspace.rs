//! One note-viewing surface: open tabs, the dual editors of the active note,
//! their saved view state, debounced saving and cross-window notifications.
//!
//! A pending save is always written before the surface leaves its note
//! (switching tabs, closing the tab, deleting or moving the note).

use std::time::{Duration, Instant};

use crate::autosave::{AutoSave, PendingSave};
use crate::broadcast::{MessageKind, WindowChannel};
use crate::error::KbaseError;
use crate::markdown::Document;
use crate::note_state::{NoteStateStore, ViewState};
use crate::path::VaultPath;
use crate::storage::SharedStore;
use crate::sync::{ContentChange, EditorKind, PlainEditor, RichEditor, SyncController};
use crate::tabs::{TabId, TabManager};
use crate::vault_store::{NoteBackend, VaultStore};

pub struct Workspace {
    store: VaultStore,
    tabs: TabManager,
    note_states: NoteStateStore,
    sync: SyncController,
    autosave: AutoSave,
    channel: WindowChannel,
    current: Option<VaultPath>,
}

impl Workspace {
    /// Builds a workspace with the tab session found in `storage`. Call
    /// [`Workspace::resume`] to load the restored active note.
    pub fn new(
        backend: Box<dyn NoteBackend>,
        storage: SharedStore,
        channel: WindowChannel,
        autosave_delay: Duration,
    ) -> Self {
        Self {
            store: VaultStore::new(backend),
            tabs: TabManager::restore(storage.clone()),
            note_states: NoteStateStore::new(storage),
            sync: SyncController::new(""),
            autosave: AutoSave::new(autosave_delay),
            channel,
            current: None,
        }
    }

    pub fn store(&self) -> &VaultStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut VaultStore {
        &mut self.store
    }

    pub fn tabs(&self) -> &TabManager {
        &self.tabs
    }

    pub fn sync(&self) -> &SyncController {
        &self.sync
    }

    pub fn content(&self) -> &str {
        self.sync.content()
    }

    /// Path of the note currently loaded into the editors.
    pub fn current(&self) -> Option<&VaultPath> {
        self.current.as_ref()
    }

    pub fn pending_save(&self) -> Option<&PendingSave> {
        self.autosave.pending()
    }

    /// Loads the file tree and the active tab of a restored session.
    pub fn resume(&mut self) -> Result<(), KbaseError> {
        self.store.refresh_tree()?;
        if let Some(tab) = self.tabs.active_tab() {
            let path = tab.path.clone();
            self.load(&path)?;
        }
        Ok(())
    }

    /// Opens `path` in a tab (reusing an existing one) and loads it into both editors.
    pub fn open(&mut self, path: &VaultPath) -> Result<TabId, KbaseError> {
        if self.current.as_ref() != Some(path) {
            self.leave_current()?;
            self.load(path)?;
        }
        let id = self.tabs.open_or_activate(path);
        if let Err(error) = self.channel.note_selected(path) {
            log::warn!("Failed to broadcast selection of {path}: {error}");
        }
        Ok(id)
    }

    pub fn activate_tab(&mut self, id: TabId) -> Result<(), KbaseError> {
        let path = self.tabs.get(id).ok_or(KbaseError::UnknownTab(id))?.path.clone();
        self.open(&path).map(|_| ())
    }

    /// Closes a tab and evicts its note. The neighbour that becomes active is
    /// loaded; when no tab is left the editors are emptied.
    pub fn close_tab(&mut self, id: TabId) -> Result<(), KbaseError> {
        let path = self.tabs.get(id).ok_or(KbaseError::UnknownTab(id))?.path.clone();
        if self.current.as_ref() == Some(&path) {
            self.leave_current()?;
        }
        self.tabs.close(id);
        self.store.evict(&path);
        self.show_active()
    }

    /// Switches the visible editor, keeping the hidden one's view state.
    pub fn toggle_editor(&mut self) -> EditorKind {
        self.save_view_state(self.sync.active());
        self.sync.toggle()
    }

    pub fn edit_rich(&mut self, f: impl FnOnce(&mut RichEditor), now: Instant) -> Result<Option<ContentChange>, KbaseError> {
        self.require_open()?;
        let change = self.sync.edit_rich(f);
        self.after_edit(change, now)
    }

    pub fn edit_plain(&mut self, f: impl FnOnce(&mut PlainEditor), now: Instant) -> Result<Option<ContentChange>, KbaseError> {
        self.require_open()?;
        let change = self.sync.edit_plain(f);
        self.after_edit(change, now)
    }

    /// Convenience for edits expressed on the structured document.
    pub fn edit_document(&mut self, f: impl FnOnce(&mut Document), now: Instant) -> Result<Option<ContentChange>, KbaseError> {
        self.edit_rich(|editor| editor.update(f), now)
    }

    fn require_open(&self) -> Result<(), KbaseError> {
        match self.current {
            Some(_) => Ok(()),
            None => Err(KbaseError::NoOpenNote),
        }
    }

    fn after_edit(&mut self, change: Option<ContentChange>, now: Instant) -> Result<Option<ContentChange>, KbaseError> {
        let (Some(change), Some(path)) = (change, self.current.clone()) else {
            return Ok(None);
        };
        if let Some(superseded) = self.autosave.schedule(&path, &change.content, now) {
            self.write(superseded)?;
        }
        if let Err(error) = self.channel.note_updated(&path, &change.content) {
            log::warn!("Failed to broadcast update of {path}: {error}");
        }
        Ok(Some(change))
    }

    /// Writes the pending save if its delay has passed. Returns whether anything was written.
    pub fn tick(&mut self, now: Instant) -> Result<bool, KbaseError> {
        match self.autosave.poll(now) {
            Some(save) => self.write(save).map(|_| true),
            None => Ok(false),
        }
    }

    /// Writes the pending save immediately.
    pub fn flush(&mut self) -> Result<(), KbaseError> {
        match self.autosave.flush() {
            Some(save) => self.write(save),
            None => Ok(()),
        }
    }

    fn write(&mut self, save: PendingSave) -> Result<(), KbaseError> {
        self.store.update_note(&save.path, &save.content).inspect_err(|error| {
            log::error!("Failed to save {}: {error}", save.path);
        })
    }

    /// Applies messages from other windows. Returns how many were acted on.
    pub fn poll_broadcasts(&mut self) -> usize {
        let mut applied = 0;
        for message in self.channel.drain() {
            match message.kind {
                MessageKind::NoteUpdated => {
                    let (Some(path), Some(content)) = (message.path, message.content) else {
                        continue;
                    };
                    if self.current.as_ref() != Some(&path) {
                        self.store.evict(&path);
                        continue;
                    }
                    // The other window wins; our older pending text must not overwrite it.
                    self.autosave.cancel_for(&path);
                    self.store.set_cached_content(&path, &content);
                    self.sync.set_content(&content);
                    applied += 1;
                }
                MessageKind::FileTreeUpdated => {
                    if self.store.refresh_tree().is_ok() {
                        applied += 1;
                    }
                }
                MessageKind::NoteSelected => {
                    log::debug!("Window {} selected {:?}", message.window_id, message.path);
                }
            }
        }
        applied
    }

    pub fn create_note(&mut self, raw_path: &str, content: &str) -> Result<VaultPath, KbaseError> {
        let created = self.store.create_note(raw_path, content)?;
        self.tree_changed();
        Ok(created)
    }

    pub fn delete_note(&mut self, path: &VaultPath) -> Result<(), KbaseError> {
        self.store.delete_note(path)?;
        self.autosave.cancel_for(path);
        self.forget(path)?;
        self.tree_changed();
        Ok(())
    }

    pub fn move_note(&mut self, path: &VaultPath, raw_destination: &str) -> Result<VaultPath, KbaseError> {
        self.flush_under(path)?;
        let moved = self.store.move_note(path, raw_destination)?;
        self.relocate(path, &moved)?;
        self.tree_changed();
        Ok(moved)
    }

    pub fn rename_directory(&mut self, path: &VaultPath, new_name: &str) -> Result<VaultPath, KbaseError> {
        self.flush_under(path)?;
        let renamed = self.store.rename_directory(path, new_name)?;
        self.relocate(path, &renamed)?;
        self.tree_changed();
        Ok(renamed)
    }

    pub fn move_directory(&mut self, path: &VaultPath, raw_destination: &str) -> Result<VaultPath, KbaseError> {
        self.flush_under(path)?;
        let moved = self.store.move_directory(path, raw_destination)?;
        self.relocate(path, &moved)?;
        self.tree_changed();
        Ok(moved)
    }

    pub fn delete_directory(&mut self, path: &VaultPath, recursive: bool) -> Result<(), KbaseError> {
        self.store.delete_directory(path, recursive)?;
        self.autosave.cancel_for(path);
        self.forget(path)?;
        self.tree_changed();
        Ok(())
    }

    fn load(&mut self, path: &VaultPath) -> Result<(), KbaseError> {
        let content = self.store.get_note(path)?.content.clone();
        self.current = Some(path.clone());
        self.sync.set_content(&content);
        self.restore_view_states(path);
        Ok(())
    }

    /// Puts both editors at the note's saved position, or at the top when it has none.
    fn restore_view_states(&mut self, path: &VaultPath) {
        let record = self.note_states.load(path).unwrap_or_default();
        for kind in [EditorKind::Rich, EditorKind::Plain] {
            let state = record.get(kind).cloned().unwrap_or_default();
            self.sync.restore_view_state(kind, &state);
        }
    }

    /// Saves view state and writes the pending save before the current note goes away.
    fn leave_current(&mut self) -> Result<(), KbaseError> {
        if self.current.is_none() {
            return Ok(());
        }
        self.save_view_state(EditorKind::Rich);
        self.save_view_state(EditorKind::Plain);
        self.flush()
    }

    fn save_view_state(&self, kind: EditorKind) {
        let (Some(path), Some(state)) = (self.current.as_ref(), self.sync.view_state(kind)) else {
            return;
        };
        if let Err(error) = self.note_states.save(path, kind, &state) {
            log::warn!("Failed to save {kind} view state for {path}: {error}");
        }
    }

    /// Loads whichever tab is active now, or empties the editors.
    fn show_active(&mut self) -> Result<(), KbaseError> {
        match self.tabs.active_tab().map(|tab| tab.path.clone()) {
            Some(path) if self.current.as_ref() == Some(&path) => Ok(()),
            Some(path) => self.load(&path),
            None => {
                self.current = None;
                self.sync.set_content("");
                for kind in [EditorKind::Rich, EditorKind::Plain] {
                    self.sync.restore_view_state(kind, &ViewState::default());
                }
                Ok(())
            }
        }
    }

    fn flush_under(&mut self, path: &VaultPath) -> Result<(), KbaseError> {
        if self.autosave.pending().is_some_and(|pending| pending.path.starts_with(path)) {
            self.flush()?;
        }
        Ok(())
    }

    /// Drops tabs and view state for a deleted note or directory.
    fn forget(&mut self, path: &VaultPath) -> Result<(), KbaseError> {
        let closed = self.tabs.close_under(path);
        for tab in &closed {
            self.note_states.clear(&tab.path)?;
        }
        if self.current.as_ref().is_some_and(|current| current.starts_with(path)) {
            self.current = None;
        }
        self.show_active()
    }

    /// Follows a note or directory to its new location.
    fn relocate(&mut self, from: &VaultPath, to: &VaultPath) -> Result<(), KbaseError> {
        self.tabs.retarget(from, to);
        self.note_states.rename(from, to)?;
        if let Some(moved) = self.current.as_ref().and_then(|current| current.rebase(from, to)) {
            self.current = Some(moved);
        }
        Ok(())
    }

    fn tree_changed(&self) {
        if let Err(error) = self.channel.file_tree_updated() {
            log::warn!("Failed to broadcast file tree update: {error}");
        }
    }
}
