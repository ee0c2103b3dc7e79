use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::KbaseError;
use crate::path::{title_for, VaultPath};
use crate::storage::{load_json, save_json, SharedStore};

const TABS_KEY: &str = "kbase:tabs";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(u64);

impl fmt::Display for TabId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: TabId,
    pub path: VaultPath,
    pub title: String,
    #[serde(default)]
    pub is_pinned: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Session {
    tabs: Vec<Tab>,
    active_tab_id: Option<TabId>,
}

/// Ordered list of open notes, at most one tab per path.
pub struct TabManager {
    tabs: Vec<Tab>,
    active: Option<TabId>,
    next_id: u64,
    storage: SharedStore,
}

impl TabManager {
    /// Starts with no tabs; nothing is read from storage.
    pub fn new(storage: SharedStore) -> Self {
        Self {
            tabs: Vec::new(),
            active: None,
            next_id: 1,
            storage,
        }
    }

    /// Rebuilds the session saved in storage. Corrupt or missing state gives an
    /// empty session; duplicate paths and a dangling active id are dropped.
    pub fn restore(storage: SharedStore) -> Self {
        let session: Session = load_json(storage.as_ref(), TABS_KEY).unwrap_or_default();

        let mut tabs: Vec<Tab> = Vec::with_capacity(session.tabs.len());
        for tab in session.tabs {
            let duplicate = tabs
                .iter()
                .any(|existing| existing.path == tab.path || existing.id == tab.id);
            if duplicate {
                log::warn!("Dropping duplicate restored tab for {}", tab.path);
                continue;
            }
            tabs.push(tab);
        }

        let active = session
            .active_tab_id
            .filter(|id| tabs.iter().any(|tab| tab.id == *id));
        let next_id = tabs.iter().map(|tab| tab.id.0).max().unwrap_or(0) + 1;

        Self {
            tabs,
            active,
            next_id,
            storage,
        }
    }

    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn active(&self) -> Option<TabId> {
        self.active
    }

    pub fn active_tab(&self) -> Option<&Tab> {
        self.active.and_then(|id| self.get(id))
    }

    pub fn get(&self, id: TabId) -> Option<&Tab> {
        self.tabs.iter().find(|tab| tab.id == id)
    }

    pub fn find_by_path(&self, path: &VaultPath) -> Option<&Tab> {
        self.tabs.iter().find(|tab| &tab.path == path)
    }

    fn index_of(&self, id: TabId) -> Option<usize> {
        self.tabs.iter().position(|tab| tab.id == id)
    }

    /// Activates the tab for `path`, opening a new unpinned one at the end if needed.
    pub fn open_or_activate(&mut self, path: &VaultPath) -> TabId {
        let id = match self.find_by_path(path) {
            Some(tab) => tab.id,
            None => {
                let id = TabId(self.next_id);
                self.next_id += 1;
                self.tabs.push(Tab {
                    id,
                    path: path.clone(),
                    title: title_for(path),
                    is_pinned: false,
                });
                id
            }
        };
        self.active = Some(id);
        self.persist();
        id
    }

    /// Removes a tab. When it was active, the tab to its left becomes active
    /// (the new first tab if it was first), or nothing if the list is now empty.
    pub fn close(&mut self, id: TabId) -> Option<Tab> {
        let index = self.index_of(id)?;
        let removed = self.tabs.remove(index);

        if self.active == Some(id) {
            self.active = if self.tabs.is_empty() {
                None
            } else {
                Some(self.tabs[index.saturating_sub(1)].id)
            };
        }

        self.persist();
        Some(removed)
    }

    /// Flips the pinned flag and returns the new value.
    pub fn toggle_pin(&mut self, id: TabId) -> Result<bool, KbaseError> {
        let tab = self
            .tabs
            .iter_mut()
            .find(|tab| tab.id == id)
            .ok_or(KbaseError::UnknownTab(id))?;
        tab.is_pinned = !tab.is_pinned;
        let pinned = tab.is_pinned;
        self.persist();
        Ok(pinned)
    }

    /// Moves the tab at `from` to `to`. Returns `false` if either index is out of bounds.
    pub fn reorder(&mut self, from: usize, to: usize) -> bool {
        if from >= self.tabs.len() || to >= self.tabs.len() {
            return false;
        }
        let tab = self.tabs.remove(from);
        self.tabs.insert(to, tab);
        self.persist();
        true
    }

    pub fn set_active(&mut self, id: TabId) -> Result<(), KbaseError> {
        if self.index_of(id).is_none() {
            return Err(KbaseError::UnknownTab(id));
        }
        self.active = Some(id);
        self.persist();
        Ok(())
    }

    /// Closes the tab showing `path`, if any.
    pub fn close_path(&mut self, path: &VaultPath) -> Option<Tab> {
        let id = self.find_by_path(path)?.id;
        self.close(id)
    }

    /// Closes every tab at or below `dir`, returning them in their former order.
    pub fn close_under(&mut self, dir: &VaultPath) -> Vec<Tab> {
        let ids: Vec<TabId> = self
            .tabs
            .iter()
            .filter(|tab| tab.path.starts_with(dir))
            .map(|tab| tab.id)
            .collect();
        ids.into_iter().filter_map(|id| self.close(id)).collect()
    }

    /// Points tabs at their new location after a note or directory move.
    pub fn retarget(&mut self, from: &VaultPath, to: &VaultPath) -> usize {
        let mut changed = 0;
        for tab in &mut self.tabs {
            if let Some(moved) = tab.path.rebase(from, to) {
                tab.title = title_for(&moved);
                tab.path = moved;
                changed += 1;
            }
        }
        if changed > 0 {
            self.persist();
        }
        changed
    }

    fn persist(&self) {
        let session = Session {
            tabs: self.tabs.clone(),
            active_tab_id: self.active,
        };
        if let Err(error) = save_json(self.storage.as_ref(), TABS_KEY, &session) {
            log::error!("Failed to persist open tabs: {error}");
        }
    }
}
