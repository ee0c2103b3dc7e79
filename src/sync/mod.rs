//! Keeps the rich and plain editors of one viewing surface on the same content.
//!
//! Both editors stay mounted. Every change to the shared content is pushed
//! into both of them (inbound), skipping an editor whose current state already
//! matches. Only the active editor may write back into the shared content
//! (outbound); a change reported by the hidden editor is discarded and the
//! hidden editor is reloaded from the shared content.

mod plain;
mod rich;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use plain::PlainEditor;
pub use rich::RichEditor;

use crate::note_state::ViewState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditorKind {
    Rich,
    Plain,
}

impl EditorKind {
    pub fn other(self) -> Self {
        match self {
            EditorKind::Rich => EditorKind::Plain,
            EditorKind::Plain => EditorKind::Rich,
        }
    }
}

impl fmt::Display for EditorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditorKind::Rich => write!(formatter, "rich"),
            EditorKind::Plain => write!(formatter, "plain"),
        }
    }
}

/// What an editor must offer to take part in synchronization.
pub trait EditorAdapter {
    /// The editor's content as markdown.
    fn serialize(&self) -> String;

    /// Whether loading `content` would leave the editor unchanged.
    fn is_current(&self, content: &str) -> bool {
        self.serialize() == content
    }

    /// Replaces the editor's content. Never reports a change back.
    fn load(&mut self, content: &str);

    fn view_state(&self) -> ViewState;
    /// Replaces the cursor and scroll position wholesale.
    fn restore_view_state(&mut self, state: &ViewState);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    Editor(EditorKind),
    External,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContentChange {
    pub revision: u64,
    pub content: String,
    pub origin: ChangeOrigin,
}

type Listener = Box<dyn FnMut(&ContentChange) + Send>;

pub struct SyncController {
    content: String,
    active: EditorKind,
    rich: Option<RichEditor>,
    plain: Option<PlainEditor>,
    revision: u64,
    listeners: Vec<Listener>,
}

impl SyncController {
    /// Both editors mounted and loaded with `content`; the rich editor is active.
    pub fn new(content: &str) -> Self {
        let mut controller = SyncController {
            content: content.to_string(),
            active: EditorKind::Rich,
            rich: Some(RichEditor::new()),
            plain: Some(PlainEditor::default()),
            revision: 0,
            listeners: Vec::new(),
        };
        controller.resync();
        controller
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn active(&self) -> EditorKind {
        self.active
    }

    pub fn rich(&self) -> Option<&RichEditor> {
        self.rich.as_ref()
    }

    pub fn plain(&self) -> Option<&PlainEditor> {
        self.plain.as_ref()
    }

    pub fn is_mounted(&self, kind: EditorKind) -> bool {
        self.adapter(kind).is_some()
    }

    fn adapter(&self, kind: EditorKind) -> Option<&dyn EditorAdapter> {
        match kind {
            EditorKind::Rich => self.rich.as_ref().map(|editor| editor as &dyn EditorAdapter),
            EditorKind::Plain => self.plain.as_ref().map(|editor| editor as &dyn EditorAdapter),
        }
    }

    fn adapter_mut(&mut self, kind: EditorKind) -> Option<&mut dyn EditorAdapter> {
        match kind {
            EditorKind::Rich => self.rich.as_mut().map(|editor| editor as &mut dyn EditorAdapter),
            EditorKind::Plain => self.plain.as_mut().map(|editor| editor as &mut dyn EditorAdapter),
        }
    }

    /// Registers an observer, called once per accepted content change.
    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: FnMut(&ContentChange) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Replaces the shared content from outside the editors (note load, another window).
    pub fn set_content(&mut self, content: &str) -> Option<ContentChange> {
        if content == self.content {
            return None;
        }
        self.content = content.to_string();
        Some(self.accept(ChangeOrigin::External))
    }

    /// Applies a change made in the rich editor.
    pub fn edit_rich(&mut self, f: impl FnOnce(&mut RichEditor)) -> Option<ContentChange> {
        f(self.rich.as_mut()?);
        self.outbound(EditorKind::Rich)
    }

    /// Applies a change made in the plain editor.
    pub fn edit_plain(&mut self, f: impl FnOnce(&mut PlainEditor)) -> Option<ContentChange> {
        f(self.plain.as_mut()?);
        self.outbound(EditorKind::Plain)
    }

    fn outbound(&mut self, kind: EditorKind) -> Option<ContentChange> {
        if kind != self.active {
            log::debug!("Discarding change from hidden {kind} editor");
            self.inbound(kind);
            return None;
        }

        let serialized = self.adapter(kind)?.serialize();
        if serialized == self.content {
            return None;
        }
        self.content = serialized;
        Some(self.accept(ChangeOrigin::Editor(kind)))
    }

    fn accept(&mut self, origin: ChangeOrigin) -> ContentChange {
        self.revision += 1;
        self.resync();

        let change = ContentChange {
            revision: self.revision,
            content: self.content.clone(),
            origin,
        };
        for listener in self.listeners.iter_mut() {
            listener(&change);
        }
        change
    }

    /// Loads the shared content into `kind` if it is mounted and out of date.
    fn inbound(&mut self, kind: EditorKind) -> bool {
        let content = std::mem::take(&mut self.content);
        let applied = match self.adapter_mut(kind) {
            Some(editor) if !editor.is_current(&content) => {
                editor.load(&content);
                true
            }
            _ => false,
        };
        self.content = content;
        if applied {
            log::debug!("Loaded revision {} into {kind} editor", self.revision);
        }
        applied
    }

    /// Runs inbound propagation for both editors. Returns how many were updated.
    pub fn resync(&mut self) -> usize {
        [EditorKind::Rich, EditorKind::Plain]
            .into_iter()
            .filter(|kind| self.inbound(*kind))
            .count()
    }

    /// Switches the visible editor. The shared content is never modified.
    pub fn toggle(&mut self) -> EditorKind {
        self.active = self.active.other();
        self.resync();
        self.active
    }

    pub fn set_active(&mut self, kind: EditorKind) {
        if self.active != kind {
            self.toggle();
        }
    }

    /// Mounts a fresh editor of `kind`, loaded with the shared content.
    pub fn mount(&mut self, kind: EditorKind) {
        if self.is_mounted(kind) {
            return;
        }
        match kind {
            EditorKind::Rich => self.rich = Some(RichEditor::new()),
            EditorKind::Plain => self.plain = Some(PlainEditor::default()),
        }
        self.inbound(kind);
    }

    pub fn unmount(&mut self, kind: EditorKind) {
        match kind {
            EditorKind::Rich => self.rich = None,
            EditorKind::Plain => self.plain = None,
        }
    }

    pub fn view_state(&self, kind: EditorKind) -> Option<ViewState> {
        self.adapter(kind).map(|editor| editor.view_state())
    }

    pub fn restore_view_state(&mut self, kind: EditorKind, state: &ViewState) {
        if let Some(editor) = self.adapter_mut(kind) {
            editor.restore_view_state(state);
        }
    }
}
