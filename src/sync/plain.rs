use std::ops::Range;

use ropey::Rope;

use super::EditorAdapter;
use crate::note_state::{SelectionRange, ViewState};

/// Plain-text editor model over a rope. Positions are char offsets.
pub struct PlainEditor {
    rope: Rope,
    view: ViewState,
    loads: usize,
}

impl Default for PlainEditor {
    fn default() -> Self {
        Self::new("")
    }
}

impl PlainEditor {
    pub fn new(text: &str) -> Self {
        PlainEditor {
            rope: Rope::from_str(text),
            view: ViewState::default(),
            loads: 0,
        }
    }

    pub fn len_chars(&self) -> usize {
        self.rope.len_chars()
    }

    /// Ropey counts a trailing newline as an extra empty line.
    pub fn line_count(&self) -> usize {
        self.rope.len_lines()
    }

    pub fn line(&self, idx: usize) -> String {
        self.rope.line(idx).to_string()
    }

    /// Inserts `text` at `at` (clamped to the end) and puts the cursor after it.
    pub fn insert(&mut self, at: usize, text: &str) {
        let at = at.min(self.rope.len_chars());
        self.rope.insert(at, text);
        self.set_cursor(at + text.chars().count());
    }

    /// Appends at the end of the text.
    pub fn push_str(&mut self, text: &str) {
        self.insert(self.rope.len_chars(), text);
    }

    /// Removes the chars in `range`, clamped to the text.
    pub fn delete(&mut self, range: Range<usize>) {
        let len = self.rope.len_chars();
        let start = range.start.min(len);
        let end = range.end.min(len).max(start);
        self.rope.remove(start..end);
        self.set_cursor(start);
    }

    pub fn replace(&mut self, range: Range<usize>, text: &str) {
        let start = range.start.min(self.rope.len_chars());
        self.delete(range);
        self.insert(start, text);
    }

    pub fn set_text(&mut self, text: &str) {
        self.rope = Rope::from_str(text);
        self.clamp_view();
    }

    pub fn set_cursor(&mut self, at: usize) {
        let at = at.min(self.rope.len_chars());
        self.view.selection = Some(SelectionRange { anchor: at, head: at });
    }

    pub fn selection(&self) -> Option<SelectionRange> {
        self.view.selection
    }

    pub fn loads(&self) -> usize {
        self.loads
    }

    fn clamp_view(&mut self) {
        let len = self.rope.len_chars();
        if let Some(selection) = self.view.selection.as_mut() {
            selection.anchor = selection.anchor.min(len);
            selection.head = selection.head.min(len);
        }
    }
}

impl EditorAdapter for PlainEditor {
    fn serialize(&self) -> String {
        self.rope.to_string()
    }

    fn load(&mut self, content: &str) {
        self.set_text(content);
        self.loads += 1;
    }

    fn view_state(&self) -> ViewState {
        self.view.clone()
    }

    fn restore_view_state(&mut self, state: &ViewState) {
        self.view = state.clone();
        self.clamp_view();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_delete_move_cursor() {
        let mut editor = PlainEditor::new("hello");
        editor.insert(5, " world");
        assert_eq!(editor.serialize(), "hello world");
        assert_eq!(editor.selection(), Some(SelectionRange { anchor: 11, head: 11 }));

        editor.delete(0..6);
        assert_eq!(editor.serialize(), "world");
        assert_eq!(editor.selection().unwrap().head, 0);
    }

    #[test]
    fn positions_are_clamped() {
        let mut editor = PlainEditor::new("abc");
        editor.insert(100, "!");
        assert_eq!(editor.serialize(), "abc!");
        editor.delete(2..100);
        assert_eq!(editor.serialize(), "ab");
    }

    #[test]
    fn replace_swaps_a_range() {
        let mut editor = PlainEditor::new("- [ ] task");
        editor.replace(3..4, "x");
        assert_eq!(editor.serialize(), "- [x] task");
    }

    #[test]
    fn load_clamps_restored_selection() {
        let mut editor = PlainEditor::new("a long line of text");
        editor.set_cursor(15);
        editor.load("short");
        assert_eq!(editor.selection(), Some(SelectionRange { anchor: 5, head: 5 }));
        assert_eq!(editor.loads(), 1);
    }

    #[test]
    fn multibyte_offsets_are_chars() {
        let mut editor = PlainEditor::new("héllo");
        editor.insert(2, "_");
        assert_eq!(editor.serialize(), "hé_llo");
        assert_eq!(editor.line_count(), 1);
    }
}
