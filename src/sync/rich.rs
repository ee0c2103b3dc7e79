use super::EditorAdapter;
use crate::markdown::Document;
use crate::note_state::ViewState;

/// Rich-text editor model: a structured document plus cursor and scroll.
#[derive(Debug, Default)]
pub struct RichEditor {
    document: Document,
    /// Text the document was last loaded from, until the document is edited.
    source: Option<String>,
    view: ViewState,
    loads: usize,
}

impl RichEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Mutates the document. The loaded source no longer describes it afterwards.
    pub fn update(&mut self, f: impl FnOnce(&mut Document)) {
        f(&mut self.document);
        self.source = None;
    }

    pub fn replace_document(&mut self, document: Document) {
        self.update(|current| *current = document);
    }

    /// Number of inbound loads applied since creation.
    pub fn loads(&self) -> usize {
        self.loads
    }
}

impl EditorAdapter for RichEditor {
    fn serialize(&self) -> String {
        self.document.to_markdown()
    }

    fn is_current(&self, content: &str) -> bool {
        self.source.as_deref() == Some(content) || self.serialize() == content
    }

    fn load(&mut self, content: &str) {
        self.document = Document::parse(content);
        self.source = Some(content.to_string());
        self.loads += 1;
    }

    fn view_state(&self) -> ViewState {
        self.view.clone()
    }

    fn restore_view_state(&mut self, state: &ViewState) {
        self.view = state.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markdown::{Block, Inline};

    #[test]
    fn loaded_source_counts_as_current() {
        let mut editor = RichEditor::new();
        editor.load("Some __text__");
        assert_eq!(editor.serialize(), "Some **text**");
        assert!(editor.is_current("Some __text__"));
        assert!(editor.is_current("Some **text**"));
    }

    #[test]
    fn editing_forgets_source() {
        let mut editor = RichEditor::new();
        editor.load("hello");
        editor.update(|doc| {
            doc.blocks_mut().push(Block::Paragraph {
                inlines: vec![Inline::text("world")],
            })
        });
        assert!(!editor.is_current("hello"));
        assert_eq!(editor.serialize(), "hello\n\nworld");
    }
}
